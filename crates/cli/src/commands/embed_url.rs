use std::sync::Arc;

use embed::{
	EmbedBuilder, EmbedContext, FrameHost, FrameId, FrameSpec, MountedFrame, SessionCoordinator,
	SessionPolicy,
};

use crate::cli::UrlArgs;
use crate::error::Result;
use crate::gateway::HttpSessionGateway;
use crate::output::Reporter;
use crate::settings::HostSettings;

/// Frame host for contexts that only resolve URLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFrames;

impl FrameHost for NoFrames {
	fn create_frame(&self, _spec: &FrameSpec) -> embed::Result<MountedFrame> {
		Err(embed::Error::FrameHost(
			"embedctl resolves frame URLs but cannot mount frames".to_string(),
		))
	}

	fn set_frame_height(&self, _frame: FrameId, _height: u32) -> embed::Result<()> {
		Ok(())
	}

	fn remove_frame(&self, _frame: FrameId) {}
}

/// Builds the frame `src` for `args`.
pub fn embed_url(
	settings: &HostSettings,
	args: &UrlArgs,
	navigation_token: Option<&str>,
) -> Result<url::Url> {
	let api_host = settings.api_host()?;
	let mut context = EmbedContext::new(api_host, Arc::new(NoFrames));
	if let Some(domain) = &settings.embed_domain {
		context = context.with_embed_domain(domain.clone());
	}

	let mut builder = EmbedBuilder::new(context)
		.with_content(args.kind.into())
		.with_filters(args.filters.iter().cloned())
		.with_params(args.params.iter().cloned())
		.with_sandbox(args.sandbox.iter().cloned());
	builder = if args.target.starts_with('/') || args.target.contains("://") {
		builder.with_url(args.target.clone())
	} else {
		builder.with_id(args.target.clone())
	};

	let config = builder.build()?;
	let src = embed::frame_url::embed_src(
		api_host,
		settings.embed_domain.as_deref(),
		&config,
		navigation_token,
	)?;
	Ok(src)
}

pub(super) async fn execute(
	settings: &HostSettings,
	args: UrlArgs,
	reporter: &Reporter,
) -> Result<()> {
	let navigation_token = if args.cookieless {
		let gateway = Arc::new(HttpSessionGateway::from_settings(settings)?);
		let policy = SessionPolicy {
			proactive_refresh: false,
			..settings.session.clone()
		};
		let session = SessionCoordinator::new(gateway, policy);
		let snapshot = session.ensure_session().await;
		session.shutdown();
		Some(snapshot?.navigation_token)
	} else {
		None
	};

	let src = embed_url(settings, &args, navigation_token.as_deref())?;
	tracing::debug!(%src, content = ?args.kind, "Resolved embed URL");
	reporter.success(src.to_string());
	Ok(())
}
