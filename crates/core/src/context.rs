//! Shared embedding environment.

use std::sync::Arc;

use embed_protocol::{ContentId, ContentKind};

use crate::builder::EmbedBuilder;
use crate::frame::FrameHost;
use crate::session::SessionCoordinator;

/// How embedded frames authenticate.
#[derive(Clone)]
pub enum AuthMode {
	/// The frame URL is already authenticated (existing cookie or a
	/// pre-signed URL); no tokens are exchanged.
	Cookie,
	/// Frames share the coordinator's cookieless session.
	Cookieless(Arc<SessionCoordinator>),
}

impl std::fmt::Debug for AuthMode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			AuthMode::Cookie => f.write_str("Cookie"),
			AuthMode::Cookieless(_) => f.write_str("Cookieless"),
		}
	}
}

/// Everything the embeds on one page share: the embedded application's
/// host, the page's own origin, the authentication mode and the frame host.
///
/// Cheap to clone; every builder holds its own copy.
#[derive(Clone)]
pub struct EmbedContext {
	api_host: String,
	embed_domain: Option<String>,
	auth: AuthMode,
	frame_host: Arc<dyn FrameHost>,
}

impl EmbedContext {
	/// Context for frames whose URLs are already authenticated.
	pub fn new(api_host: impl Into<String>, frame_host: Arc<dyn FrameHost>) -> Self {
		Self {
			api_host: api_host.into(),
			embed_domain: None,
			auth: AuthMode::Cookie,
			frame_host,
		}
	}

	/// Context for frames sharing a cookieless session.
	pub fn cookieless(
		api_host: impl Into<String>,
		frame_host: Arc<dyn FrameHost>,
		session: Arc<SessionCoordinator>,
	) -> Self {
		Self {
			auth: AuthMode::Cookieless(session),
			..Self::new(api_host, frame_host)
		}
	}

	/// Origin of the host page, passed to frames as `embed_domain`.
	pub fn with_embed_domain(mut self, embed_domain: impl Into<String>) -> Self {
		self.embed_domain = Some(embed_domain.into());
		self
	}

	pub fn api_host(&self) -> &str {
		&self.api_host
	}

	pub fn embed_domain(&self) -> Option<&str> {
		self.embed_domain.as_deref()
	}

	pub fn auth(&self) -> &AuthMode {
		&self.auth
	}

	/// The cookieless session, if frames use one.
	pub fn session(&self) -> Option<&Arc<SessionCoordinator>> {
		match &self.auth {
			AuthMode::Cookie => None,
			AuthMode::Cookieless(session) => Some(session),
		}
	}

	pub fn frame_host(&self) -> &Arc<dyn FrameHost> {
		&self.frame_host
	}

	fn builder(&self, content: ContentKind) -> EmbedBuilder {
		EmbedBuilder::new(self.clone()).with_content(content)
	}

	pub fn dashboard_with_id(&self, id: impl Into<ContentId>) -> EmbedBuilder {
		self.builder(ContentKind::Dashboard).with_id(id)
	}

	pub fn dashboard_with_url(&self, url: impl Into<String>) -> EmbedBuilder {
		self.builder(ContentKind::Dashboard).with_url(url)
	}

	/// Explore ids take the `model/explore` form.
	pub fn explore_with_id(&self, id: impl Into<ContentId>) -> EmbedBuilder {
		self.builder(ContentKind::Explore).with_id(id)
	}

	pub fn explore_with_url(&self, url: impl Into<String>) -> EmbedBuilder {
		self.builder(ContentKind::Explore).with_url(url)
	}

	pub fn look_with_id(&self, id: impl Into<ContentId>) -> EmbedBuilder {
		self.builder(ContentKind::Look).with_id(id)
	}

	pub fn look_with_url(&self, url: impl Into<String>) -> EmbedBuilder {
		self.builder(ContentKind::Look).with_url(url)
	}

	pub fn extension_with_id(&self, id: impl Into<ContentId>) -> EmbedBuilder {
		self.builder(ContentKind::Extension).with_id(id)
	}

	pub fn extension_with_url(&self, url: impl Into<String>) -> EmbedBuilder {
		self.builder(ContentKind::Extension).with_url(url)
	}
}

impl std::fmt::Debug for EmbedContext {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EmbedContext")
			.field("api_host", &self.api_host)
			.field("embed_domain", &self.embed_domain)
			.field("auth", &self.auth)
			.finish_non_exhaustive()
	}
}
