use std::sync::Arc;
use std::time::Duration;

use embed::{SessionCoordinator, SessionGateway, SessionPolicy, SessionSnapshot, SessionUpdate};
use embed_protocol::{RefreshOutcome, RefreshRequest};
use serde::Serialize;

use crate::error::{CliError, Result};
use crate::gateway::HttpSessionGateway;
use crate::output::Reporter;
use crate::settings::HostSettings;

/// Tokens of an acquired session.
///
/// The reference token stays inside the coordinator; only its TTL is shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionData {
	pub api_token: String,
	pub api_token_ttl: u64,
	pub navigation_token: String,
	pub navigation_token_ttl: u64,
	pub session_reference_token_ttl: u64,
	pub generation: u64,
}

impl From<SessionSnapshot> for SessionData {
	fn from(snapshot: SessionSnapshot) -> Self {
		Self {
			api_token: snapshot.api_token,
			api_token_ttl: snapshot.api_token_ttl,
			navigation_token: snapshot.navigation_token,
			navigation_token_ttl: snapshot.navigation_token_ttl,
			session_reference_token_ttl: snapshot.session_reference_token_ttl,
			generation: snapshot.generation,
		}
	}
}

/// One line of `session watch` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum WatchUpdate {
	Active(SessionData),
	Expired,
}

fn coordinator(settings: &HostSettings, policy: SessionPolicy) -> Result<Arc<SessionCoordinator>> {
	let gateway: Arc<dyn SessionGateway> = Arc::new(HttpSessionGateway::from_settings(settings)?);
	Ok(SessionCoordinator::new(gateway, policy))
}

pub(super) async fn acquire(settings: &HostSettings, reporter: &Reporter) -> Result<()> {
	let policy = SessionPolicy {
		proactive_refresh: false,
		..settings.session.clone()
	};
	let session = coordinator(settings, policy)?;
	let snapshot = session.ensure_session().await;
	session.shutdown();

	reporter.success(SessionData::from(snapshot?));
	Ok(())
}

pub(super) async fn refresh(
	settings: &HostSettings,
	request: RefreshRequest,
	reporter: &Reporter,
) -> Result<()> {
	let gateway = HttpSessionGateway::from_settings(settings)?;
	let response = gateway.refresh(request).await?;

	match response.into_outcome() {
		RefreshOutcome::Refreshed(tokens) => {
			reporter.success(tokens);
			Ok(())
		}
		RefreshOutcome::Expired => Err(CliError::Embed(embed::Error::InvalidSession)),
	}
}

/// Keeps a session alive with proactive refresh and prints every change.
///
/// An expired session is re-acquired immediately, the way an open embed
/// re-acquires on its next command.
pub(super) async fn watch(
	settings: &HostSettings,
	duration: Option<u64>,
	reporter: &Reporter,
) -> Result<()> {
	let session = coordinator(settings, settings.session.clone())?;
	let mut updates = session.subscribe();
	let initial = session.ensure_session().await?;
	reporter.success(WatchUpdate::Active(initial.into()));
	updates.mark_unchanged();

	let deadline = async {
		match duration {
			Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
			None => std::future::pending().await,
		}
	};
	tokio::pin!(deadline);

	let result = loop {
		tokio::select! {
			changed = updates.changed() => {
				if changed.is_err() {
					break Ok(());
				}
				let update = updates.borrow_and_update().clone();
				match update {
					SessionUpdate::Active(snapshot) => {
						tracing::info!(generation = snapshot.generation, "Session tokens refreshed");
						reporter.success(WatchUpdate::Active(snapshot.into()));
					}
					SessionUpdate::Expired => {
						tracing::warn!("Session expired, acquiring a new one");
						reporter.success(WatchUpdate::Expired);
						if let Err(err) = session.ensure_session().await {
							break Err(err.into());
						}
					}
					SessionUpdate::Absent => {}
				}
			}
			_ = &mut deadline => break Ok(()),
			_ = tokio::signal::ctrl_c() => break Ok(()),
		}
	};

	session.shutdown();
	result
}
