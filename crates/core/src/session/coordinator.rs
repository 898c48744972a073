use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use embed_protocol::{AcquireRequest, RefreshOutcome, RefreshRequest, RefreshResponse};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use super::gateway::{GatewayError, SessionGateway};
use super::policy::SessionPolicy;
use super::store::{SessionSnapshot, SessionTokens, TokenStore};
use crate::error::{Error, Result};

/// Session state as observed by connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
	/// No session has been acquired yet.
	Absent,
	/// A token set was acquired or refreshed.
	Active(SessionSnapshot),
	/// The gateway invalidated the session; the next caller re-acquires.
	Expired,
}

/// Clone-able failure shared between the callers of one flight.
#[derive(Debug, Clone)]
enum SessionFailure {
	Acquisition(String),
	Refresh(String),
	Invalid,
	Aborted,
}

impl From<SessionFailure> for Error {
	fn from(failure: SessionFailure) -> Self {
		match failure {
			SessionFailure::Acquisition(message) => Error::SessionAcquisition(message),
			SessionFailure::Refresh(message) => Error::TokenRefresh(message),
			SessionFailure::Invalid => Error::InvalidSession,
			SessionFailure::Aborted => {
				Error::SessionAcquisition("session request was cancelled".to_string())
			}
		}
	}
}

type FlightResult = std::result::Result<SessionSnapshot, SessionFailure>;
type Flight = Shared<BoxFuture<'static, FlightResult>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlightKind {
	Acquire,
	Refresh,
}

struct PendingFlight {
	id: u64,
	kind: FlightKind,
	future: Flight,
}

enum Plan {
	Ready(SessionSnapshot),
	/// Tokens are usable but due; refresh without holding the caller.
	RefreshAhead(SessionSnapshot),
	Refresh,
	Acquire,
}

/// Owns the cookieless session shared by every embed on the page.
///
/// At most one acquisition or refresh runs at a time; concurrent callers
/// attach to the running flight and receive its result. Flights run on their
/// own task, so a refresh started in the background completes even if no
/// caller awaits it.
///
/// # Example
///
/// ```ignore
/// let coordinator = SessionCoordinator::new(Arc::new(gateway), SessionPolicy::default());
/// let tokens = coordinator.ensure_session().await?;
/// println!("api token valid for {}s", tokens.api_token_ttl);
/// ```
pub struct SessionCoordinator {
	gateway: Arc<dyn SessionGateway>,
	policy: SessionPolicy,
	store: TokenStore,
	pending: Mutex<Option<PendingFlight>>,
	next_flight: AtomicU64,
	updates: watch::Sender<SessionUpdate>,
	timer: Mutex<Option<AbortHandle>>,
	weak_self: Weak<SessionCoordinator>,
}

impl SessionCoordinator {
	pub fn new(gateway: Arc<dyn SessionGateway>, policy: SessionPolicy) -> Arc<Self> {
		let (updates, _) = watch::channel(SessionUpdate::Absent);
		Arc::new_cyclic(|weak_self| Self {
			gateway,
			policy,
			store: TokenStore::default(),
			pending: Mutex::new(None),
			next_flight: AtomicU64::new(1),
			updates,
			timer: Mutex::new(None),
			weak_self: weak_self.clone(),
		})
	}

	pub fn policy(&self) -> &SessionPolicy {
		&self.policy
	}

	/// Returns usable tokens, acquiring or refreshing as needed.
	///
	/// Tokens inside the refresh margin are returned as-is while a refresh
	/// runs in the background.
	pub async fn ensure_session(&self) -> Result<SessionSnapshot> {
		self.ensure(false).await
	}

	/// Like [`ensure_session`](Self::ensure_session), but waits for a due
	/// refresh instead of returning the current tokens.
	pub async fn fresh_tokens(&self) -> Result<SessionSnapshot> {
		self.ensure(true).await
	}

	/// Refreshes the session now, joining a flight already in progress.
	///
	/// Without a prior session this fails with [`Error::InvalidSession`]
	/// and does not contact the gateway.
	pub async fn refresh(&self) -> Result<SessionSnapshot> {
		Ok(self.start_flight(FlightKind::Refresh).await?)
	}

	/// The current tokens, without contacting the gateway.
	pub fn current(&self) -> Option<SessionSnapshot> {
		self.store
			.read()
			.map(|tokens| tokens.snapshot(Instant::now()))
	}

	/// Most recent update published to connections.
	pub fn latest(&self) -> SessionUpdate {
		self.updates.borrow().clone()
	}

	/// Subscribes to session updates. The current value is marked as seen.
	pub fn subscribe(&self) -> watch::Receiver<SessionUpdate> {
		self.updates.subscribe()
	}

	/// Cancels the scheduled refresh. In-flight requests still complete.
	pub fn shutdown(&self) {
		tracing::debug!("Shutting down session coordinator");
		self.cancel_timer();
	}

	async fn ensure(&self, wait_for_refresh: bool) -> Result<SessionSnapshot> {
		let flight = match self.plan(Instant::now()) {
			Plan::Ready(snapshot) => return Ok(snapshot),
			Plan::RefreshAhead(snapshot) => {
				let flight = self.start_flight(FlightKind::Refresh);
				if !wait_for_refresh {
					return Ok(snapshot);
				}
				flight
			}
			Plan::Refresh => self.start_flight(FlightKind::Refresh),
			Plan::Acquire => self.start_flight(FlightKind::Acquire),
		};
		Ok(flight.await?)
	}

	fn plan(&self, now: Instant) -> Plan {
		let Some(tokens) = self.store.read() else {
			return Plan::Acquire;
		};
		let refreshable = tokens.usable_reference(now).is_some();
		if tokens.navigation.is_expired(now) || tokens.api.is_expired(now) {
			return if refreshable { Plan::Refresh } else { Plan::Acquire };
		}
		if self
			.policy
			.refresh_due(tokens.api.ttl, tokens.api.remaining(now))
		{
			return Plan::RefreshAhead(tokens.snapshot(now));
		}
		Plan::Ready(tokens.snapshot(now))
	}

	/// Returns the running flight, or starts one of `kind`.
	fn start_flight(&self, kind: FlightKind) -> Flight {
		let mut pending = self.pending.lock();
		if let Some(flight) = pending.as_ref() {
			tracing::debug!(running = ?flight.kind, requested = ?kind, "Joining in-flight session request");
			return flight.future.clone();
		}

		let Some(this) = self.weak_self.upgrade() else {
			return async { Err::<SessionSnapshot, _>(SessionFailure::Aborted) }
				.boxed()
				.shared();
		};
		let id = self.next_flight.fetch_add(1, Ordering::SeqCst);
		tracing::debug!(flight = id, ?kind, "Starting session request");

		let task = tokio::spawn(async move {
			let result = this.run_flight(kind).await;
			this.finish_flight(id);
			result
		});
		let future = async move { task.await.unwrap_or(Err(SessionFailure::Aborted)) }
			.boxed()
			.shared();

		*pending = Some(PendingFlight {
			id,
			kind,
			future: future.clone(),
		});
		future
	}

	fn finish_flight(&self, id: u64) {
		let mut pending = self.pending.lock();
		if pending.as_ref().is_some_and(|flight| flight.id == id) {
			*pending = None;
		}
	}

	async fn run_flight(&self, kind: FlightKind) -> FlightResult {
		match kind {
			FlightKind::Acquire => self.acquire().await,
			FlightKind::Refresh => {
				let Some(tokens) = self.store.read() else {
					tracing::debug!("Refresh requested without a session");
					return Err(SessionFailure::Invalid);
				};
				match tokens.refresh_request(Instant::now()) {
					Some(request) => self.refresh_with_retry(request).await,
					None => {
						tracing::debug!("No usable reference token, acquiring instead of refreshing");
						self.acquire().await
					}
				}
			}
		}
	}

	async fn acquire(&self) -> FlightResult {
		let now = Instant::now();
		let session_reference_token = self.store.read().and_then(|tokens| {
			tokens
				.usable_reference(now)
				.map(|token| token.value.clone())
		});
		let joining = session_reference_token.is_some();

		let response = self
			.gateway
			.acquire(AcquireRequest {
				session_reference_token,
			})
			.await
			.map_err(|err| {
				tracing::warn!(error = %err, "Embed session acquisition failed");
				SessionFailure::Acquisition(err.to_string())
			})?;

		let received_at = Instant::now();
		let tokens = self.store.write(response, received_at);
		tracing::info!(
			joining,
			api_ttl = tokens.api.ttl.as_secs(),
			navigation_ttl = tokens.navigation.ttl.as_secs(),
			has_reference = tokens.reference.is_some(),
			"Acquired embed session"
		);
		Ok(self.activate(&tokens, received_at))
	}

	async fn refresh_with_retry(&self, request: RefreshRequest) -> FlightResult {
		let mut retried = false;
		loop {
			match self.gateway.refresh(request.clone()).await {
				Ok(response) => return self.apply_refresh(response),
				Err(GatewayError::InvalidTokens) => {
					return self.expire("gateway rejected the session tokens");
				}
				Err(err) if !retried => {
					tracing::warn!(error = %err, "Session refresh failed, retrying");
					retried = true;
					tokio::time::sleep(self.policy.retry_backoff()).await;
				}
				Err(err) => {
					tracing::warn!(error = %err, "Session refresh failed, keeping current tokens");
					if self.policy.proactive_refresh {
						self.schedule_refresh(self.policy.refresh_retry_interval());
					}
					return Err(SessionFailure::Refresh(err.to_string()));
				}
			}
		}
	}

	fn apply_refresh(&self, response: RefreshResponse) -> FlightResult {
		let refreshed = match response.into_outcome() {
			RefreshOutcome::Refreshed(refreshed) => refreshed,
			RefreshOutcome::Expired => return self.expire("session reference token expired"),
		};
		let received_at = Instant::now();
		let Some(tokens) = self.store.apply_refresh(refreshed, received_at) else {
			return Err(SessionFailure::Invalid);
		};
		tracing::info!(
			api_ttl = tokens.api.ttl.as_secs(),
			generation = tokens.generation,
			"Refreshed embed session tokens"
		);
		Ok(self.activate(&tokens, received_at))
	}

	/// Publishes `tokens` and arms the next proactive refresh.
	fn activate(&self, tokens: &SessionTokens, now: Instant) -> SessionSnapshot {
		let snapshot = tokens.snapshot(now);
		self.updates
			.send_replace(SessionUpdate::Active(snapshot.clone()));
		if self.policy.proactive_refresh {
			self.schedule_refresh(self.policy.refresh_delay(tokens.shortest_ttl()));
		}
		snapshot
	}

	fn expire(&self, reason: &str) -> FlightResult {
		tracing::warn!(reason, "Embed session expired");
		self.store.clear();
		self.cancel_timer();
		self.updates.send_replace(SessionUpdate::Expired);
		Err(SessionFailure::Invalid)
	}

	fn schedule_refresh(&self, delay: Duration) {
		let weak = self.weak_self.clone();
		let task = tokio::spawn(async move {
			tokio::time::sleep(delay).await;
			let Some(coordinator) = weak.upgrade() else {
				return;
			};
			tracing::debug!("Scheduled session refresh firing");
			if let Err(err) = coordinator.refresh().await {
				tracing::debug!(error = %err, "Scheduled session refresh did not complete");
			}
		});
		tracing::debug!(delay_secs = delay.as_secs(), "Scheduled session refresh");
		if let Some(previous) = self.timer.lock().replace(task.abort_handle()) {
			previous.abort();
		}
	}

	fn cancel_timer(&self) {
		if let Some(timer) = self.timer.lock().take() {
			timer.abort();
		}
	}
}

impl Drop for SessionCoordinator {
	fn drop(&mut self) {
		self.cancel_timer();
	}
}

impl std::fmt::Debug for SessionCoordinator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SessionCoordinator")
			.field("policy", &self.policy)
			.field("has_session", &self.store.read().is_some())
			.field("in_flight", &self.pending.lock().as_ref().map(|f| f.kind))
			.finish()
	}
}
