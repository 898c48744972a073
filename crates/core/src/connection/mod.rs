//! Per-frame connection to embedded content.
//!
//! An [`EmbedConnection`] owns one mounted frame and its message channel.
//!
//! # Lifecycle
//!
//! 1. [`EmbedBuilder`] holds the configuration until it is connected
//! 2. [`EmbedConnection::open`] obtains session tokens (cookieless mode),
//!    mounts the frame and sends `embed:connect`
//! 3. The connection is [`Handshaking`] until the frame answers `embed:ready`
//! 4. Once [`Ready`], commands are sent and inbound events are dispatched to
//!    handlers
//! 5. [`disconnect`](EmbedConnection::disconnect), removal of the frame, or
//!    dropping the last handle ends in [`Closed`]; a handshake timeout ends
//!    in [`Errored`]
//!
//! While open, every token set the [`SessionCoordinator`] publishes is passed
//! to the frame as `session:tokens` before the next command goes out.
//!
//! [`EmbedBuilder`]: crate::EmbedBuilder
//! [`Handshaking`]: ConnectionState::Handshaking
//! [`Ready`]: ConnectionState::Ready
//! [`Closed`]: ConnectionState::Closed
//! [`Errored`]: ConnectionState::Errored

use std::future::Future;
use std::sync::{Arc, Weak};

use embed_protocol::{
	Command, ContentId, EmbedEvent, EmbedRequest, EventReply, HostMessage, InboundMessage,
	PageProperties, is_navigation_intercept, names,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;

use crate::builder::EmbedConfig;
use crate::context::EmbedContext;
use crate::error::{Error, Result};
use crate::events::{EventHub, EventStream};
use crate::frame::{FrameHost, FrameId, FrameSpec, FrameTransport, MountedFrame, TransportParts};
use crate::frame_url::embed_src;
use crate::handlers::{HandlerFn, HandlerRegistry, Subscription, handler_fn};
use crate::session::{SessionCoordinator, SessionSnapshot, SessionUpdate};

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
	/// `embed:connect` sent, waiting for `embed:ready`.
	Handshaking,
	Ready,
	Closed,
	/// The handshake failed.
	Errored,
}

impl ConnectionState {
	pub fn is_terminal(self) -> bool {
		matches!(self, ConnectionState::Closed | ConnectionState::Errored)
	}
}

/// Everything that happens on a connection, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
	/// The frame acknowledged the handshake.
	Ready,
	/// An event from the embedded application, after its handlers ran.
	Embed(EmbedEvent),
	/// New session tokens were passed to the frame.
	TokensRefreshed { generation: u64 },
	/// The shared session was invalidated; it is re-acquired on the next command.
	SessionExpired,
	Closed,
}

/// Outbound half of the connection. Holding the lock orders sends.
struct Outbox {
	transport: Option<Box<dyn FrameTransport>>,
	/// Generation of the last token set passed to the frame.
	sent_generation: u64,
	api_token: Option<String>,
}

impl Outbox {
	fn send(&self, message: &HostMessage) -> Result<()> {
		match &self.transport {
			Some(transport) => transport.send(message.to_value()),
			None => Err(Error::ConnectionClosed),
		}
	}
}

struct ConnectionInner {
	frame: FrameId,
	config: EmbedConfig,
	host: Arc<dyn FrameHost>,
	session: Option<Arc<SessionCoordinator>>,
	state: Mutex<ConnectionState>,
	outbox: Mutex<Outbox>,
	handlers: HandlerRegistry,
	events: EventHub<ConnectionEvent>,
	tasks: Mutex<Vec<AbortHandle>>,
}

/// Handle to an embedded frame. Cheap to clone.
///
/// Dropping the last handle disconnects.
#[derive(Clone)]
pub struct EmbedConnection {
	inner: Arc<ConnectionInner>,
}

impl EmbedConnection {
	/// Mounts a frame for `config` and starts the handshake.
	///
	/// Returns once `embed:connect` is sent; use
	/// [`wait_ready`](Self::wait_ready) for the acknowledgement.
	pub async fn open(
		context: &EmbedContext,
		config: EmbedConfig,
		handlers: Vec<(String, HandlerFn)>,
	) -> Result<Self> {
		tracing::debug!(kind = %config.content, "Opening embed connection");

		let session = context.session().cloned();
		let snapshot = match &session {
			Some(session) => Some(session.ensure_session().await?),
			None => None,
		};

		let src = embed_src(
			context.api_host(),
			context.embed_domain(),
			&config,
			snapshot.as_ref().map(|s| s.navigation_token.as_str()),
		)?;
		let spec = FrameSpec {
			container: config.container.clone(),
			src: src.to_string(),
			content: config.content,
			class_name: config.class_name.clone(),
			sandbox: config.sandbox.clone(),
			allow: config.allow.clone(),
		};
		let MountedFrame {
			id: frame,
			transport: TransportParts { sender, message_rx },
		} = context.frame_host().create_frame(&spec)?;

		let updates = session.as_ref().map(|session| session.subscribe());
		let inner = Arc::new(ConnectionInner {
			frame,
			config,
			host: Arc::clone(context.frame_host()),
			session,
			state: Mutex::new(ConnectionState::Handshaking),
			outbox: Mutex::new(Outbox {
				transport: Some(sender),
				sent_generation: 0,
				api_token: None,
			}),
			handlers: HandlerRegistry::default(),
			events: EventHub::default(),
			tasks: Mutex::new(Vec::new()),
		});
		for (event, handler) in handlers {
			inner.handlers.register(event, handler);
		}

		let dispatch = tokio::spawn(run_dispatch(Arc::downgrade(&inner), message_rx));
		inner.track(dispatch.abort_handle());
		if let Some(updates) = updates {
			let forward = tokio::spawn(forward_session_updates(Arc::downgrade(&inner), updates));
			inner.track(forward.abort_handle());
		}

		inner.send_connect(snapshot.as_ref())?;
		tracing::info!(frame, kind = %inner.config.content, src = %spec.src, "Embed frame mounted, awaiting handshake");
		Ok(Self { inner })
	}

	/// Waits for the frame to acknowledge the handshake.
	///
	/// With a handshake timeout configured, expiry removes the frame and
	/// fails with [`Error::HandshakeTimeout`]. A disconnect while waiting
	/// fails with [`Error::ConnectionClosed`].
	pub async fn wait_ready(&self) -> Result<()> {
		let waiter = self.inner.events.once(|event| {
			matches!(event, ConnectionEvent::Ready | ConnectionEvent::Closed)
		});
		match self.state() {
			ConnectionState::Ready => return Ok(()),
			ConnectionState::Closed | ConnectionState::Errored => {
				return Err(Error::ConnectionClosed);
			}
			ConnectionState::Handshaking => {}
		}

		let outcome = match self.inner.config.handshake_timeout {
			Some(timeout) => match tokio::time::timeout(timeout, waiter).await {
				Ok(outcome) => outcome,
				Err(_) => {
					if self.state() == ConnectionState::Ready {
						return Ok(());
					}
					let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
					tracing::warn!(frame = self.inner.frame, timeout_ms, "Embed frame did not acknowledge the handshake");
					if !self.inner.close(ConnectionState::Errored) {
						return Err(Error::ConnectionClosed);
					}
					return Err(Error::HandshakeTimeout { timeout_ms });
				}
			},
			None => waiter.await,
		};

		match outcome {
			Ok(ConnectionEvent::Ready) => Ok(()),
			_ => Err(Error::ConnectionClosed),
		}
	}

	pub fn state(&self) -> ConnectionState {
		self.inner.state()
	}

	pub fn is_closed(&self) -> bool {
		self.inner.is_closed()
	}

	pub fn frame_id(&self) -> FrameId {
		self.inner.frame
	}

	pub fn config(&self) -> &EmbedConfig {
		&self.inner.config
	}

	/// The api token most recently passed to the frame.
	pub fn api_token(&self) -> Option<String> {
		self.inner.outbox.lock().api_token.clone()
	}

	pub fn run(&self) -> Result<()> {
		self.send_command(Command::Run)
	}

	/// Stops a running dashboard.
	pub fn stop(&self) -> Result<()> {
		self.send_command(Command::Stop)
	}

	/// Replaces the content's filters and re-runs it.
	pub fn update_filters<I, K, V>(&self, filters: I) -> Result<()>
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		let filters = filters
			.into_iter()
			.map(|(name, value)| (name.into(), value.into()))
			.collect();
		self.send_command(Command::UpdateFilters(filters))
	}

	/// Navigates the frame to other content of the same kind.
	pub fn load(&self, id: impl Into<ContentId>) -> Result<()> {
		self.send_command(Command::Load(id.into()))
	}

	/// Sends a command to the frame without waiting for any answer.
	///
	/// While the shared session is expired the command is not sent: it
	/// starts re-acquisition and fails with [`Error::InvalidSession`]. Retry
	/// once [`ConnectionEvent::TokensRefreshed`] arrives.
	pub fn send_command(&self, command: Command) -> Result<()> {
		let content = self.inner.config.content;
		if !command.supported_by(content) {
			return Err(Error::UnsupportedCommand {
				command: command.name(),
				content,
			});
		}
		match self.state() {
			ConnectionState::Ready => {}
			ConnectionState::Handshaking => return Err(Error::NotReady),
			ConnectionState::Closed | ConnectionState::Errored => {
				return Err(Error::ConnectionClosed);
			}
		}

		if self.inner.reacquire_if_expired() {
			return Err(Error::InvalidSession);
		}
		let mut outbox = self.inner.outbox.lock();
		self.inner.flush_tokens(&mut outbox)?;
		outbox.send(&command.to_message(content))?;
		tracing::debug!(frame = self.inner.frame, command = command.name(), "Sent command");
		Ok(())
	}

	/// Registers a handler for events named `event`.
	///
	/// The handler stays registered until the returned [`Subscription`] is
	/// dropped; call [`Subscription::detach`] to keep it for the lifetime of
	/// the connection.
	pub fn on<F, Fut>(&self, event: impl Into<String>, handler: F) -> Subscription
	where
		F: Fn(EmbedEvent) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<EventReply>> + Send + 'static,
	{
		let id = self.inner.handlers.register(event, handler_fn(handler));
		self.inner.handlers.subscription(id)
	}

	/// Streams connection events from now on.
	pub fn events(&self) -> EventStream<ConnectionEvent> {
		self.inner.events.stream()
	}

	/// Removes the frame and stops all dispatch. Idempotent.
	pub fn disconnect(&self) {
		self.inner.close(ConnectionState::Closed);
	}
}

impl std::fmt::Debug for EmbedConnection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EmbedConnection")
			.field("frame", &self.inner.frame)
			.field("content", &self.inner.config.content)
			.field("state", &self.state())
			.finish()
	}
}

impl ConnectionInner {
	fn state(&self) -> ConnectionState {
		*self.state.lock()
	}

	fn is_closed(&self) -> bool {
		self.state().is_terminal()
	}

	fn track(&self, task: AbortHandle) {
		let mut tasks = self.tasks.lock();
		tasks.retain(|task| !task.is_finished());
		tasks.push(task);
	}

	fn send_connect(&self, snapshot: Option<&SessionSnapshot>) -> Result<()> {
		let mut outbox = self.outbox.lock();
		let payload = snapshot.map(SessionSnapshot::to_payload);
		outbox.send(&HostMessage::connect(payload.as_ref()))?;
		if let Some(snapshot) = snapshot {
			outbox.sent_generation = snapshot.generation;
			outbox.api_token = Some(snapshot.api_token.clone());
		}
		// The session may have moved on between acquisition and mounting.
		self.flush_tokens(&mut outbox)
	}

	/// Passes the session's tokens to the frame if they are newer than the
	/// ones it already has.
	fn flush_tokens(&self, outbox: &mut Outbox) -> Result<()> {
		let Some(snapshot) = self.session.as_ref().and_then(|session| session.current()) else {
			return Ok(());
		};
		if snapshot.generation <= outbox.sent_generation {
			return Ok(());
		}
		self.push_tokens(outbox, &snapshot)
	}

	fn push_tokens(&self, outbox: &mut Outbox, snapshot: &SessionSnapshot) -> Result<()> {
		outbox.send(&HostMessage::session_tokens(&snapshot.to_payload()))?;
		outbox.sent_generation = outbox.sent_generation.max(snapshot.generation);
		outbox.api_token = Some(snapshot.api_token.clone());
		tracing::debug!(frame = self.frame, generation = snapshot.generation, "Passed session tokens to frame");
		self.events.publish(ConnectionEvent::TokensRefreshed {
			generation: snapshot.generation,
		});
		Ok(())
	}

	/// Starts re-acquiring an invalidated session and reports whether one was
	/// needed. The forwarder passes the new tokens on once they arrive.
	fn reacquire_if_expired(&self) -> bool {
		let Some(session) = &self.session else {
			return false;
		};
		if session.latest() != SessionUpdate::Expired {
			return false;
		}
		tracing::debug!(frame = self.frame, "Re-acquiring expired session");
		let session = Arc::clone(session);
		let task = tokio::spawn(async move {
			if let Err(err) = session.ensure_session().await {
				tracing::warn!(error = %err, "Failed to re-acquire embed session");
			}
		});
		self.track(task.abort_handle());
		true
	}

	fn on_session_update(&self, update: SessionUpdate) {
		if self.is_closed() {
			return;
		}
		match update {
			SessionUpdate::Active(_) => {
				let mut outbox = self.outbox.lock();
				if let Err(err) = self.flush_tokens(&mut outbox) {
					tracing::debug!(frame = self.frame, error = %err, "Could not pass session tokens to frame");
				}
			}
			SessionUpdate::Expired => {
				tracing::warn!(frame = self.frame, "Embed session expired");
				self.events.publish(ConnectionEvent::SessionExpired);
			}
			SessionUpdate::Absent => {}
		}
	}

	/// Answers `session:tokens:request` with the freshest tokens available.
	fn answer_token_request(self: &Arc<Self>) {
		let Some(session) = self.session.clone() else {
			tracing::debug!(frame = self.frame, "Token request on a cookie-authenticated frame (ignored)");
			return;
		};
		let weak = Arc::downgrade(self);
		let task = tokio::spawn(async move {
			let result = session.fresh_tokens().await;
			let Some(inner) = weak.upgrade() else {
				return;
			};
			match result {
				Ok(snapshot) => {
					let mut outbox = inner.outbox.lock();
					if let Err(err) = inner.push_tokens(&mut outbox, &snapshot) {
						tracing::debug!(frame = inner.frame, error = %err, "Could not answer token request");
					}
				}
				Err(err) => {
					tracing::warn!(frame = inner.frame, error = %err, "Could not obtain tokens for token request");
				}
			}
		});
		self.track(task.abort_handle());
	}

	async fn dispatch(self: &Arc<Self>, message: InboundMessage) {
		match message {
			InboundMessage::Request(EmbedRequest { id, event }) => {
				self.handle_event(event, Some(id)).await;
			}
			InboundMessage::Event(event) => self.handle_event(event, None).await,
			InboundMessage::Unknown(value) => {
				tracing::debug!(frame = self.frame, "Ignoring untyped frame message: {}", value);
			}
		}
	}

	async fn handle_event(self: &Arc<Self>, event: EmbedEvent, reply_to: Option<u32>) {
		match event.name.as_str() {
			names::READY => {
				self.mark_ready();
				return;
			}
			names::SESSION_TOKENS_REQUEST => {
				self.answer_token_request();
				return;
			}
			_ => {}
		}

		if self.state() != ConnectionState::Ready {
			tracing::debug!(frame = self.frame, event = %event.name, "Dropping event received before handshake");
			if let Some(id) = reply_to {
				self.send_reply(id, EventReply::proceed());
			}
			return;
		}

		let entries = self.handlers.matching(&event.name);
		if entries.is_empty() && !self.apply_default(&event) {
			tracing::debug!(frame = self.frame, event = %event.name, "No handler registered for event (ignored)");
		}

		let mut reply = EventReply::proceed();
		for (id, handler) in entries {
			match handler(event.clone()).await {
				Ok(answer) => reply = reply.merge(answer),
				Err(err) => {
					tracing::warn!(frame = self.frame, event = %event.name, handler = id, error = %err, "Event handler failed");
				}
			}
			if self.is_closed() {
				return;
			}
		}

		if let Some(id) = reply_to {
			if reply.cancel && is_navigation_intercept(&event.name) {
				tracing::debug!(frame = self.frame, event = %event.name, "Navigation cancelled by host");
			}
			self.send_reply(id, reply);
		}
		self.events.publish(ConnectionEvent::Embed(event));
	}

	/// Built-in behavior for events the host registered no handler for.
	fn apply_default(&self, event: &EmbedEvent) -> bool {
		if event.name != names::PAGE_PROPERTIES_CHANGED || !self.config.dynamic_height {
			return false;
		}
		match event.decode::<PageProperties>() {
			Ok(PageProperties {
				height: Some(height),
				..
			}) => {
				if let Err(err) = self.host.set_frame_height(self.frame, height) {
					tracing::warn!(frame = self.frame, error = %err, "Failed to resize frame");
				}
			}
			Ok(_) => {}
			Err(err) => {
				tracing::debug!(frame = self.frame, error = %err, "Malformed page properties");
			}
		}
		true
	}

	fn send_reply(&self, id: u32, reply: EventReply) {
		if let Err(err) = self.outbox.lock().send(&HostMessage::reply(id, &reply)) {
			tracing::debug!(frame = self.frame, reply_to = id, error = %err, "Could not send reply");
		}
	}

	fn mark_ready(&self) {
		{
			let mut state = self.state.lock();
			if *state != ConnectionState::Handshaking {
				tracing::debug!(frame = self.frame, state = ?*state, "Ignoring unexpected embed:ready");
				return;
			}
			*state = ConnectionState::Ready;
		}
		tracing::info!(frame = self.frame, kind = %self.config.content, "Embed frame ready");
		self.events.publish(ConnectionEvent::Ready);
	}

	/// Moves to `final_state` and releases the frame. Returns false if the
	/// connection was already closed.
	fn close(&self, final_state: ConnectionState) -> bool {
		{
			let mut state = self.state.lock();
			if state.is_terminal() {
				return false;
			}
			*state = final_state;
		}

		self.outbox.lock().transport = None;
		self.handlers.clear();
		let tasks = std::mem::take(&mut *self.tasks.lock());
		for task in tasks {
			task.abort();
		}
		self.host.remove_frame(self.frame);

		tracing::info!(frame = self.frame, state = ?final_state, "Embed connection closed");
		self.events.publish(ConnectionEvent::Closed);
		true
	}
}

impl Drop for ConnectionInner {
	fn drop(&mut self) {
		self.close(ConnectionState::Closed);
	}
}

async fn run_dispatch(weak: Weak<ConnectionInner>, mut message_rx: mpsc::UnboundedReceiver<Value>) {
	while let Some(value) = message_rx.recv().await {
		let Some(inner) = weak.upgrade() else {
			return;
		};
		if inner.is_closed() {
			return;
		}
		match serde_json::from_value::<InboundMessage>(value) {
			Ok(message) => inner.dispatch(message).await,
			Err(err) => tracing::error!(frame = inner.frame, "Failed to parse frame message: {}", err),
		}
	}

	if let Some(inner) = weak.upgrade() {
		tracing::debug!(frame = inner.frame, "Frame message channel closed");
		inner.close(ConnectionState::Closed);
	}
}

async fn forward_session_updates(
	weak: Weak<ConnectionInner>,
	mut updates: watch::Receiver<SessionUpdate>,
) {
	while updates.changed().await.is_ok() {
		let update = updates.borrow_and_update().clone();
		let Some(inner) = weak.upgrade() else {
			return;
		};
		inner.on_session_update(update);
	}
}
