//! In-memory doubles for exercising embeds without a real page or backend.
//!
//! - [`MemoryFrameHost`] mounts [`EmbeddedFrame`]s that record every message
//!   sent to them and let a test play the embedded application's side.
//! - [`ScriptedGateway`] answers acquire and refresh calls from a script,
//!   counting every call.
//!
//! # Example
//!
//! ```ignore
//! let host = MemoryFrameHost::new().with_auto_ready();
//! let context = EmbedContext::cookieless("example.com", Arc::new(host.clone()), session);
//! let dashboard = context.dashboard_with_id(42).connect().await?;
//!
//! let frame = host.last_frame().unwrap();
//! frame.emit(EmbedEvent::new("dashboard:loaded"));
//! dashboard.run()?;
//! assert_eq!(frame.sent_types().last().unwrap(), "dashboard:run");
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use embed_protocol::{
	AcquireRequest, AcquireResponse, EmbedEvent, RefreshRequest, RefreshResponse, names,
};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::frame::{FrameHost, FrameId, FrameSpec, FrameTransport, MountedFrame, TransportParts};
use crate::session::{GatewayError, GatewayFuture, SessionGateway};

/// A [`FrameHost`] that keeps its frames in memory.
#[derive(Clone, Default)]
pub struct MemoryFrameHost {
	state: Arc<HostState>,
}

#[derive(Default)]
struct HostState {
	next_id: AtomicU64,
	frames: Mutex<IndexMap<FrameId, EmbeddedFrame>>,
	auto_ready: AtomicBool,
	mount_error: Mutex<Option<String>>,
}

impl MemoryFrameHost {
	pub fn new() -> Self {
		Self::default()
	}

	/// Frames mounted from now on answer `embed:connect` with `embed:ready`.
	pub fn with_auto_ready(self) -> Self {
		self.state.auto_ready.store(true, Ordering::SeqCst);
		self
	}

	/// Makes the next [`create_frame`](FrameHost::create_frame) fail.
	pub fn fail_next_mount(&self, message: impl Into<String>) {
		*self.state.mount_error.lock() = Some(message.into());
	}

	pub fn frame(&self, id: FrameId) -> Option<EmbeddedFrame> {
		self.state.frames.lock().get(&id).cloned()
	}

	pub fn frames(&self) -> Vec<EmbeddedFrame> {
		self.state.frames.lock().values().cloned().collect()
	}

	pub fn last_frame(&self) -> Option<EmbeddedFrame> {
		self.state.frames.lock().values().last().cloned()
	}

	/// Frames that have not been removed.
	pub fn mounted_count(&self) -> usize {
		self.state
			.frames
			.lock()
			.values()
			.filter(|frame| frame.is_mounted())
			.count()
	}
}

impl FrameHost for MemoryFrameHost {
	fn create_frame(&self, spec: &FrameSpec) -> Result<MountedFrame> {
		if let Some(message) = self.state.mount_error.lock().take() {
			return Err(Error::FrameHost(message));
		}

		let id = self.state.next_id.fetch_add(1, Ordering::SeqCst) + 1;
		let (inbound_tx, message_rx) = mpsc::unbounded_channel();
		let frame = EmbeddedFrame {
			id,
			spec: spec.clone(),
			state: Arc::new(FrameState {
				inbound: Mutex::new(Some(inbound_tx)),
				sent: Mutex::new(Vec::new()),
				height: Mutex::new(None),
				mounted: AtomicBool::new(true),
				auto_ready: self.state.auto_ready.load(Ordering::SeqCst),
			}),
		};
		let sender = MemoryTransport {
			state: Arc::clone(&frame.state),
		};
		self.state.frames.lock().insert(id, frame);

		tracing::debug!(frame = id, src = %spec.src, "Mounted in-memory frame");
		Ok(MountedFrame {
			id,
			transport: TransportParts {
				sender: Box::new(sender),
				message_rx,
			},
		})
	}

	fn set_frame_height(&self, id: FrameId, height: u32) -> Result<()> {
		let frames = self.state.frames.lock();
		let frame = frames
			.get(&id)
			.filter(|frame| frame.is_mounted())
			.ok_or_else(|| Error::FrameHost(format!("frame {id} is not mounted")))?;
		*frame.state.height.lock() = Some(height);
		Ok(())
	}

	fn remove_frame(&self, id: FrameId) {
		if let Some(frame) = self.state.frames.lock().get(&id) {
			frame.detach();
		}
	}
}

impl std::fmt::Debug for MemoryFrameHost {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MemoryFrameHost")
			.field("frames", &self.state.frames.lock().len())
			.finish()
	}
}

struct FrameState {
	inbound: Mutex<Option<mpsc::UnboundedSender<Value>>>,
	sent: Mutex<Vec<Value>>,
	height: Mutex<Option<u32>>,
	mounted: AtomicBool,
	auto_ready: bool,
}

impl FrameState {
	fn inject(&self, message: Value) {
		if let Some(tx) = self.inbound.lock().as_ref() {
			let _ = tx.send(message);
		}
	}
}

struct MemoryTransport {
	state: Arc<FrameState>,
}

impl FrameTransport for MemoryTransport {
	fn send(&self, message: Value) -> Result<()> {
		if !self.state.mounted.load(Ordering::SeqCst) {
			return Err(Error::Transport("frame has been removed".to_string()));
		}
		let is_connect = message.get("type").and_then(Value::as_str) == Some(names::CONNECT);
		self.state.sent.lock().push(message);
		if is_connect && self.state.auto_ready {
			self.state.inject(json!({ "type": names::READY }));
		}
		Ok(())
	}
}

/// The embedded application's side of a frame mounted by [`MemoryFrameHost`].
#[derive(Clone)]
pub struct EmbeddedFrame {
	id: FrameId,
	spec: FrameSpec,
	state: Arc<FrameState>,
}

impl EmbeddedFrame {
	pub fn id(&self) -> FrameId {
		self.id
	}

	pub fn spec(&self) -> &FrameSpec {
		&self.spec
	}

	pub fn src(&self) -> &str {
		&self.spec.src
	}

	/// Delivers a raw message to the host.
	pub fn inject(&self, message: Value) {
		self.state.inject(message);
	}

	/// Emits a plain event.
	pub fn emit(&self, event: EmbedEvent) {
		self.inject(Value::Object(event_object(event)));
	}

	/// Emits an event that expects a reply.
	pub fn request(&self, id: u32, event: EmbedEvent) {
		let mut object = event_object(event);
		object.insert("id".to_string(), Value::from(id));
		self.inject(Value::Object(object));
	}

	/// Acknowledges the handshake.
	pub fn acknowledge(&self) {
		self.emit(EmbedEvent::new(names::READY));
	}

	/// Messages sent to this frame so far.
	pub fn sent(&self) -> Vec<Value> {
		self.state.sent.lock().clone()
	}

	/// Takes all sent messages, clearing the buffer.
	pub fn take_sent(&self) -> Vec<Value> {
		std::mem::take(&mut *self.state.sent.lock())
	}

	/// The `type` of every message sent so far, in order.
	pub fn sent_types(&self) -> Vec<String> {
		self.state
			.sent
			.lock()
			.iter()
			.filter_map(|message| message.get("type").and_then(Value::as_str))
			.map(str::to_string)
			.collect()
	}

	/// Replies sent for the request with `id`.
	pub fn reply_to(&self, id: u32) -> Option<Value> {
		self.state
			.sent
			.lock()
			.iter()
			.find(|message| {
				message.get("type").and_then(Value::as_str) == Some(names::REPLY)
					&& message.get("reply_to").and_then(Value::as_u64) == Some(u64::from(id))
			})
			.map(|message| message["result"].clone())
	}

	pub fn height(&self) -> Option<u32> {
		*self.state.height.lock()
	}

	pub fn is_mounted(&self) -> bool {
		self.state.mounted.load(Ordering::SeqCst)
	}

	/// Removes the frame from the page, closing its message channel.
	pub fn detach(&self) {
		self.state.mounted.store(false, Ordering::SeqCst);
		self.state.inbound.lock().take();
	}
}

impl std::fmt::Debug for EmbeddedFrame {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EmbeddedFrame")
			.field("id", &self.id)
			.field("src", &self.spec.src)
			.field("mounted", &self.is_mounted())
			.finish()
	}
}

fn event_object(event: EmbedEvent) -> serde_json::Map<String, Value> {
	let mut object = event.params;
	object.insert("type".to_string(), Value::String(event.name));
	object
}

/// A [`SessionGateway`] answering from a script.
///
/// Unscripted calls succeed with numbered tokens: acquisitions issue
/// `A{n}`/`N{n}`/`R{n}` and refreshes issue the next `A{n}`/`N{n}` while
/// keeping the reference token alive.
pub struct ScriptedGateway {
	state: Mutex<Script>,
}

struct Script {
	acquisitions: Vec<AcquireRequest>,
	refreshes: Vec<RefreshRequest>,
	acquire_results: VecDeque<std::result::Result<AcquireResponse, GatewayError>>,
	refresh_results: VecDeque<std::result::Result<RefreshResponse, GatewayError>>,
	delay: Duration,
	issued: u64,
	ttls: (u64, u64, u64),
	issue_reference: bool,
}

impl Default for ScriptedGateway {
	fn default() -> Self {
		Self {
			state: Mutex::new(Script {
				acquisitions: Vec::new(),
				refreshes: Vec::new(),
				acquire_results: VecDeque::new(),
				refresh_results: VecDeque::new(),
				delay: Duration::ZERO,
				issued: 0,
				ttls: (600, 3600, 86400),
				issue_reference: true,
			}),
		}
	}
}

impl ScriptedGateway {
	pub fn new() -> Self {
		Self::default()
	}

	/// Every call waits `delay` before answering.
	pub fn with_delay(self, delay: Duration) -> Self {
		self.state.lock().delay = delay;
		self
	}

	/// TTLs, in seconds, of generated api, navigation and reference tokens.
	pub fn with_ttls(self, api: u64, navigation: u64, reference: u64) -> Self {
		self.state.lock().ttls = (api, navigation, reference);
		self
	}

	/// Generated acquisitions carry no reference token.
	pub fn without_reference_token(self) -> Self {
		self.state.lock().issue_reference = false;
		self
	}

	pub fn push_acquire(&self, result: std::result::Result<AcquireResponse, GatewayError>) {
		self.state.lock().acquire_results.push_back(result);
	}

	pub fn push_refresh(&self, result: std::result::Result<RefreshResponse, GatewayError>) {
		self.state.lock().refresh_results.push_back(result);
	}

	pub fn acquire_requests(&self) -> Vec<AcquireRequest> {
		self.state.lock().acquisitions.clone()
	}

	pub fn refresh_requests(&self) -> Vec<RefreshRequest> {
		self.state.lock().refreshes.clone()
	}

	pub fn acquire_calls(&self) -> usize {
		self.state.lock().acquisitions.len()
	}

	pub fn refresh_calls(&self) -> usize {
		self.state.lock().refreshes.len()
	}
}

impl Script {
	fn issue_acquire(&mut self) -> AcquireResponse {
		self.issued += 1;
		let (api, navigation, reference) = self.ttls;
		AcquireResponse {
			api_token: format!("A{}", self.issued),
			api_token_ttl: api,
			navigation_token: format!("N{}", self.issued),
			navigation_token_ttl: navigation,
			session_reference_token: self
				.issue_reference
				.then(|| format!("R{}", self.issued)),
			session_reference_token_ttl: if self.issue_reference { reference } else { 0 },
		}
	}

	fn issue_refresh(&mut self) -> RefreshResponse {
		self.issued += 1;
		let (api, navigation, reference) = self.ttls;
		RefreshResponse {
			api_token: Some(format!("A{}", self.issued)),
			api_token_ttl: Some(api),
			navigation_token: Some(format!("N{}", self.issued)),
			navigation_token_ttl: Some(navigation),
			session_reference_token_ttl: reference,
		}
	}
}

impl SessionGateway for ScriptedGateway {
	fn acquire(&self, request: AcquireRequest) -> GatewayFuture<'_, AcquireResponse> {
		Box::pin(async move {
			let (delay, result) = {
				let mut script = self.state.lock();
				script.acquisitions.push(request);
				let result = match script.acquire_results.pop_front() {
					Some(result) => result,
					None => Ok(script.issue_acquire()),
				};
				(script.delay, result)
			};
			if !delay.is_zero() {
				tokio::time::sleep(delay).await;
			}
			result
		})
	}

	fn refresh(&self, request: RefreshRequest) -> GatewayFuture<'_, RefreshResponse> {
		Box::pin(async move {
			let (delay, result) = {
				let mut script = self.state.lock();
				script.refreshes.push(request);
				let result = match script.refresh_results.pop_front() {
					Some(result) => result,
					None => Ok(script.issue_refresh()),
				};
				(script.delay, result)
			};
			if !delay.is_zero() {
				tokio::time::sleep(delay).await;
			}
			result
		})
	}
}

impl std::fmt::Debug for ScriptedGateway {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let script = self.state.lock();
		f.debug_struct("ScriptedGateway")
			.field("acquisitions", &script.acquisitions.len())
			.field("refreshes", &script.refreshes.len())
			.finish()
	}
}
