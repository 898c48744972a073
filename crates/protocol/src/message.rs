//! Messages exchanged between the host and an embedded frame.
//!
//! Every message is a JSON object with a `type` field naming it. The protocol
//! is deliberately loose in the inbound direction so that newer embedded
//! applications can add events without breaking older hosts:
//!
//! 1. Host mounts the frame and sends `embed:connect` (with the api token in
//!    cookieless mode)
//! 2. Embedded application answers with the `embed:ready` event
//! 3. Host sends commands (`dashboard:run`, `look:filters:update`, ...) and
//!    `session:tokens` whenever the session is refreshed
//! 4. Embedded application emits events; events carrying an `id` expect a
//!    `reply` message (used for navigation interception)
//!
//! # Main Types
//!
//! - [`HostMessage`] - any message from host to frame
//! - [`Command`] - typed host commands, rendered per [`ContentKind`]
//! - [`InboundMessage`] - discriminated union of frame-to-host messages
//! - [`EmbedEvent`] - an event name with its raw parameters

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::content::{ContentId, ContentKind};

/// Well-known message and event names.
pub mod names {
	/// Host to frame: initial handshake message.
	pub const CONNECT: &str = "embed:connect";
	/// Host to frame: fresh session tokens.
	pub const SESSION_TOKENS: &str = "session:tokens";
	/// Host to frame: answer to an event that carried an `id`.
	pub const REPLY: &str = "reply";

	/// Frame to host: handshake acknowledgement.
	pub const READY: &str = "embed:ready";
	/// Frame to host: the embedded application wants newer tokens.
	pub const SESSION_TOKENS_REQUEST: &str = "session:tokens:request";
	/// Frame to host: content size or title changed.
	pub const PAGE_PROPERTIES_CHANGED: &str = "page:properties:changed";

	pub const DRILLMENU_CLICK: &str = "drillmenu:click";
	pub const DRILLMODAL_EXPLORE: &str = "drillmodal:explore";
	pub const DASHBOARD_TILE_EXPLORE: &str = "dashboard:tile:explore";
	pub const DASHBOARD_TILE_VIEW: &str = "dashboard:tile:view";
	pub const DASHBOARD_TILE_DOWNLOAD: &str = "dashboard:tile:download";
	pub const EXPLORE_CLICK: &str = "explore:click";

	/// Events announcing a navigation the host may cancel.
	pub const NAVIGATION_INTERCEPTS: &[&str] = &[
		DRILLMENU_CLICK,
		DRILLMODAL_EXPLORE,
		DASHBOARD_TILE_EXPLORE,
		DASHBOARD_TILE_VIEW,
		DASHBOARD_TILE_DOWNLOAD,
		EXPLORE_CLICK,
	];
}

/// Lifecycle events emitted by every content kind, named `{kind}:{suffix}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
	Loaded,
	RunStart,
	RunComplete,
	SaveComplete,
	DeleteComplete,
}

impl LifecycleEvent {
	pub fn suffix(self) -> &'static str {
		match self {
			LifecycleEvent::Loaded => "loaded",
			LifecycleEvent::RunStart => "run:start",
			LifecycleEvent::RunComplete => "run:complete",
			LifecycleEvent::SaveComplete => "save:complete",
			LifecycleEvent::DeleteComplete => "delete:complete",
		}
	}

	/// Full event name for the given content kind, e.g. `dashboard:run:start`.
	pub fn event_name(self, kind: ContentKind) -> String {
		format!("{}:{}", kind.as_str(), self.suffix())
	}
}

/// Returns true if the event announces a navigation the host may cancel.
pub fn is_navigation_intercept(name: &str) -> bool {
	names::NAVIGATION_INTERCEPTS.contains(&name)
}

/// A message from host to frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostMessage {
	#[serde(rename = "type")]
	pub message_type: String,
	#[serde(flatten)]
	pub params: Map<String, Value>,
}

impl HostMessage {
	pub fn new(message_type: impl Into<String>) -> Self {
		Self {
			message_type: message_type.into(),
			params: Map::new(),
		}
	}

	pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
		self.params.insert(key.to_string(), value.into());
		self
	}

	/// Handshake message. Cookie-authenticated frames connect without tokens.
	pub fn connect(tokens: Option<&TokenPayload>) -> Self {
		let mut message = Self::new(names::CONNECT);
		if let Some(tokens) = tokens {
			message.params.extend(tokens.to_params());
		}
		message
	}

	pub fn session_tokens(tokens: &TokenPayload) -> Self {
		let mut message = Self::new(names::SESSION_TOKENS);
		message.params.extend(tokens.to_params());
		message
	}

	pub fn reply(reply_to: u32, reply: &EventReply) -> Self {
		let result = serde_json::to_value(reply).unwrap_or_else(|_| Value::Object(Map::new()));
		Self::new(names::REPLY)
			.with_param("reply_to", reply_to)
			.with_param("result", result)
	}

	pub fn to_value(&self) -> Value {
		let mut object = self.params.clone();
		object.insert("type".to_string(), Value::String(self.message_type.clone()));
		Value::Object(object)
	}
}

/// Tokens pushed to an embedded frame. TTLs are seconds remaining at send time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
	pub api_token: String,
	pub api_token_ttl: u64,
	pub navigation_token: String,
	pub navigation_token_ttl: u64,
	pub session_reference_token_ttl: u64,
}

impl TokenPayload {
	fn to_params(&self) -> Map<String, Value> {
		match serde_json::to_value(self) {
			Ok(Value::Object(map)) => map,
			_ => Map::new(),
		}
	}
}

/// Commands a host can send to an embedded frame once it is ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
	Run,
	Stop,
	UpdateFilters(BTreeMap<String, String>),
	/// Navigate the frame to other content of the same kind.
	Load(ContentId),
}

impl Command {
	pub fn name(&self) -> &'static str {
		match self {
			Command::Run => "run",
			Command::Stop => "stop",
			Command::UpdateFilters(_) => "filters:update",
			Command::Load(_) => "load",
		}
	}

	/// Whether content of `kind` understands this command.
	pub fn supported_by(&self, kind: ContentKind) -> bool {
		match (self, kind) {
			(_, ContentKind::Extension) => false,
			(Command::Stop, ContentKind::Dashboard) => true,
			(Command::Stop, _) => false,
			_ => true,
		}
	}

	/// Renders the command for a frame showing content of `kind`.
	pub fn to_message(&self, kind: ContentKind) -> HostMessage {
		let message = HostMessage::new(format!("{}:{}", kind.as_str(), self.name()));
		match self {
			Command::Run | Command::Stop => message,
			Command::UpdateFilters(filters) => {
				let filters: Map<String, Value> = filters
					.iter()
					.map(|(k, v)| (k.clone(), Value::String(v.clone())))
					.collect();
				message.with_param("filters", Value::Object(filters))
			}
			Command::Load(id) => message.with_param("id", id.as_str()),
		}
	}
}

/// An event emitted by the embedded application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedEvent {
	#[serde(rename = "type")]
	pub name: String,
	#[serde(flatten)]
	pub params: Map<String, Value>,
}

impl EmbedEvent {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			params: Map::new(),
		}
	}

	pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
		self.params.insert(key.to_string(), value.into());
		self
	}

	pub fn param(&self, key: &str) -> Option<&Value> {
		self.params.get(key)
	}

	/// Decodes the event parameters into a typed payload.
	pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
		serde_json::from_value(Value::Object(self.params.clone()))
	}
}

/// An event that expects a [`HostMessage::reply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedRequest {
	pub id: u32,
	#[serde(flatten)]
	pub event: EmbedEvent,
}

/// Discriminated union of frame-to-host messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InboundMessage {
	/// Event with an `id`, answered with a reply
	Request(EmbedRequest),
	/// Plain event
	Event(EmbedEvent),
	/// Unknown message shape (forward-compatible catch-all)
	Unknown(Value),
}

/// Answer to an intercepted event.
///
/// Serializes to `{}` when the default behavior should proceed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventReply {
	#[serde(default, skip_serializing_if = "std::ops::Not::not")]
	pub cancel: bool,
}

impl EventReply {
	pub fn proceed() -> Self {
		Self { cancel: false }
	}

	pub fn cancel() -> Self {
		Self { cancel: true }
	}

	/// Combines two replies; any cancellation wins.
	pub fn merge(self, other: EventReply) -> Self {
		Self {
			cancel: self.cancel || other.cancel,
		}
	}
}

/// Payload of `page:properties:changed`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageProperties {
	#[serde(default)]
	pub height: Option<u32>,
	#[serde(default)]
	pub title: Option<String>,
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn commands_are_prefixed_with_content_kind() {
		let message = Command::Run.to_message(ContentKind::Dashboard);
		assert_eq!(message.to_value(), json!({"type": "dashboard:run"}));

		let mut filters = BTreeMap::new();
		filters.insert("State / Region".to_string(), "California".to_string());
		let message = Command::UpdateFilters(filters).to_message(ContentKind::Look);
		assert_eq!(
			message.to_value(),
			json!({"type": "look:filters:update", "filters": {"State / Region": "California"}})
		);
	}

	#[test]
	fn stop_is_dashboard_only() {
		assert!(Command::Stop.supported_by(ContentKind::Dashboard));
		assert!(!Command::Stop.supported_by(ContentKind::Look));
		assert!(!Command::Run.supported_by(ContentKind::Extension));
	}

	#[test]
	fn connect_without_tokens_is_bare() {
		assert_eq!(HostMessage::connect(None).to_value(), json!({"type": "embed:connect"}));
	}

	#[test]
	fn connect_carries_tokens() {
		let tokens = TokenPayload {
			api_token: "A1".into(),
			api_token_ttl: 600,
			navigation_token: "N1".into(),
			navigation_token_ttl: 3600,
			session_reference_token_ttl: 86400,
		};
		let value = HostMessage::connect(Some(&tokens)).to_value();
		assert_eq!(value["type"], "embed:connect");
		assert_eq!(value["api_token"], "A1");
		assert_eq!(value["navigation_token_ttl"], 3600);
	}

	#[test]
	fn inbound_with_id_is_request() {
		let message: InboundMessage =
			serde_json::from_value(json!({"id": 3, "type": "drillmenu:click", "label": "Orders"}))
				.unwrap();
		match message {
			InboundMessage::Request(request) => {
				assert_eq!(request.id, 3);
				assert_eq!(request.event.name, "drillmenu:click");
				assert_eq!(request.event.param("label"), Some(&json!("Orders")));
				assert!(request.event.param("id").is_none());
			}
			other => panic!("expected request, got {other:?}"),
		}
	}

	#[test]
	fn inbound_without_id_is_event() {
		let message: InboundMessage =
			serde_json::from_value(json!({"type": "page:properties:changed", "height": 640})).unwrap();
		match message {
			InboundMessage::Event(event) => {
				let props: PageProperties = event.decode().unwrap();
				assert_eq!(props.height, Some(640));
			}
			other => panic!("expected event, got {other:?}"),
		}
	}

	#[test]
	fn inbound_without_type_is_unknown() {
		let message: InboundMessage = serde_json::from_value(json!({"hello": "world"})).unwrap();
		assert!(matches!(message, InboundMessage::Unknown(_)));
	}

	#[test]
	fn proceed_reply_is_empty_object() {
		let reply = HostMessage::reply(7, &EventReply::proceed());
		assert_eq!(reply.to_value(), json!({"type": "reply", "reply_to": 7, "result": {}}));
		let reply = HostMessage::reply(7, &EventReply::proceed().merge(EventReply::cancel()));
		assert_eq!(reply.params["result"], json!({"cancel": true}));
	}

	#[test]
	fn lifecycle_names() {
		assert_eq!(
			LifecycleEvent::RunComplete.event_name(ContentKind::Dashboard),
			"dashboard:run:complete"
		);
		assert_eq!(LifecycleEvent::Loaded.event_name(ContentKind::Look), "look:loaded");
	}
}
