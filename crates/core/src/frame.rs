//! Frame hosting abstraction.
//!
//! The host page owns the actual frames. [`FrameHost`] is the only way the
//! library touches them: it mounts a frame for an [`FrameSpec`], resizes it,
//! and removes it. Each mounted frame comes with a [`TransportParts`] pair:
//! a [`FrameTransport`] for messages to the frame and an unbounded receiver
//! for messages from it. The receiver closing means the frame is gone.

use embed_protocol::ContentKind;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::Result;

/// Identifier the host assigned to a mounted frame.
pub type FrameId = u64;

/// Sending half of a frame's message channel.
pub trait FrameTransport: Send + Sync {
	/// Posts a message to the frame. Never blocks.
	fn send(&self, message: Value) -> Result<()>;
}

/// Transport parts for a mounted frame.
pub struct TransportParts {
	pub sender: Box<dyn FrameTransport>,
	pub message_rx: mpsc::UnboundedReceiver<Value>,
}

impl std::fmt::Debug for TransportParts {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TransportParts").finish_non_exhaustive()
	}
}

/// Everything the host needs to create a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSpec {
	/// Mount point selector, `body` unless configured.
	pub container: String,
	pub src: String,
	pub content: ContentKind,
	pub class_name: Option<String>,
	pub sandbox: Vec<String>,
	pub allow: Vec<String>,
}

#[derive(Debug)]
pub struct MountedFrame {
	pub id: FrameId,
	pub transport: TransportParts,
}

/// Creates, resizes and removes frames in the host page.
pub trait FrameHost: Send + Sync {
	fn create_frame(&self, spec: &FrameSpec) -> Result<MountedFrame>;

	fn set_frame_height(&self, frame: FrameId, height: u32) -> Result<()>;

	/// Removes the frame. Removing an unknown frame is a no-op.
	fn remove_frame(&self, frame: FrameId);
}
