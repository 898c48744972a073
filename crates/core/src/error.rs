//! Error types for embedding and cookieless sessions.

use embed_protocol::ContentKind;
use thiserror::Error;

/// Result type alias for embed operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring, connecting or driving an embed.
#[derive(Debug, Error)]
pub enum Error {
	/// Malformed builder input.
	#[error("Invalid embed configuration: {0}")]
	Configuration(String),

	/// The session gateway was unreachable or rejected the acquisition.
	#[error("Failed to acquire embed session: {0}")]
	SessionAcquisition(String),

	/// Token refresh failed; existing tokens stay in use until they expire.
	#[error("Failed to refresh embed session tokens: {0}")]
	TokenRefresh(String),

	/// The gateway reported the session tokens as invalid; the session was discarded.
	#[error("Embed session is no longer valid and must be acquired again")]
	InvalidSession,

	/// The embedded frame never acknowledged the handshake.
	#[error("Embedded frame did not acknowledge the handshake within {timeout_ms}ms")]
	HandshakeTimeout { timeout_ms: u64 },

	/// The connection was disconnected or its frame removed.
	#[error("Embed connection is closed")]
	ConnectionClosed,

	/// A command was sent before the frame acknowledged the handshake.
	#[error("Embed connection has not completed its handshake")]
	NotReady,

	/// The command is not understood by this kind of content.
	#[error("Command '{command}' is not supported by {content} embeds")]
	UnsupportedCommand {
		command: &'static str,
		content: ContentKind,
	},

	/// The frame host failed to create, address or remove a frame.
	#[error("Frame host error: {0}")]
	FrameHost(String),

	/// Transport-level error (message channel to the frame).
	#[error("Transport error: {0}")]
	Transport(String),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	/// Embed URL could not be parsed.
	#[error("Invalid URL: {0}")]
	Url(#[from] url::ParseError),
}

impl Error {
	/// Returns true if the error ends the operation that produced it
	/// (as opposed to a refresh failure, which leaves stale tokens usable).
	pub fn is_fatal(&self) -> bool {
		!matches!(self, Error::TokenRefresh(_))
	}

	/// Returns true if this error originates in the cookieless session layer.
	pub fn is_session_error(&self) -> bool {
		matches!(
			self,
			Error::SessionAcquisition(_) | Error::TokenRefresh(_) | Error::InvalidSession
		)
	}

	/// Returns true if this is a timeout error.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::HandshakeTimeout { .. })
	}
}
