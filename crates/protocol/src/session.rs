//! Cookieless session gateway schemas.
//!
//! The host backend exposes two endpoints that proxy the embedded
//! application's session API:
//!
//! 1. **Acquire** creates a session, or joins an existing one when a
//!    `session_reference_token` is supplied, and returns all three tokens.
//! 2. **Refresh** exchanges the current tokens for fresh api and navigation
//!    tokens. A zero `session_reference_token_ttl` means the session is gone
//!    and must be acquired again.
//!
//! All TTLs are in seconds, relative to the moment the response is received.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Request body for the acquire endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquireRequest {
	/// Reference token of a prior session to join instead of creating a new one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub session_reference_token: Option<String>,
}

/// Response of the acquire endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquireResponse {
	/// Token handed to the embedded application once its channel is open.
	pub api_token: String,
	pub api_token_ttl: u64,
	/// Token appended to URLs the embedded application navigates to.
	pub navigation_token: String,
	pub navigation_token_ttl: u64,
	/// Identifies the logical session across frames and refreshes. Absent
	/// when the backend did not issue one; refresh is then impossible.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub session_reference_token: Option<String>,
	#[serde(default)]
	pub session_reference_token_ttl: u64,
}

/// Request body for the refresh endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRequest {
	pub api_token: String,
	pub navigation_token: String,
	pub session_reference_token: String,
}

/// Raw response of the refresh endpoint.
///
/// Use [`into_outcome`](Self::into_outcome) to decode it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshResponse {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub api_token: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub api_token_ttl: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub navigation_token: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub navigation_token_ttl: Option<u64>,
	#[serde(default)]
	pub session_reference_token_ttl: u64,
}

impl RefreshResponse {
	/// The response a backend sends when the session can no longer be refreshed.
	pub fn expired() -> Self {
		Self::default()
	}

	/// Decodes the response into a [`RefreshOutcome`].
	///
	/// A zero reference-token TTL, or a response missing either token, is an
	/// expired session.
	pub fn into_outcome(self) -> RefreshOutcome {
		if self.session_reference_token_ttl == 0 {
			return RefreshOutcome::Expired;
		}
		match (self.api_token, self.navigation_token) {
			(Some(api_token), Some(navigation_token)) => RefreshOutcome::Refreshed(RefreshedTokens {
				api_token,
				api_token_ttl: self.api_token_ttl.unwrap_or(0),
				navigation_token,
				navigation_token_ttl: self.navigation_token_ttl.unwrap_or(0),
				session_reference_token_ttl: self.session_reference_token_ttl,
			}),
			_ => RefreshOutcome::Expired,
		}
	}
}

/// Decoded refresh result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
	Refreshed(RefreshedTokens),
	/// The session is gone; the caller must acquire a new one.
	Expired,
}

/// Tokens issued by a successful refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshedTokens {
	pub api_token: String,
	pub api_token_ttl: u64,
	pub navigation_token: String,
	pub navigation_token_ttl: u64,
	pub session_reference_token_ttl: u64,
}

/// Descriptor of the embed user a session is acquired for.
///
/// Forwarded to the host backend alongside [`AcquireRequest`]; the backend
/// decides how much of it reaches the embedded application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedUser {
	pub external_user_id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub first_name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub session_length: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub external_group_id: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub group_ids: Vec<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub permissions: Vec<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub models: Vec<String>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub user_attributes: BTreeMap<String, String>,
}

/// Error text the session API uses for tokens it cannot refresh.
pub const INVALID_TOKENS_MESSAGE: &str = "Invalid input tokens provided";
