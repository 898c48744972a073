//! Refresh timing policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing knobs for cookieless session refresh.
///
/// Deserializes from camelCase JSON with every field optional:
///
/// ```json
/// { "refreshFraction": 0.2, "refreshFloorSecs": 30, "retryBackoffMs": 1000 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionPolicy {
	/// Fraction of a token's lifetime kept in reserve before refreshing.
	pub refresh_fraction: f64,
	/// Lower bound of the refresh margin, in seconds.
	pub refresh_floor_secs: u64,
	/// Pause before the single retry of a failed refresh.
	pub retry_backoff_ms: u64,
	/// Delay before the scheduler tries again after a failed refresh.
	pub refresh_retry_interval_secs: u64,
	/// Arm a timer that refreshes ahead of expiry without any caller asking.
	pub proactive_refresh: bool,
}

impl Default for SessionPolicy {
	fn default() -> Self {
		Self {
			refresh_fraction: 0.2,
			refresh_floor_secs: 30,
			retry_backoff_ms: 1000,
			refresh_retry_interval_secs: 30,
			proactive_refresh: true,
		}
	}
}

impl SessionPolicy {
	/// Remaining lifetime below which a token of lifetime `ttl` is refreshed.
	///
	/// `max(ttl * refresh_fraction, refresh_floor)`, capped at half the
	/// lifetime so very short-lived tokens are not refreshed continuously.
	pub fn refresh_margin(&self, ttl: Duration) -> Duration {
		let fraction = self.refresh_fraction.clamp(0.0, 1.0);
		let margin = ttl
			.mul_f64(fraction)
			.max(Duration::from_secs(self.refresh_floor_secs));
		margin.min(ttl / 2)
	}

	/// Whether a token of lifetime `ttl` with `remaining` left must be refreshed.
	pub fn refresh_due(&self, ttl: Duration, remaining: Duration) -> bool {
		remaining < self.refresh_margin(ttl)
	}

	/// Delay until a freshly issued token of lifetime `ttl` becomes due.
	pub fn refresh_delay(&self, ttl: Duration) -> Duration {
		ttl.saturating_sub(self.refresh_margin(ttl))
	}

	pub fn retry_backoff(&self) -> Duration {
		Duration::from_millis(self.retry_backoff_ms)
	}

	pub fn refresh_retry_interval(&self) -> Duration {
		Duration::from_secs(self.refresh_retry_interval_secs)
	}
}
