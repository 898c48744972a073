//! What `embedctl` prints.
//!
//! Each command writes one envelope per result to stdout:
//!
//! ```json
//! { "schemaVersion": 1, "ok": true, "command": "session acquire",
//!   "data": { "api_token": "...", ... }, "elapsedMs": 84 }
//! ```
//!
//! A failure carries `error: { code, message }` instead of `data` and is also
//! written to stderr. `session watch` prints an envelope per session update,
//! which is what `--format ndjson` is for.


use std::io::Write;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Bumped on breaking changes to the envelope.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
	/// Pretty-printed JSON
	#[default]
	Json,
	/// One JSON document per line
	Ndjson,
	/// Plain text; failures go to stderr only
	Text,
}

/// Stable failure codes for scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	/// Acquisition failed or the session was invalidated
	SessionError,
	/// Refresh failed; the previous tokens are still valid
	RefreshFailed,
	/// The session gateway could not be reached
	GatewayUnavailable,
	/// Bad arguments or embed configuration
	InvalidInput,
	/// Missing or malformed settings file
	ConfigError,
	IoError,
	Timeout,
	InternalError,
}

impl ErrorCode {
	pub fn as_str(self) -> &'static str {
		match self {
			ErrorCode::SessionError => "SESSION_ERROR",
			ErrorCode::RefreshFailed => "REFRESH_FAILED",
			ErrorCode::GatewayUnavailable => "GATEWAY_UNAVAILABLE",
			ErrorCode::InvalidInput => "INVALID_INPUT",
			ErrorCode::ConfigError => "CONFIG_ERROR",
			ErrorCode::IoError => "IO_ERROR",
			ErrorCode::Timeout => "TIMEOUT",
			ErrorCode::InternalError => "INTERNAL_ERROR",
		}
	}
}

impl std::fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
	pub code: ErrorCode,
	pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
	pub schema_version: u32,
	pub ok: bool,
	pub command: &'static str,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<T>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<Failure>,
	pub elapsed_ms: u64,
}

impl<T: Serialize> Envelope<T> {
	pub fn render(&self, format: OutputFormat) -> String {
		match format {
			OutputFormat::Json => serde_json::to_string_pretty(self).unwrap_or_default(),
			OutputFormat::Ndjson => serde_json::to_string(self).unwrap_or_default(),
			OutputFormat::Text => match (&self.data, &self.error) {
				(_, Some(failure)) => format!("Error [{}]: {}", failure.code, failure.message),
				(Some(data), None) => render_text(data),
				(None, None) => String::new(),
			},
		}
	}
}

/// Whole milliseconds in `elapsed`, saturating at `u64::MAX`.
fn elapsed_ms(elapsed: Duration) -> u64 {
	u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

fn render_text<T: Serialize>(data: &T) -> String {
	match serde_json::to_value(data) {
		// Bare strings (URLs, tokens) print without quotes.
		Ok(serde_json::Value::String(text)) => text,
		Ok(serde_json::Value::Object(fields)) => fields
			.iter()
			.map(|(key, value)| match value {
				serde_json::Value::String(text) => format!("{key}: {text}"),
				other => format!("{key}: {other}"),
			})
			.collect::<Vec<_>>()
			.join("\n"),
		Ok(other) => other.to_string(),
		Err(_) => String::new(),
	}
}

/// Prints the results of one command invocation.
#[derive(Debug, Clone, Copy)]
pub struct Reporter {
	command: &'static str,
	format: OutputFormat,
	started: Instant,
}

impl Reporter {
	pub fn new(command: &'static str, format: OutputFormat) -> Self {
		Self {
			command,
			format,
			started: Instant::now(),
		}
	}

	pub fn envelope<T>(&self, result: std::result::Result<T, Failure>) -> Envelope<T> {
		let (data, error) = match result {
			Ok(data) => (Some(data), None),
			Err(failure) => (None, Some(failure)),
		};
		Envelope {
			schema_version: SCHEMA_VERSION,
			ok: error.is_none(),
			command: self.command,
			data,
			error,
			elapsed_ms: elapsed_ms(self.started.elapsed()),
		}
	}

	pub fn success<T: Serialize>(&self, data: T) {
		self.print(&self.envelope(Ok(data)));
	}

	/// Reports a failure on stderr and, unless the format is text, as an
	/// envelope on stdout.
	pub fn failure(&self, failure: Failure) {
		eprintln!("Error [{}]: {}", failure.code, failure.message);
		if self.format != OutputFormat::Text {
			self.print(&self.envelope::<()>(Err(failure)));
		}
	}

	fn print<T: Serialize>(&self, envelope: &Envelope<T>) {
		let mut stdout = std::io::stdout().lock();
		let _ = writeln!(stdout, "{}", envelope.render(self.format));
		let _ = stdout.flush();
	}
}
