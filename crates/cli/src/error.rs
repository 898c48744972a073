use std::path::PathBuf;

use thiserror::Error;

use crate::output::{ErrorCode, Failure};

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	#[error("failed to read settings from {path}: {message}")]
	Settings { path: PathBuf, message: String },

	#[error("{0}")]
	InvalidInput(String),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Embed(#[from] embed::Error),

	#[error(transparent)]
	Gateway(#[from] embed::GatewayError),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

impl CliError {
	/// The failure reported in the result envelope.
	pub fn to_failure(&self) -> Failure {
		let code = match self {
			CliError::Settings { .. } => ErrorCode::ConfigError,
			CliError::InvalidInput(_) => ErrorCode::InvalidInput,
			CliError::Io(_) => ErrorCode::IoError,
			CliError::Json(_) => ErrorCode::InternalError,
			CliError::Embed(err) => classify_embed_error(err),
			CliError::Gateway(embed::GatewayError::Unavailable(_)) => ErrorCode::GatewayUnavailable,
			CliError::Gateway(_) => ErrorCode::SessionError,
			CliError::Anyhow(_) => ErrorCode::InternalError,
		};

		Failure {
			code,
			message: self.to_string(),
		}
	}
}

fn classify_embed_error(err: &embed::Error) -> ErrorCode {
	match err {
		embed::Error::TokenRefresh(_) => ErrorCode::RefreshFailed,
		embed::Error::Configuration(_) | embed::Error::Url(_) => ErrorCode::InvalidInput,
		err if err.is_timeout() => ErrorCode::Timeout,
		err if err.is_session_error() => ErrorCode::SessionError,
		_ => ErrorCode::InternalError,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn refresh_failures_keep_their_own_code() {
		let err = CliError::from(embed::Error::TokenRefresh("503".into()));
		assert_eq!(err.to_failure().code, ErrorCode::RefreshFailed);
	}

	#[test]
	fn session_errors_map_to_session_code() {
		let err = CliError::from(embed::Error::InvalidSession);
		let failure = err.to_failure();
		assert_eq!(failure.code, ErrorCode::SessionError);
		assert!(failure.message.contains("acquired again"));
	}

	#[test]
	fn unreachable_gateway_is_reported() {
		let err = CliError::from(embed::GatewayError::Unavailable("refused".into()));
		assert_eq!(err.to_failure().code, ErrorCode::GatewayUnavailable);
	}

	#[test]
	fn bad_configuration_is_invalid_input() {
		let err = CliError::from(embed::Error::Configuration("url is empty".into()));
		assert_eq!(err.to_failure().code, ErrorCode::InvalidInput);
	}
}
