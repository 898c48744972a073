//! Host settings for `embedctl`.
//!
//! Settings come from a JSON file, `--config <path>` or
//! `$XDG_CONFIG_HOME/embedctl/config.json` (falling back to
//! `~/.config/embedctl/config.json`). Command-line flags override the file.
//!
//! ```json
//! {
//!   "apiHost": "analytics.example.com",
//!   "embedDomain": "https://app.example.com",
//!   "acquireUrl": "https://app.example.com/api/embed/acquire",
//!   "refreshUrl": "https://app.example.com/api/embed/refresh",
//!   "user": { "external_user_id": "user-1", "permissions": ["access_data"] },
//!   "session": { "refreshFraction": 0.2, "refreshFloorSecs": 30 }
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use embed::SessionPolicy;
use embed_protocol::EmbedUser;
use serde::{Deserialize, Serialize};

use crate::error::{CliError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostSettings {
	/// Host serving the embedded application.
	pub api_host: Option<String>,
	/// Origin of the page hosting the frames.
	pub embed_domain: Option<String>,
	/// Host backend endpoint that acquires sessions.
	pub acquire_url: Option<String>,
	/// Host backend endpoint that refreshes session tokens.
	pub refresh_url: Option<String>,
	pub user_agent: Option<String>,
	/// Embed user forwarded with every acquisition.
	pub user: Option<EmbedUser>,
	pub session: SessionPolicy,
}

/// Backend endpoints resolved from settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayEndpoints {
	pub acquire: url::Url,
	pub refresh: url::Url,
}

impl HostSettings {
	/// Loads settings from `explicit`, or from the default path when it exists.
	///
	/// An explicit path that is missing is an error; a missing default file
	/// yields empty settings.
	pub fn load(explicit: Option<&Path>) -> Result<Self> {
		match explicit {
			Some(path) => read_settings(path),
			None => {
				let path = default_path();
				if path.exists() {
					read_settings(&path)
				} else {
					tracing::debug!(path = %path.display(), "No settings file, using defaults");
					Ok(Self::default())
				}
			}
		}
	}

	pub fn api_host(&self) -> Result<&str> {
		self.api_host.as_deref().ok_or_else(|| {
			CliError::InvalidInput("no api host configured (set apiHost or pass --api-host)".into())
		})
	}

	pub fn endpoints(&self) -> Result<GatewayEndpoints> {
		let acquire = parse_endpoint(self.acquire_url.as_deref(), "acquireUrl", "--acquire-url")?;
		let refresh = match self.refresh_url.as_deref() {
			Some(refresh) => parse_endpoint(Some(refresh), "refreshUrl", "--refresh-url")?,
			// Backends commonly serve refresh next to acquire.
			None => acquire.join("refresh").map_err(embed::Error::from)?,
		};
		Ok(GatewayEndpoints { acquire, refresh })
	}
}

fn parse_endpoint(value: Option<&str>, key: &str, flag: &str) -> Result<url::Url> {
	let value = value.ok_or_else(|| {
		CliError::InvalidInput(format!("no {key} configured (set {key} or pass {flag})"))
	})?;
	url::Url::parse(value)
		.map_err(|err| CliError::InvalidInput(format!("invalid {key} '{value}': {err}")))
}

fn read_settings(path: &Path) -> Result<HostSettings> {
	let content = fs::read_to_string(path).map_err(|err| CliError::Settings {
		path: path.to_path_buf(),
		message: err.to_string(),
	})?;
	serde_json::from_str(&content).map_err(|err| CliError::Settings {
		path: path.to_path_buf(),
		message: err.to_string(),
	})
}

/// `$XDG_CONFIG_HOME/embedctl/config.json`, or `~/.config/embedctl/config.json`.
pub fn default_path() -> PathBuf {
	settings_path(std::env::var_os("XDG_CONFIG_HOME"), std::env::var_os("HOME"))
}

fn settings_path(
	config_home: Option<std::ffi::OsString>,
	home: Option<std::ffi::OsString>,
) -> PathBuf {
	config_home
		.map(PathBuf::from)
		.or_else(|| home.map(|h| PathBuf::from(h).join(".config")))
		.unwrap_or_else(|| PathBuf::from("."))
		.join("embedctl")
		.join("config.json")
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn xdg_config_home_takes_precedence() {
		let path = settings_path(Some("/xdg".into()), Some("/home/me".into()));
		assert_eq!(path, PathBuf::from("/xdg/embedctl/config.json"));

		let path = settings_path(None, Some("/home/me".into()));
		assert_eq!(path, PathBuf::from("/home/me/.config/embedctl/config.json"));
	}

	#[test]
	fn loads_camel_case_file() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("config.json");
		fs::write(
			&path,
			r#"{
				"apiHost": "analytics.example.com",
				"acquireUrl": "https://app.example.com/api/embed/acquire",
				"user": { "external_user_id": "user-1" },
				"session": { "refreshFloorSecs": 60 }
			}"#,
		)
		.unwrap();

		let settings = HostSettings::load(Some(&path)).unwrap();
		assert_eq!(settings.api_host().unwrap(), "analytics.example.com");
		assert_eq!(settings.user.unwrap().external_user_id, "user-1");
		assert_eq!(settings.session.refresh_floor_secs, 60);
		assert_eq!(settings.session.refresh_fraction, SessionPolicy::default().refresh_fraction);
	}

	#[test]
	fn missing_explicit_file_is_an_error() {
		let tmp = TempDir::new().unwrap();
		let err = HostSettings::load(Some(&tmp.path().join("absent.json"))).unwrap_err();
		assert!(matches!(err, CliError::Settings { .. }));
	}

	#[test]
	fn malformed_file_is_an_error() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("config.json");
		fs::write(&path, "{ not json").unwrap();
		assert!(matches!(HostSettings::load(Some(&path)), Err(CliError::Settings { .. })));
	}

	#[test]
	fn refresh_endpoint_defaults_next_to_acquire() {
		let settings = HostSettings {
			acquire_url: Some("https://app.example.com/api/embed/acquire".into()),
			..Default::default()
		};
		let endpoints = settings.endpoints().unwrap();
		assert_eq!(endpoints.refresh.as_str(), "https://app.example.com/api/embed/refresh");
	}

	#[test]
	fn missing_acquire_endpoint_names_the_flag() {
		let err = HostSettings::default().endpoints().unwrap_err();
		assert!(err.to_string().contains("--acquire-url"));
	}
}
