//! Frame `src` construction.

use url::Url;

use crate::builder::{EmbedConfig, EmbedTarget};
use crate::error::{Error, Result};

/// Version of the host/frame message protocol, announced as `sdk=`.
pub const SDK_VERSION: &str = "2";

/// Query parameters the library owns; host-supplied params cannot override them.
const RESERVED_PARAMS: &[&str] = &["embed_domain", "sdk", "embed_navigation_token"];

/// Resolves `api_host` to a base URL, defaulting to https.
pub fn host_base(api_host: &str) -> Result<Url> {
	let api_host = api_host.trim().trim_end_matches('/');
	if api_host.is_empty() {
		return Err(Error::Configuration("api host is empty".to_string()));
	}
	if api_host.contains("://") {
		Ok(Url::parse(api_host)?)
	} else {
		Ok(Url::parse(&format!("https://{api_host}"))?)
	}
}

/// Builds the `src` for a frame showing `config`.
///
/// Id targets resolve to `/embed/{kind}s/{id}` under the api host. Filters and
/// extra params are appended as query parameters, followed by
/// `embed_domain`, `sdk` and, in cookieless mode, `embed_navigation_token`.
pub fn embed_src(
	api_host: &str,
	embed_domain: Option<&str>,
	config: &EmbedConfig,
	navigation_token: Option<&str>,
) -> Result<Url> {
	let base = host_base(api_host)?;
	let mut src = match &config.target {
		EmbedTarget::Url(url) => base.join(url)?,
		EmbedTarget::Id(id) => base.join(&format!("{}/{}", config.content.embed_path(), id))?,
	};

	let existing: Vec<String> = src.query_pairs().map(|(key, _)| key.into_owned()).collect();
	{
		let mut query = src.query_pairs_mut();
		for (name, value) in &config.filters {
			query.append_pair(name, value);
		}
		for (name, value) in &config.params {
			if RESERVED_PARAMS.contains(&name.as_str()) {
				tracing::debug!(param = %name, "Ignoring reserved embed URL parameter");
				continue;
			}
			query.append_pair(name, value);
		}
		if !config.sandbox.is_empty() {
			query.append_pair("sandboxed_host", "true");
		}
		if let Some(domain) = embed_domain {
			if !existing.iter().any(|key| key == "embed_domain") {
				query.append_pair("embed_domain", domain);
			}
		}
		if !existing.iter().any(|key| key == "sdk") {
			query.append_pair("sdk", SDK_VERSION);
		}
		if let Some(token) = navigation_token {
			query.append_pair("embed_navigation_token", token);
		}
	}
	Ok(src)
}

#[cfg(test)]
mod tests {
	use std::collections::BTreeMap;

	use embed_protocol::{ContentId, ContentKind};

	use super::*;

	fn config(content: ContentKind, target: EmbedTarget) -> EmbedConfig {
		EmbedConfig {
			content,
			target,
			filters: BTreeMap::new(),
			params: BTreeMap::new(),
			class_name: None,
			container: "body".to_string(),
			sandbox: Vec::new(),
			allow: Vec::new(),
			dynamic_height: true,
			handshake_timeout: None,
		}
	}

	#[test]
	fn id_targets_use_the_content_path() {
		let config = config(ContentKind::Dashboard, EmbedTarget::Id(ContentId::from(42)));
		let src = embed_src("example.com:9999", Some("https://host.test"), &config, None).unwrap();

		assert_eq!(
			src.as_str(),
			"https://example.com:9999/embed/dashboards/42?embed_domain=https%3A%2F%2Fhost.test&sdk=2"
		);
	}

	#[test]
	fn explore_ids_keep_their_slash() {
		let config = config(
			ContentKind::Explore,
			EmbedTarget::Id(ContentId::explore("thelook::orders")),
		);
		let src = embed_src("https://example.com", None, &config, None).unwrap();

		assert_eq!(src.path(), "/embed/explore/thelook/orders");
	}

	#[test]
	fn filters_and_navigation_token_are_appended() {
		let mut config = config(ContentKind::Look, EmbedTarget::Id(ContentId::from(7)));
		config.filters.insert("State".into(), "California".into());
		config.params.insert("theme".into(), "dark".into());
		config.params.insert("sdk".into(), "1".into());

		let src = embed_src("example.com", None, &config, Some("N1")).unwrap();
		let pairs: Vec<(String, String)> = src.query_pairs().into_owned().collect();

		assert_eq!(
			pairs,
			vec![
				("State".to_string(), "California".to_string()),
				("theme".to_string(), "dark".to_string()),
				("sdk".to_string(), "2".to_string()),
				("embed_navigation_token".to_string(), "N1".to_string()),
			]
		);
	}

	#[test]
	fn url_targets_keep_their_own_parameters() {
		let config = config(
			ContentKind::Dashboard,
			EmbedTarget::Url("/embed/dashboards/3?sdk=2&embed_domain=https://a.test".into()),
		);
		let src = embed_src("example.com", Some("https://b.test"), &config, None).unwrap();
		let pairs: Vec<(String, String)> = src.query_pairs().into_owned().collect();

		assert_eq!(pairs.len(), 2);
		assert_eq!(pairs[1], ("embed_domain".to_string(), "https://a.test".to_string()));
	}

	#[test]
	fn sandboxed_frames_are_announced() {
		let mut config = config(ContentKind::Dashboard, EmbedTarget::Id(ContentId::from(1)));
		config.sandbox.push("allow-scripts".into());

		let src = embed_src("example.com", None, &config, None).unwrap();
		assert!(src.query_pairs().any(|(k, v)| k == "sandboxed_host" && v == "true"));
	}

	#[test]
	fn empty_host_is_rejected() {
		assert!(matches!(host_base("  "), Err(Error::Configuration(_))));
	}
}
