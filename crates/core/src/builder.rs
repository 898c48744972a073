//! Embed configuration builder.
//!
//! [`EmbedBuilder`] accumulates everything needed to embed one piece of
//! content, validates it into an [`EmbedConfig`] and drives a connection to
//! the ready state.
//!
//! # Example
//!
//! ```ignore
//! let dashboard = context
//!     .dashboard_with_id(42)
//!     .with_filter("State", "California")
//!     .append_to("#dashboard")
//!     .on("dashboard:run:complete", |_event| async { Ok(EventReply::proceed()) })
//!     .connect()
//!     .await?;
//! dashboard.run()?;
//! ```

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use embed_protocol::{ContentId, ContentKind, EmbedEvent, EventReply};
use serde::{Deserialize, Serialize};

use crate::connection::EmbedConnection;
use crate::context::EmbedContext;
use crate::error::{Error, Result};
use crate::handlers::{HandlerFn, handler_fn};

/// Where the frame's content comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedTarget {
	/// A complete or host-relative URL, used as-is.
	Url(String),
	/// Content id, resolved under the content kind's embed path.
	Id(ContentId),
}

/// Validated embed configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedConfig {
	pub content: ContentKind,
	pub target: EmbedTarget,
	pub filters: BTreeMap<String, String>,
	/// Extra query parameters for the frame URL.
	pub params: BTreeMap<String, String>,
	pub class_name: Option<String>,
	/// Mount point selector.
	pub container: String,
	pub sandbox: Vec<String>,
	pub allow: Vec<String>,
	/// Resize the frame to the embedded content's height.
	pub dynamic_height: bool,
	pub handshake_timeout: Option<Duration>,
}

/// Default mount point when [`EmbedBuilder::append_to`] is not called.
pub const DEFAULT_CONTAINER: &str = "body";

/// Accumulates embed configuration and event handlers.
#[must_use]
pub struct EmbedBuilder {
	context: EmbedContext,
	content: Option<ContentKind>,
	url: Option<String>,
	id: Option<ContentId>,
	filters: BTreeMap<String, String>,
	params: BTreeMap<String, String>,
	class_name: Option<String>,
	container: Option<String>,
	sandbox: Vec<String>,
	allow: Vec<String>,
	dynamic_height: bool,
	handshake_timeout: Option<Duration>,
	handlers: Vec<(String, HandlerFn)>,
}

impl EmbedBuilder {
	pub fn new(context: EmbedContext) -> Self {
		Self {
			context,
			content: None,
			url: None,
			id: None,
			filters: BTreeMap::new(),
			params: BTreeMap::new(),
			class_name: None,
			container: None,
			sandbox: Vec::new(),
			allow: Vec::new(),
			dynamic_height: true,
			handshake_timeout: None,
			handlers: Vec::new(),
		}
	}

	pub fn with_content(mut self, content: ContentKind) -> Self {
		self.content = Some(content);
		self
	}

	/// Embeds a complete or host-relative URL.
	pub fn with_url(mut self, url: impl Into<String>) -> Self {
		self.url = Some(url.into());
		self
	}

	pub fn with_id(mut self, id: impl Into<ContentId>) -> Self {
		self.id = Some(id.into());
		self
	}

	/// Replaces all filters.
	pub fn with_filters<I, K, V>(mut self, filters: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		self.filters = filters
			.into_iter()
			.map(|(name, value)| (name.into(), value.into()))
			.collect();
		self
	}

	pub fn with_filter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.filters.insert(name.into(), value.into());
		self
	}

	pub fn with_class_name(mut self, class_name: impl Into<String>) -> Self {
		self.class_name = Some(class_name.into());
		self
	}

	/// Sandbox attribute flags for the frame, e.g. `allow-scripts`.
	pub fn with_sandbox<I, S>(mut self, flags: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.sandbox = flags.into_iter().map(Into::into).collect();
		self
	}

	/// Permissions policy features for the frame, e.g. `fullscreen`.
	pub fn with_allow<I, S>(mut self, features: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.allow = features.into_iter().map(Into::into).collect();
		self
	}

	/// Adds extra query parameters to the frame URL.
	pub fn with_params<I, K, V>(mut self, params: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		self.params.extend(
			params
				.into_iter()
				.map(|(name, value)| (name.into(), value.into())),
		);
		self
	}

	pub fn with_dynamic_height(mut self, enabled: bool) -> Self {
		self.dynamic_height = enabled;
		self
	}

	/// Fails [`connect`](Self::connect) if the frame has not acknowledged the
	/// handshake within `timeout`.
	pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
		self.handshake_timeout = Some(timeout);
		self
	}

	/// Mounts the frame inside the element matching `selector`.
	pub fn append_to(mut self, selector: impl Into<String>) -> Self {
		self.container = Some(selector.into());
		self
	}

	/// Registers a handler for events named `event`.
	///
	/// Handlers for the same event run in registration order. For events
	/// that expect a reply, any handler returning [`EventReply::cancel`]
	/// cancels the embedded application's default behavior.
	pub fn on<F, Fut>(mut self, event: impl Into<String>, handler: F) -> Self
	where
		F: Fn(EmbedEvent) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<EventReply>> + Send + 'static,
	{
		self.handlers.push((event.into(), handler_fn(handler)));
		self
	}

	pub fn context(&self) -> &EmbedContext {
		&self.context
	}

	/// Validates the accumulated configuration.
	///
	/// Building does not consume the builder; building twice yields equal
	/// configurations.
	pub fn build(&self) -> Result<EmbedConfig> {
		let content = self
			.content
			.ok_or_else(|| Error::Configuration("content kind is not set".to_string()))?;
		let target = match (&self.url, &self.id) {
			(Some(_), Some(_)) => {
				return Err(Error::Configuration(
					"set either a url or an id, not both".to_string(),
				));
			}
			(None, None) => {
				return Err(Error::Configuration(
					"a url or an id is required".to_string(),
				));
			}
			(Some(url), None) if url.trim().is_empty() => {
				return Err(Error::Configuration("url is empty".to_string()));
			}
			(Some(url), None) => EmbedTarget::Url(url.clone()),
			(None, Some(id)) if id.as_str().is_empty() => {
				return Err(Error::Configuration("id is empty".to_string()));
			}
			(None, Some(id)) if content == ContentKind::Explore => {
				EmbedTarget::Id(ContentId::explore(id.as_str()))
			}
			(None, Some(id)) => EmbedTarget::Id(id.clone()),
		};

		Ok(EmbedConfig {
			content,
			target,
			filters: self.filters.clone(),
			params: self.params.clone(),
			class_name: self.class_name.clone(),
			container: self
				.container
				.clone()
				.unwrap_or_else(|| DEFAULT_CONTAINER.to_string()),
			sandbox: self.sandbox.clone(),
			allow: self.allow.clone(),
			dynamic_height: self.dynamic_height,
			handshake_timeout: self.handshake_timeout,
		})
	}

	/// Builds, mounts the frame and waits for the handshake.
	///
	/// Resolves with the ready connection, or the first error on the way.
	pub async fn connect(self) -> Result<EmbedConnection> {
		let config = self.build()?;
		let connection = EmbedConnection::open(&self.context, config, self.handlers).await?;
		connection.wait_ready().await?;
		Ok(connection)
	}
}

impl std::fmt::Debug for EmbedBuilder {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EmbedBuilder")
			.field("content", &self.content)
			.field("url", &self.url)
			.field("id", &self.id)
			.field("filters", &self.filters)
			.field(
				"handlers",
				&self.handlers.iter().map(|(name, _)| name).collect::<Vec<_>>(),
			)
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use super::*;
	use crate::testing::MemoryFrameHost;

	fn context() -> EmbedContext {
		EmbedContext::new("example.com", Arc::new(MemoryFrameHost::new()))
	}

	#[test]
	fn builds_id_and_filters() {
		let builder = context()
			.dashboard_with_id(42)
			.with_filters([("a", "b")]);
		let config = builder.build().unwrap();

		assert_eq!(config.content, ContentKind::Dashboard);
		assert_eq!(config.target, EmbedTarget::Id(ContentId::from(42)));
		assert_eq!(config.filters, BTreeMap::from([("a".to_string(), "b".to_string())]));
		assert_eq!(config.container, DEFAULT_CONTAINER);
		assert!(config.dynamic_height);
	}

	#[test]
	fn building_twice_yields_equal_configs() {
		let builder = context()
			.look_with_id(7)
			.with_filter("State", "California")
			.with_class_name("report")
			.on("look:loaded", |_| async { Ok(EventReply::proceed()) });

		assert_eq!(builder.build().unwrap(), builder.build().unwrap());
	}

	#[test]
	fn url_and_id_are_exclusive() {
		let err = context()
			.dashboard_with_id(1)
			.with_url("/embed/dashboards/1")
			.build()
			.unwrap_err();
		assert!(matches!(err, Error::Configuration(_)));
	}

	#[test]
	fn target_is_required() {
		let builder = EmbedBuilder::new(context()).with_content(ContentKind::Look);
		assert!(matches!(builder.build(), Err(Error::Configuration(_))));
	}

	#[test]
	fn content_kind_is_required() {
		let builder = EmbedBuilder::new(context()).with_id("1");
		assert!(matches!(builder.build(), Err(Error::Configuration(_))));
	}

	#[test]
	fn legacy_explore_ids_are_normalized() {
		let config = context()
			.explore_with_id("thelook::orders")
			.build()
			.unwrap();
		assert_eq!(config.target, EmbedTarget::Id(ContentId::new("thelook/orders")));
	}

	#[test]
	fn later_filters_replace_earlier_ones() {
		let config = context()
			.dashboard_with_id(1)
			.with_filter("stale", "x")
			.with_filters([("fresh", "y")])
			.with_params([("theme", "dark")])
			.build()
			.unwrap();
		assert_eq!(config.filters.len(), 1);
		assert_eq!(config.filters["fresh"], "y");
		assert_eq!(config.params["theme"], "dark");
	}

	#[test]
	fn config_serializes_camel_case() {
		let config = context()
			.extension_with_url("/embed/extensions/app::main")
			.with_dynamic_height(false)
			.build()
			.unwrap();
		let value = serde_json::to_value(&config).unwrap();

		assert_eq!(value["content"], "extension");
		assert_eq!(value["target"]["url"], "/embed/extensions/app::main");
		assert_eq!(value["dynamicHeight"], false);
	}
}
