//! Embeddable content kinds and identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of content rendered inside an embedded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
	Dashboard,
	Explore,
	Look,
	Extension,
}

impl ContentKind {
	/// Message prefix used by the embedded application (`dashboard:run`, ...).
	pub fn as_str(self) -> &'static str {
		match self {
			ContentKind::Dashboard => "dashboard",
			ContentKind::Explore => "explore",
			ContentKind::Look => "look",
			ContentKind::Extension => "extension",
		}
	}

	/// Path segment under which the embedded application serves this kind.
	pub fn embed_path(self) -> &'static str {
		match self {
			ContentKind::Dashboard => "/embed/dashboards",
			ContentKind::Explore => "/embed/explore",
			ContentKind::Look => "/embed/looks",
			ContentKind::Extension => "/embed/extensions",
		}
	}

	pub fn parse(value: &str) -> Option<Self> {
		match value {
			"dashboard" | "dashboards" => Some(ContentKind::Dashboard),
			"explore" | "explores" => Some(ContentKind::Explore),
			"look" | "looks" => Some(ContentKind::Look),
			"extension" | "extensions" => Some(ContentKind::Extension),
			_ => None,
		}
	}
}

impl fmt::Display for ContentKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Identifier of a piece of embeddable content.
///
/// Dashboards and looks use numeric ids, LookML dashboards and explores use
/// string ids (`model/explore`), so the id is kept as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	/// Normalizes an explore id written in the legacy `model::explore` form.
	pub fn explore(id: impl Into<String>) -> Self {
		Self(id.into().replacen("::", "/", 1))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for ContentId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<u64> for ContentId {
	fn from(id: u64) -> Self {
		Self(id.to_string())
	}
}

impl From<u32> for ContentId {
	fn from(id: u32) -> Self {
		Self(id.to_string())
	}
}

impl From<i32> for ContentId {
	fn from(id: i32) -> Self {
		Self(id.to_string())
	}
}

impl From<&str> for ContentId {
	fn from(id: &str) -> Self {
		Self(id.to_string())
	}
}

impl From<String> for ContentId {
	fn from(id: String) -> Self {
		Self(id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn legacy_explore_ids_are_normalized() {
		assert_eq!(ContentId::explore("thelook::orders").as_str(), "thelook/orders");
		assert_eq!(ContentId::explore("thelook/orders").as_str(), "thelook/orders");
	}

	#[test]
	fn numeric_ids_render_as_strings() {
		assert_eq!(ContentId::from(42u64).as_str(), "42");
		assert_eq!(serde_json::to_string(&ContentId::from(7)).unwrap(), r#""7""#);
	}

	#[test]
	fn kind_parses_singular_and_plural() {
		assert_eq!(ContentKind::parse("looks"), Some(ContentKind::Look));
		assert_eq!(ContentKind::parse("dashboard"), Some(ContentKind::Dashboard));
		assert_eq!(ContentKind::parse("report"), None);
	}
}
