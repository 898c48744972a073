//! Wire types for embedded content sessions.
//!
//! This crate contains the serde-serializable shapes exchanged at the two
//! boundaries of an embed host:
//!
//! - [`session`] - requests and responses of the cookieless session gateway
//!   (acquire and refresh endpoints implemented by the host backend)
//! - [`message`] - messages sent between the host and an embedded frame
//! - [`content`] - the kinds of embeddable content and their identifiers
//!
//! Types here are pure data. Optional fields on gateway responses are decoded
//! once into named cases (see [`RefreshResponse::into_outcome`]) so callers
//! never probe ad-hoc shapes.

pub mod content;
pub mod message;
pub mod session;

pub use content::*;
pub use message::*;
pub use session::*;
