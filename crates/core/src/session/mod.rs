//! Cookieless session lifecycle.
//!
//! A [`SessionCoordinator`] owns the one token set shared by every embed on
//! the page. It acquires a session through a [`SessionGateway`] on first use,
//! refreshes it ahead of expiry, and publishes every change as a
//! [`SessionUpdate`] so live connections can pass new tokens to their frames.
//!
//! # Token lifetimes
//!
//! | Token                     | Used for                          | Typical TTL |
//! |---------------------------|-----------------------------------|-------------|
//! | `api_token`               | API calls from the embedded app   | 10 minutes  |
//! | `navigation_token`        | Appended to frame navigations     | 1 hour      |
//! | `session_reference_token` | Identifies the session on refresh | 24 hours    |

mod coordinator;
mod gateway;
mod policy;
mod store;


pub use coordinator::{SessionCoordinator, SessionUpdate};
pub use gateway::{FnGateway, GatewayError, GatewayFuture, SessionGateway};
pub use policy::SessionPolicy;
pub use store::{SessionSnapshot, SessionTokens, Token};
