//! embed: host-side SDK for embedding remote content in frames.
//!
//! A host page embeds dashboards, explores, looks and extensions served by
//! another application. Each embed is a frame with a message channel; this
//! crate mounts the frame, performs the handshake, sends commands and routes
//! the embedded application's events to host handlers. Without third-party
//! cookies, frames authenticate with a short-lived cookieless session that a
//! single [`SessionCoordinator`] acquires, refreshes and shares between them.
//!
//! # Examples
//!
//! ## Cookieless dashboard
//!
//! ```ignore
//! use std::sync::Arc;
//! use embed::{EmbedContext, EventReply, SessionCoordinator, SessionPolicy};
//!
//! let session = SessionCoordinator::new(Arc::new(gateway), SessionPolicy::default());
//! let context = EmbedContext::cookieless("analytics.example.com", frame_host, session)
//!     .with_embed_domain("https://app.example.com");
//!
//! let dashboard = context
//!     .dashboard_with_id(42)
//!     .with_filter("State", "California")
//!     .on("drillmenu:click", |_event| async { Ok(EventReply::cancel()) })
//!     .connect()
//!     .await?;
//!
//! dashboard.run()?;
//! ```
//!
//! ## Observing a connection
//!
//! ```ignore
//! let mut events = dashboard.events();
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ConnectionEvent::Embed(event) => println!("{}", event.name),
//!         ConnectionEvent::SessionExpired => println!("session expired"),
//!         ConnectionEvent::Closed => break,
//!         _ => {}
//!     }
//! }
//! ```

pub mod builder;
pub mod connection;
pub mod context;
pub mod error;
pub mod events;
pub mod frame;
pub mod frame_url;
pub mod handlers;
pub mod session;
pub mod testing;

pub use builder::{EmbedBuilder, EmbedConfig, EmbedTarget};
pub use connection::{ConnectionEvent, ConnectionState, EmbedConnection};
pub use context::{AuthMode, EmbedContext};
pub use embed_protocol::{
	Command, ContentId, ContentKind, EmbedEvent, EventReply, LifecycleEvent, PageProperties,
	names,
};
pub use error::{Error, Result};
pub use events::EventStream;
pub use frame::{FrameHost, FrameId, FrameSpec, FrameTransport, MountedFrame, TransportParts};
pub use handlers::{HandlerFn, HandlerId, Subscription};
pub use session::{
	FnGateway, GatewayError, GatewayFuture, SessionCoordinator, SessionGateway, SessionPolicy,
	SessionSnapshot, SessionUpdate,
};
