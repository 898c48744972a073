//! Host handlers for embed events.
//!
//! A connection keeps its handlers in a [`HandlerRegistry`], keyed by
//! [`HandlerId`] and tagged with the event name. Insertion order is kept, so
//! handlers for the same event run in the order they were registered.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use embed_protocol::{EmbedEvent, EventReply};
use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::error::Result;

/// Identifies one registration, unique across connections.
pub type HandlerId = u64;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Boxed future of a handler, resolving to its reply to the frame.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<EventReply>> + Send>>;

/// Type-erased async event handler.
pub type HandlerFn = Arc<dyn Fn(EmbedEvent) -> HandlerFuture + Send + Sync>;

pub fn handler_fn<F, Fut>(handler: F) -> HandlerFn
where
	F: Fn(EmbedEvent) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = Result<EventReply>> + Send + 'static,
{
	Arc::new(move |event: EmbedEvent| -> HandlerFuture { Box::pin(handler(event)) })
}

struct Registration {
	event: String,
	handler: HandlerFn,
}

type Slots = Mutex<IndexMap<HandlerId, Registration>>;

/// Handlers of one connection.
#[derive(Clone, Default)]
pub(crate) struct HandlerRegistry {
	slots: Arc<Slots>,
}

impl HandlerRegistry {
	pub fn register(&self, event: impl Into<String>, handler: HandlerFn) -> HandlerId {
		let id = NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed);
		self.slots.lock().insert(
			id,
			Registration {
				event: event.into(),
				handler,
			},
		);
		id
	}

	/// Handlers for `event` in registration order, with their ids.
	pub fn matching(&self, event: &str) -> Vec<(HandlerId, HandlerFn)> {
		self.slots
			.lock()
			.iter()
			.filter(|(_, registration)| registration.event == event)
			.map(|(id, registration)| (*id, Arc::clone(&registration.handler)))
			.collect()
	}

	/// A [`Subscription`] that removes `id` from this registry when dropped.
	pub fn subscription(&self, id: HandlerId) -> Subscription {
		Subscription {
			id,
			slots: Some(Arc::downgrade(&self.slots)),
		}
	}

	pub fn clear(&self) {
		self.slots.lock().clear();
	}

	#[cfg(test)]
	pub fn len(&self) -> usize {
		self.slots.lock().len()
	}
}

/// Keeps a handler registered until dropped.
///
/// Only weakly tied to its connection: dropping it after the connection
/// closed does nothing.
#[must_use = "dropping a Subscription unregisters its handler; call detach() to keep it"]
pub struct Subscription {
	id: HandlerId,
	slots: Option<Weak<Slots>>,
}

impl Subscription {
	pub fn id(&self) -> HandlerId {
		self.id
	}

	/// Keeps the handler for the rest of the connection's life.
	pub fn detach(mut self) {
		self.slots = None;
	}

	/// Removes the handler now. Same as dropping.
	pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(slots) = self.slots.take().and_then(|weak| weak.upgrade()) {
			slots.lock().shift_remove(&self.id);
		}
	}
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription")
			.field("id", &self.id)
			.field("attached", &self.slots.is_some())
			.finish()
	}
}
