//! Connection event fan-out.
//!
//! Every [`ConnectionEvent`](crate::ConnectionEvent) goes two ways: to one-shot
//! waiters registered with [`EventHub::once`] (the handshake wait), and to every
//! open [`EventStream`]. Waiters are served first and never miss an event;
//! streams are bounded and may fall behind.

use parking_lot::Mutex;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, oneshot};

/// Events buffered per stream before a slow reader starts skipping.
const STREAM_CAPACITY: usize = 128;

struct Waiter<E> {
	accepts: fn(&E) -> bool,
	reply: oneshot::Sender<E>,
}

pub(crate) struct EventHub<E: Clone + Send + 'static> {
	sender: broadcast::Sender<E>,
	waiters: Mutex<Vec<Waiter<E>>>,
}

impl<E: Clone + Send + 'static> EventHub<E> {
	pub fn with_capacity(capacity: usize) -> Self {
		Self {
			sender: broadcast::channel(capacity).0,
			waiters: Mutex::new(Vec::new()),
		}
	}

	/// Hands `event` to accepting waiters, then to every stream.
	///
	/// Returns the number of streams that received it.
	pub fn publish(&self, event: E) -> usize {
		let accepted: Vec<Waiter<E>> = {
			let mut waiters = self.waiters.lock();
			let (accepted, rest) = std::mem::take(&mut *waiters)
				.into_iter()
				.filter(|waiter| !waiter.reply.is_closed())
				.partition(|waiter| (waiter.accepts)(&event));
			*waiters = rest;
			accepted
		};
		for waiter in accepted {
			let _ = waiter.reply.send(event.clone());
		}
		self.sender.send(event).unwrap_or(0)
	}

	/// Resolves with the first published event `accepts` matches.
	///
	/// Register before inspecting state, so an event published in between is
	/// not lost.
	pub fn once(&self, accepts: fn(&E) -> bool) -> oneshot::Receiver<E> {
		let (reply, received) = oneshot::channel();
		self.waiters.lock().push(Waiter { accepts, reply });
		received
	}

	/// Opens a stream of events published from now on.
	pub fn stream(&self) -> EventStream<E> {
		EventStream {
			rx: self.sender.subscribe(),
			skipped: 0,
		}
	}

	#[cfg(test)]
	pub fn waiting(&self) -> usize {
		self.waiters.lock().len()
	}
}

impl<E: Clone + Send + 'static> Default for EventHub<E> {
	fn default() -> Self {
		Self::with_capacity(STREAM_CAPACITY)
	}
}

/// Events of one connection, in publish order.
///
/// A reader that falls more than the buffer behind skips the oldest events
/// rather than failing; [`skipped`](Self::skipped) counts them.
pub struct EventStream<E: Clone + Send + 'static> {
	rx: broadcast::Receiver<E>,
	skipped: u64,
}

impl<E: Clone + Send + 'static> EventStream<E> {
	/// Next event, or `None` once the connection is gone.
	pub async fn recv(&mut self) -> Option<E> {
		loop {
			match self.rx.recv().await {
				Ok(event) => return Some(event),
				Err(RecvError::Lagged(n)) => self.fell_behind(n),
				Err(RecvError::Closed) => return None,
			}
		}
	}

	/// Next buffered event, without waiting.
	pub fn try_recv(&mut self) -> Option<E> {
		loop {
			match self.rx.try_recv() {
				Ok(event) => return Some(event),
				Err(TryRecvError::Lagged(n)) => self.fell_behind(n),
				Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
			}
		}
	}

	/// Events dropped because this stream fell behind.
	pub fn skipped(&self) -> u64 {
		self.skipped
	}

	fn fell_behind(&mut self, n: u64) {
		self.skipped += n;
		tracing::warn!(skipped = n, total = self.skipped, "Connection event stream fell behind");
	}
}
