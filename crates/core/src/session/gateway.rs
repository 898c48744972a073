//! The host backend's session endpoints, as seen by the coordinator.

use std::future::Future;
use std::pin::Pin;

use embed_protocol::{AcquireRequest, AcquireResponse, RefreshRequest, RefreshResponse};
use thiserror::Error;

/// Errors a [`SessionGateway`] reports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
	/// The backend rejected the tokens outright; the session cannot be refreshed.
	#[error("session tokens rejected as invalid")]
	InvalidTokens,

	#[error("gateway rejected the request with status {status}: {message}")]
	Rejected { status: u16, message: String },

	#[error("gateway unavailable: {0}")]
	Unavailable(String),

	#[error("malformed gateway response: {0}")]
	Decode(String),
}

pub type GatewayFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, GatewayError>> + Send + 'a>>;

/// Acquire and refresh calls against the host backend.
///
/// Implementations only perform the round-trip. Expiry tracking, retries and
/// de-duplication belong to [`SessionCoordinator`](super::SessionCoordinator).
pub trait SessionGateway: Send + Sync {
	fn acquire(&self, request: AcquireRequest) -> GatewayFuture<'_, AcquireResponse>;

	fn refresh(&self, request: RefreshRequest) -> GatewayFuture<'_, RefreshResponse>;
}

/// A [`SessionGateway`] backed by two async closures.
pub struct FnGateway<A, R> {
	acquire: A,
	refresh: R,
}

impl<A, R> FnGateway<A, R> {
	pub fn new(acquire: A, refresh: R) -> Self {
		Self { acquire, refresh }
	}
}

impl<A, AFut, R, RFut> SessionGateway for FnGateway<A, R>
where
	A: Fn(AcquireRequest) -> AFut + Send + Sync,
	AFut: Future<Output = Result<AcquireResponse, GatewayError>> + Send + 'static,
	R: Fn(RefreshRequest) -> RFut + Send + Sync,
	RFut: Future<Output = Result<RefreshResponse, GatewayError>> + Send + 'static,
{
	fn acquire(&self, request: AcquireRequest) -> GatewayFuture<'_, AcquireResponse> {
		Box::pin((self.acquire)(request))
	}

	fn refresh(&self, request: RefreshRequest) -> GatewayFuture<'_, RefreshResponse> {
		Box::pin((self.refresh)(request))
	}
}

impl<A, R> std::fmt::Debug for FnGateway<A, R> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FnGateway").finish_non_exhaustive()
	}
}
