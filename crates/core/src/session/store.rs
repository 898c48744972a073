//! In-memory token storage with absolute expiry times.

use std::time::Duration;

use embed_protocol::{AcquireResponse, RefreshRequest, RefreshedTokens, TokenPayload};
use parking_lot::Mutex;
use tokio::time::Instant;

/// A token value together with its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
	pub value: String,
	/// Lifetime the gateway issued the token with.
	pub ttl: Duration,
	pub expires_at: Instant,
}

impl Token {
	fn issued(value: String, ttl_secs: u64, received_at: Instant) -> Self {
		let ttl = Duration::from_secs(ttl_secs);
		Self {
			value,
			ttl,
			expires_at: received_at + ttl,
		}
	}

	pub fn remaining(&self, now: Instant) -> Duration {
		self.expires_at.saturating_duration_since(now)
	}

	pub fn is_expired(&self, now: Instant) -> bool {
		now >= self.expires_at
	}
}

/// A complete cookieless token set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTokens {
	pub api: Token,
	pub navigation: Token,
	/// Absent when the backend issued no reference token; refresh then
	/// falls back to acquisition.
	pub reference: Option<Token>,
	/// Bumped on every write so consumers can tell token sets apart.
	pub generation: u64,
}

impl SessionTokens {
	fn from_acquire(response: AcquireResponse, received_at: Instant, generation: u64) -> Self {
		let reference_ttl = response.session_reference_token_ttl;
		Self {
			api: Token::issued(response.api_token, response.api_token_ttl, received_at),
			navigation: Token::issued(
				response.navigation_token,
				response.navigation_token_ttl,
				received_at,
			),
			reference: response
				.session_reference_token
				.map(|value| Token::issued(value, reference_ttl, received_at)),
			generation,
		}
	}

	/// The reference token, if one is held and still valid at `now`.
	pub fn usable_reference(&self, now: Instant) -> Option<&Token> {
		self.reference.as_ref().filter(|token| !token.is_expired(now))
	}

	/// Request body for refreshing this token set, if it can be refreshed.
	pub fn refresh_request(&self, now: Instant) -> Option<RefreshRequest> {
		self.usable_reference(now).map(|reference| RefreshRequest {
			api_token: self.api.value.clone(),
			navigation_token: self.navigation.value.clone(),
			session_reference_token: reference.value.clone(),
		})
	}

	/// Lifetime of whichever of the api and navigation tokens is shorter.
	pub fn shortest_ttl(&self) -> Duration {
		self.api.ttl.min(self.navigation.ttl)
	}

	pub fn snapshot(&self, now: Instant) -> SessionSnapshot {
		SessionSnapshot {
			api_token: self.api.value.clone(),
			api_token_ttl: self.api.remaining(now).as_secs(),
			navigation_token: self.navigation.value.clone(),
			navigation_token_ttl: self.navigation.remaining(now).as_secs(),
			session_reference_token_ttl: self
				.reference
				.as_ref()
				.map_or(0, |token| token.remaining(now).as_secs()),
			generation: self.generation,
		}
	}
}

/// Tokens handed out to callers. The reference token never leaves the store.
///
/// TTLs are seconds remaining when the snapshot was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
	pub api_token: String,
	pub api_token_ttl: u64,
	pub navigation_token: String,
	pub navigation_token_ttl: u64,
	pub session_reference_token_ttl: u64,
	pub generation: u64,
}

impl SessionSnapshot {
	/// The tokens as sent to an embedded frame.
	pub fn to_payload(&self) -> TokenPayload {
		TokenPayload {
			api_token: self.api_token.clone(),
			api_token_ttl: self.api_token_ttl,
			navigation_token: self.navigation_token.clone(),
			navigation_token_ttl: self.navigation_token_ttl,
			session_reference_token_ttl: self.session_reference_token_ttl,
		}
	}
}

/// Holds at most one complete token set.
#[derive(Debug, Default)]
pub(crate) struct TokenStore {
	tokens: Mutex<Option<SessionTokens>>,
	generation: Mutex<u64>,
}

impl TokenStore {
	pub fn read(&self) -> Option<SessionTokens> {
		self.tokens.lock().clone()
	}

	/// Replaces the store contents with a fresh acquisition.
	pub fn write(&self, response: AcquireResponse, received_at: Instant) -> SessionTokens {
		let tokens = SessionTokens::from_acquire(response, received_at, self.next_generation());
		*self.tokens.lock() = Some(tokens.clone());
		tokens
	}

	/// Swaps in refreshed api and navigation tokens, keeping the reference
	/// token value. Returns `None` if the store was cleared meanwhile.
	pub fn apply_refresh(
		&self,
		refreshed: RefreshedTokens,
		received_at: Instant,
	) -> Option<SessionTokens> {
		let generation = self.next_generation();
		let mut guard = self.tokens.lock();
		let tokens = guard.as_mut()?;
		tokens.api = Token::issued(refreshed.api_token, refreshed.api_token_ttl, received_at);
		tokens.navigation = Token::issued(
			refreshed.navigation_token,
			refreshed.navigation_token_ttl,
			received_at,
		);
		if let Some(reference) = tokens.reference.as_mut() {
			*reference = Token::issued(
				std::mem::take(&mut reference.value),
				refreshed.session_reference_token_ttl,
				received_at,
			);
		}
		tokens.generation = generation;
		Some(tokens.clone())
	}

	pub fn clear(&self) {
		self.tokens.lock().take();
	}

	fn next_generation(&self) -> u64 {
		let mut generation = self.generation.lock();
		*generation += 1;
		*generation
	}
}
