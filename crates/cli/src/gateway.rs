//! HTTP client for the host backend's session endpoints.

use std::time::Duration;

use anyhow::Context;
use embed::{GatewayError, GatewayFuture, SessionGateway};
use embed_protocol::{
	AcquireRequest, AcquireResponse, EmbedUser, INVALID_TOKENS_MESSAGE, RefreshRequest,
	RefreshResponse,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::settings::{GatewayEndpoints, HostSettings};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Body posted to the acquire endpoint: the request plus the embed user.
#[derive(Debug, Serialize)]
struct AcquireBody<'a> {
	#[serde(flatten)]
	request: &'a AcquireRequest,
	#[serde(flatten)]
	user: Option<&'a EmbedUser>,
}

/// [`SessionGateway`] that POSTs JSON to the host backend.
///
/// Error bodies mentioning invalid input tokens map to
/// [`GatewayError::InvalidTokens`]; other non-success statuses are
/// [`GatewayError::Rejected`].
#[derive(Debug, Clone)]
pub struct HttpSessionGateway {
	client: reqwest::Client,
	endpoints: GatewayEndpoints,
	user: Option<EmbedUser>,
}

impl HttpSessionGateway {
	pub fn new(
		endpoints: GatewayEndpoints,
		user: Option<EmbedUser>,
		user_agent: Option<&str>,
	) -> Result<Self> {
		let user_agent = user_agent
			.map(str::to_string)
			.unwrap_or_else(|| concat!("embedctl/", env!("CARGO_PKG_VERSION")).to_string());
		let client = reqwest::Client::builder()
			.user_agent(user_agent)
			.timeout(REQUEST_TIMEOUT)
			.build()
			.context("failed to build HTTP client")?;
		Ok(Self {
			client,
			endpoints,
			user,
		})
	}

	pub fn from_settings(settings: &HostSettings) -> Result<Self> {
		Self::new(
			settings.endpoints()?,
			settings.user.clone(),
			settings.user_agent.as_deref(),
		)
	}

	pub fn endpoints(&self) -> &GatewayEndpoints {
		&self.endpoints
	}

	async fn post<B, T>(&self, url: &url::Url, body: &B) -> std::result::Result<T, GatewayError>
	where
		B: Serialize + ?Sized,
		T: DeserializeOwned,
	{
		tracing::debug!(target: "embedctl::gateway", %url, "POST");
		let response = self
			.client
			.post(url.clone())
			.json(body)
			.send()
			.await
			.map_err(|err| GatewayError::Unavailable(err.to_string()))?;

		let status = response.status();
		if !status.is_success() {
			let message = response.text().await.unwrap_or_default();
			tracing::debug!(target: "embedctl::gateway", %url, status = status.as_u16(), "Gateway rejected request");
			if message.contains(INVALID_TOKENS_MESSAGE) {
				return Err(GatewayError::InvalidTokens);
			}
			return Err(GatewayError::Rejected {
				status: status.as_u16(),
				message: message.trim().to_string(),
			});
		}

		let bytes = response
			.bytes()
			.await
			.map_err(|err| GatewayError::Unavailable(err.to_string()))?;
		serde_json::from_slice(&bytes).map_err(|err| GatewayError::Decode(err.to_string()))
	}
}

impl SessionGateway for HttpSessionGateway {
	fn acquire(&self, request: AcquireRequest) -> GatewayFuture<'_, AcquireResponse> {
		Box::pin(async move {
			let body = AcquireBody {
				request: &request,
				user: self.user.as_ref(),
			};
			self.post(&self.endpoints.acquire, &body).await
		})
	}

	fn refresh(&self, request: RefreshRequest) -> GatewayFuture<'_, RefreshResponse> {
		Box::pin(async move { self.post(&self.endpoints.refresh, &request).await })
	}
}
