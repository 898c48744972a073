//! Cookieless sessions shared between several embeds.

use std::sync::Arc;
use std::time::Duration;

use embed::testing::{EmbeddedFrame, MemoryFrameHost, ScriptedGateway};
use embed::{
	ConnectionEvent, EmbedContext, SessionCoordinator, SessionPolicy, SessionUpdate, names,
};
use embed_protocol::RefreshResponse;
use serde_json::Value;

fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_test_writer()
		.with_env_filter("embed=debug")
		.try_init();
}

fn manual() -> SessionPolicy {
	SessionPolicy {
		proactive_refresh: false,
		..SessionPolicy::default()
	}
}

fn setup(
	policy: SessionPolicy,
) -> (MemoryFrameHost, Arc<ScriptedGateway>, Arc<SessionCoordinator>, EmbedContext) {
	init_tracing();
	let host = MemoryFrameHost::new().with_auto_ready();
	let gateway = Arc::new(ScriptedGateway::new());
	let session = SessionCoordinator::new(gateway.clone(), policy);
	let context = EmbedContext::cookieless(
		"analytics.example.com",
		Arc::new(host.clone()),
		Arc::clone(&session),
	)
	.with_embed_domain("https://app.example.com");
	(host, gateway, session, context)
}

async fn wait_for_api_token(session: &SessionCoordinator, token: &str) -> anyhow::Result<()> {
	session
		.subscribe()
		.wait_for(|update| matches!(update, SessionUpdate::Active(s) if s.api_token == token))
		.await?;
	Ok(())
}

fn tokens_sent(frame: &EmbeddedFrame) -> Vec<Value> {
	frame
		.sent()
		.into_iter()
		.filter(|message| message["type"] == names::SESSION_TOKENS)
		.collect()
}

#[tokio::test(start_paused = true)]
async fn scheduled_refresh_reaches_every_connection() -> anyhow::Result<()> {
	let (host, gateway, session, context) = setup(SessionPolicy::default());
	let dashboard = context.dashboard_with_id(1).connect().await?;
	let look = context.look_with_id(2).connect().await?;
	assert_eq!(gateway.acquire_calls(), 1);

	wait_for_api_token(&session, "A2").await?;
	dashboard.run()?;
	look.run()?;

	assert_eq!(gateway.refresh_calls(), 1);
	for frame in host.frames() {
		let sent = frame.sent_types();
		let n = sent.len();
		assert_eq!(sent[n - 2], names::SESSION_TOKENS);
		assert!(sent[n - 1].ends_with(":run"));

		let tokens = tokens_sent(&frame);
		assert_eq!(tokens.len(), 1);
		assert_eq!(tokens[0]["api_token"], "A2");
		assert_eq!(tokens[0]["navigation_token"], "N2");
	}
	assert_eq!(dashboard.api_token().as_deref(), Some("A2"));
	assert_eq!(look.api_token().as_deref(), Some("A2"));
	Ok(())
}

#[tokio::test(start_paused = true)]
async fn late_embed_triggers_refresh_with_reference_token() -> anyhow::Result<()> {
	let (host, gateway, session, context) = setup(manual());
	let _dashboard = context.dashboard_with_id(1).connect().await?;

	tokio::time::advance(Duration::from_secs(580)).await;
	let explore = context.explore_with_id("thelook::orders").connect().await?;

	// The still-valid tokens are used while the refresh runs.
	let frame = host.frame(explore.frame_id()).expect("explore frame");
	assert_eq!(frame.sent()[0]["api_token"], "A1");
	assert!(frame.src().contains("/embed/explore/thelook/orders?"));

	wait_for_api_token(&session, "A2").await?;
	assert_eq!(gateway.refresh_requests()[0].session_reference_token, "R1");
	assert_eq!(gateway.acquire_calls(), 1);

	explore.run()?;
	assert_eq!(tokens_sent(&frame).len(), 1);
	assert_eq!(explore.api_token().as_deref(), Some("A2"));
	Ok(())
}

#[tokio::test(start_paused = true)]
async fn expired_session_notifies_every_connection() -> anyhow::Result<()> {
	let (_host, gateway, session, context) = setup(manual());
	let dashboard = context.dashboard_with_id(1).connect().await?;
	let look = context.look_with_id(2).connect().await?;
	let mut dashboard_events = dashboard.events();
	let mut look_events = look.events();

	gateway.push_refresh(Ok(RefreshResponse::expired()));
	assert!(session.refresh().await.is_err());

	for events in [&mut dashboard_events, &mut look_events] {
		loop {
			match events.recv().await {
				Some(ConnectionEvent::SessionExpired) => break,
				Some(_) => continue,
				None => anyhow::bail!("connection closed before expiry was reported"),
			}
		}
	}
	assert!(session.current().is_none());

	let snapshot = session.ensure_session().await?;
	assert_eq!(snapshot.api_token, "A2");
	assert_eq!(gateway.acquire_requests()[1].session_reference_token, None);
	Ok(())
}

#[tokio::test]
async fn builder_configuration_round_trips() -> anyhow::Result<()> {
	let (_host, _gateway, _session, context) = setup(manual());
	let builder = context.dashboard_with_id(42).with_filters([("a", "b")]);

	let config = builder.build()?;
	assert_eq!(config.target, embed::EmbedTarget::Id(42.into()));
	assert_eq!(config.filters.get("a").map(String::as_str), Some("b"));
	assert_eq!(config, builder.build()?);
	Ok(())
}
