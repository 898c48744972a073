use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use embed_protocol::{ContentKind, EmbedEvent, EventReply, names};
use serde_json::json;

use super::*;
use crate::session::{GatewayError, SessionPolicy};
use crate::testing::{MemoryFrameHost, ScriptedGateway};

fn cookie_context(host: &MemoryFrameHost) -> EmbedContext {
	EmbedContext::new("example.com", Arc::new(host.clone())).with_embed_domain("https://host.test")
}

fn cookieless_context(
	host: &MemoryFrameHost,
	gateway: &Arc<ScriptedGateway>,
) -> (EmbedContext, Arc<SessionCoordinator>) {
	let policy = SessionPolicy {
		proactive_refresh: false,
		..SessionPolicy::default()
	};
	let session = SessionCoordinator::new(gateway.clone(), policy);
	let context = EmbedContext::cookieless("example.com", Arc::new(host.clone()), Arc::clone(&session));
	(context, session)
}

async fn next_matching<F>(events: &mut EventStream<ConnectionEvent>, predicate: F) -> ConnectionEvent
where
	F: Fn(&ConnectionEvent) -> bool,
{
	tokio::time::timeout(Duration::from_secs(5), async {
		loop {
			let event = events.recv().await.expect("event stream closed");
			if predicate(&event) {
				return event;
			}
		}
	})
	.await
	.expect("timed out waiting for connection event")
}

async fn next_embed_event(events: &mut EventStream<ConnectionEvent>, name: &str) -> EmbedEvent {
	match next_matching(events, |e| matches!(e, ConnectionEvent::Embed(ev) if ev.name == name)).await {
		ConnectionEvent::Embed(event) => event,
		other => panic!("unexpected event {other:?}"),
	}
}

fn counting_handler(count: &Arc<AtomicUsize>, reply: EventReply) -> HandlerFn {
	let count = Arc::clone(count);
	handler_fn(move |_| {
		let count = Arc::clone(&count);
		async move {
			count.fetch_add(1, Ordering::SeqCst);
			Ok(reply)
		}
	})
}

#[tokio::test]
async fn handshake_completes_on_acknowledgement() {
	let host = MemoryFrameHost::new();
	let context = cookie_context(&host);
	let config = context.dashboard_with_id(42).build().unwrap();

	let connection = EmbedConnection::open(&context, config, Vec::new()).await.unwrap();
	assert_eq!(connection.state(), ConnectionState::Handshaking);

	let frame = host.frame(connection.frame_id()).unwrap();
	assert_eq!(frame.sent(), vec![json!({"type": "embed:connect"})]);
	assert!(frame.src().starts_with("https://example.com/embed/dashboards/42?"));

	frame.acknowledge();
	connection.wait_ready().await.unwrap();
	assert_eq!(connection.state(), ConnectionState::Ready);
	assert!(connection.api_token().is_none());
}

#[tokio::test]
async fn cookieless_connect_carries_tokens() {
	let host = MemoryFrameHost::new().with_auto_ready();
	let gateway = Arc::new(ScriptedGateway::new());
	let (context, _session) = cookieless_context(&host, &gateway);

	let connection = context.look_with_id(7).connect().await.unwrap();

	let frame = host.last_frame().unwrap();
	let connect = &frame.sent()[0];
	assert_eq!(connect["type"], names::CONNECT);
	assert_eq!(connect["api_token"], "A1");
	assert_eq!(connect["navigation_token"], "N1");
	assert!(connect.get("session_reference_token").is_none());
	assert!(frame.src().contains("embed_navigation_token=N1"));
	assert_eq!(connection.api_token().as_deref(), Some("A1"));
}

#[tokio::test]
async fn failed_acquisition_mounts_nothing() {
	let host = MemoryFrameHost::new().with_auto_ready();
	let gateway = Arc::new(ScriptedGateway::new());
	gateway.push_acquire(Err(GatewayError::Unavailable("down".into())));
	let (context, _session) = cookieless_context(&host, &gateway);

	let err = context.dashboard_with_id(1).connect().await.unwrap_err();

	assert!(matches!(err, Error::SessionAcquisition(_)));
	assert!(host.frames().is_empty());
}

#[tokio::test]
async fn disconnect_while_handshaking_closes_without_dispatch() {
	let host = MemoryFrameHost::new();
	let context = cookie_context(&host);
	let config = context.dashboard_with_id(42).build().unwrap();
	let calls = Arc::new(AtomicUsize::new(0));
	let handlers = vec![(
		"dashboard:loaded".to_string(),
		counting_handler(&calls, EventReply::proceed()),
	)];

	let connection = EmbedConnection::open(&context, config, handlers).await.unwrap();
	let frame = host.frame(connection.frame_id()).unwrap();
	let waiting = tokio::spawn({
		let connection = connection.clone();
		async move { connection.wait_ready().await }
	});
	tokio::task::yield_now().await;

	connection.disconnect();
	frame.acknowledge();
	frame.emit(EmbedEvent::new("dashboard:loaded"));

	let err = waiting.await.unwrap().unwrap_err();
	assert!(matches!(err, Error::ConnectionClosed));
	assert_eq!(connection.state(), ConnectionState::Closed);
	assert!(!frame.is_mounted());
	tokio::task::yield_now().await;
	assert_eq!(calls.load(Ordering::SeqCst), 0);
	assert!(matches!(connection.run(), Err(Error::ConnectionClosed)));
}

#[tokio::test(start_paused = true)]
async fn handshake_timeout_errors_and_removes_frame() {
	let host = MemoryFrameHost::new();
	let context = cookie_context(&host);

	let err = context
		.dashboard_with_id(42)
		.with_handshake_timeout(Duration::from_secs(5))
		.connect()
		.await
		.unwrap_err();

	assert!(matches!(err, Error::HandshakeTimeout { timeout_ms: 5000 }));
	assert!(err.is_timeout());
	assert_eq!(host.mounted_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn disconnect_at_handshake_deadline_reports_closed() {
	let host = MemoryFrameHost::new();
	let context = cookie_context(&host);
	let config = context
		.dashboard_with_id(42)
		.with_handshake_timeout(Duration::from_secs(5))
		.build()
		.unwrap();
	let connection = EmbedConnection::open(&context, config, Vec::new()).await.unwrap();

	let ready = connection.wait_ready();
	tokio::pin!(ready);
	assert!(futures_util::poll!(ready.as_mut()).is_pending());
	tokio::time::advance(Duration::from_secs(5)).await;
	connection.disconnect();

	assert!(matches!(ready.await, Err(Error::ConnectionClosed)));
	assert_eq!(connection.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn commands_are_sent_in_order() {
	let host = MemoryFrameHost::new().with_auto_ready();
	let connection = cookie_context(&host).dashboard_with_id(1).connect().await.unwrap();

	connection.run().unwrap();
	connection.update_filters([("State", "California")]).unwrap();
	connection.load("thelook::orders").unwrap();
	connection.stop().unwrap();

	let frame = host.last_frame().unwrap();
	assert_eq!(
		frame.sent_types(),
		vec![
			"embed:connect",
			"dashboard:run",
			"dashboard:filters:update",
			"dashboard:load",
			"dashboard:stop",
		]
	);
	assert_eq!(frame.sent()[2]["filters"], json!({"State": "California"}));
}

#[tokio::test]
async fn unsupported_commands_are_rejected() {
	let host = MemoryFrameHost::new().with_auto_ready();
	let look = cookie_context(&host).look_with_id(3).connect().await.unwrap();

	let err = look.stop().unwrap_err();
	assert!(matches!(
		err,
		Error::UnsupportedCommand {
			command: "stop",
			content: ContentKind::Look
		}
	));
	assert_eq!(host.last_frame().unwrap().sent_types(), vec!["embed:connect"]);
}

#[tokio::test]
async fn commands_wait_for_the_handshake() {
	let host = MemoryFrameHost::new();
	let context = cookie_context(&host);
	let config = context.dashboard_with_id(1).build().unwrap();
	let connection = EmbedConnection::open(&context, config, Vec::new()).await.unwrap();

	assert!(matches!(connection.run(), Err(Error::NotReady)));
}

#[tokio::test]
async fn navigation_can_be_cancelled() {
	let host = MemoryFrameHost::new().with_auto_ready();
	let first = Arc::new(AtomicUsize::new(0));
	let second = Arc::new(AtomicUsize::new(0));
	let connection = cookie_context(&host)
		.dashboard_with_id(1)
		.connect()
		.await
		.unwrap();
	let _proceed = connection.on(names::DRILLMENU_CLICK, {
		let handler = counting_handler(&first, EventReply::proceed());
		move |event| handler(event)
	});
	let _cancel = connection.on(names::DRILLMENU_CLICK, {
		let handler = counting_handler(&second, EventReply::cancel());
		move |event| handler(event)
	});
	let mut events = connection.events();

	let frame = host.last_frame().unwrap();
	frame.request(5, EmbedEvent::new(names::DRILLMENU_CLICK).with_param("url", "/explore/x"));
	let event = next_embed_event(&mut events, names::DRILLMENU_CLICK).await;

	assert_eq!(event.param("url"), Some(&json!("/explore/x")));
	assert_eq!(frame.reply_to(5), Some(json!({"cancel": true})));
	assert_eq!(first.load(Ordering::SeqCst), 1);
	assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unhandled_requests_proceed() {
	let host = MemoryFrameHost::new().with_auto_ready();
	let connection = cookie_context(&host).dashboard_with_id(1).connect().await.unwrap();
	let mut events = connection.events();

	let frame = host.last_frame().unwrap();
	frame.request(9, EmbedEvent::new(names::DASHBOARD_TILE_VIEW));
	next_embed_event(&mut events, names::DASHBOARD_TILE_VIEW).await;

	assert_eq!(frame.reply_to(9), Some(json!({})));
}

#[tokio::test]
async fn dropped_subscription_unregisters_handler() {
	let host = MemoryFrameHost::new().with_auto_ready();
	let calls = Arc::new(AtomicUsize::new(0));
	let connection = cookie_context(&host).dashboard_with_id(1).connect().await.unwrap();
	let subscription = connection.on("dashboard:loaded", {
		let handler = counting_handler(&calls, EventReply::proceed());
		move |event| handler(event)
	});
	let mut events = connection.events();
	let frame = host.last_frame().unwrap();

	frame.emit(EmbedEvent::new("dashboard:loaded"));
	next_embed_event(&mut events, "dashboard:loaded").await;
	drop(subscription);
	frame.emit(EmbedEvent::new("dashboard:loaded"));
	next_embed_event(&mut events, "dashboard:loaded").await;

	assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn page_height_resizes_frame_by_default() {
	let host = MemoryFrameHost::new().with_auto_ready();
	let connection = cookie_context(&host).dashboard_with_id(1).connect().await.unwrap();
	let mut events = connection.events();

	let frame = host.last_frame().unwrap();
	frame.emit(EmbedEvent::new(names::PAGE_PROPERTIES_CHANGED).with_param("height", 640));
	next_embed_event(&mut events, names::PAGE_PROPERTIES_CHANGED).await;

	assert_eq!(frame.height(), Some(640));
}

#[tokio::test]
async fn page_height_handler_replaces_resizing() {
	let host = MemoryFrameHost::new().with_auto_ready();
	let calls = Arc::new(AtomicUsize::new(0));
	let connection = cookie_context(&host)
		.dashboard_with_id(1)
		.on(names::PAGE_PROPERTIES_CHANGED, {
			let handler = counting_handler(&calls, EventReply::proceed());
			move |event| handler(event)
		})
		.connect()
		.await
		.unwrap();
	let mut events = connection.events();

	let frame = host.last_frame().unwrap();
	frame.emit(EmbedEvent::new(names::PAGE_PROPERTIES_CHANGED).with_param("height", 640));
	next_embed_event(&mut events, names::PAGE_PROPERTIES_CHANGED).await;

	assert_eq!(frame.height(), None);
	assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn page_height_is_ignored_without_dynamic_height() {
	let host = MemoryFrameHost::new().with_auto_ready();
	let connection = cookie_context(&host)
		.dashboard_with_id(1)
		.with_dynamic_height(false)
		.connect()
		.await
		.unwrap();
	let mut events = connection.events();

	let frame = host.last_frame().unwrap();
	frame.emit(EmbedEvent::new(names::PAGE_PROPERTIES_CHANGED).with_param("height", 640));
	next_embed_event(&mut events, names::PAGE_PROPERTIES_CHANGED).await;

	assert_eq!(frame.height(), None);
}

#[tokio::test]
async fn token_requests_are_answered() {
	let host = MemoryFrameHost::new().with_auto_ready();
	let gateway = Arc::new(ScriptedGateway::new());
	let (context, _session) = cookieless_context(&host, &gateway);
	let connection = context.dashboard_with_id(1).connect().await.unwrap();
	let mut events = connection.events();

	let frame = host.last_frame().unwrap();
	frame.emit(EmbedEvent::new(names::SESSION_TOKENS_REQUEST));
	next_matching(&mut events, |e| matches!(e, ConnectionEvent::TokensRefreshed { .. })).await;

	let sent = frame.sent();
	let tokens = sent.last().unwrap();
	assert_eq!(tokens["type"], names::SESSION_TOKENS);
	assert_eq!(tokens["api_token"], "A1");
	assert_eq!(gateway.acquire_calls(), 1);
}

#[tokio::test]
async fn removed_frame_closes_connection() {
	let host = MemoryFrameHost::new().with_auto_ready();
	let connection = cookie_context(&host).dashboard_with_id(1).connect().await.unwrap();
	let mut events = connection.events();

	host.last_frame().unwrap().detach();
	next_matching(&mut events, |e| *e == ConnectionEvent::Closed).await;

	assert_eq!(connection.state(), ConnectionState::Closed);
	assert!(matches!(connection.run(), Err(Error::ConnectionClosed)));
}

#[tokio::test]
async fn commands_wait_for_reacquired_session() {
	let host = MemoryFrameHost::new().with_auto_ready();
	let gateway = Arc::new(ScriptedGateway::new());
	let (context, session) = cookieless_context(&host, &gateway);
	let connection = context.dashboard_with_id(1).connect().await.unwrap();
	let mut events = connection.events();

	gateway.push_refresh(Err(GatewayError::InvalidTokens));
	assert!(matches!(session.refresh().await, Err(Error::InvalidSession)));
	next_matching(&mut events, |e| *e == ConnectionEvent::SessionExpired).await;

	assert!(matches!(connection.run(), Err(Error::InvalidSession)));
	next_matching(&mut events, |e| matches!(e, ConnectionEvent::TokensRefreshed { .. })).await;
	connection.run().unwrap();

	assert_eq!(gateway.acquire_requests()[1].session_reference_token, None);
	assert_eq!(connection.api_token().as_deref(), Some("A2"));
	let frame = host.last_frame().unwrap();
	assert_eq!(
		frame.sent_types(),
		vec!["embed:connect", "session:tokens", "dashboard:run"]
	);
}

#[tokio::test]
async fn dropping_the_last_handle_removes_the_frame() {
	let host = MemoryFrameHost::new().with_auto_ready();
	let connection = cookie_context(&host).dashboard_with_id(1).connect().await.unwrap();
	assert_eq!(host.mounted_count(), 1);

	drop(connection);

	assert_eq!(host.mounted_count(), 0);
}
