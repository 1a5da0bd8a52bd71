//! Bridge dispatch tests
//!
//! Exercises the host-facing side of the sandbox: raw JSON messages in,
//! events out. The Router runs against the mock transport so every dispatch
//! outcome can be checked against what actually reached the adapter.

use std::sync::Arc;
use stream_router::bridge::{dispatch_message, Event, EventSink};
use stream_router::config::RouterConfig;
use stream_router::observability::logging::TracingLoggerFactory;
use stream_router::router::{Router, RouterState};
use stream_router::testing::init_test_logging;
use stream_router::testing::mocks::MockTransport;
use stream_router::transport::TransportNotification;
use serde_json::json;
use tokio::sync::mpsc;

fn test_config() -> RouterConfig {
    RouterConfig {
        log_id: "bridge-test".to_string(),
        client_id: "client-test".to_string(),
        host: "broker.example.com".to_string(),
        port: 1883,
        use_ssl: false,
        connection_timeout_ms: 10_000,
        keep_alive_interval_secs: 60,
        publish_timeout_ms: 5_000,
        reconnect_delay_ms: 50,
        logger: Arc::new(TracingLoggerFactory),
    }
}

fn make_router() -> (
    Router<MockTransport>,
    MockTransport,
    mpsc::UnboundedReceiver<Event>,
) {
    init_test_logging();
    let mock = MockTransport::new();
    let (sink, event_rx) = EventSink::channel();
    let router = Router::with_transport(test_config(), mock.clone(), sink).unwrap();
    (router, mock, event_rx)
}

fn drain_events(rx: &mut mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

async fn make_connected() -> (
    Router<MockTransport>,
    MockTransport,
    mpsc::UnboundedReceiver<Event>,
) {
    let (mut router, mock, mut event_rx) = make_router();
    router.connect().await.unwrap();
    router
        .handle_transport(TransportNotification::Connected)
        .await;
    drain_events(&mut event_rx);
    (router, mock, event_rx)
}

#[tokio::test]
async fn test_connect_command_reaches_transport() {
    let (mut router, mock, _event_rx) = make_router();

    dispatch_message(&mut router, json!({"command": "CONNECT"})).await;
    assert_eq!(router.state(), RouterState::Connecting);
    assert_eq!(mock.connect_count().await, 1);
}

#[tokio::test]
async fn test_publish_command_reaches_transport() {
    let (mut router, mock, mut event_rx) = make_connected().await;

    dispatch_message(
        &mut router,
        json!({"command": "PUBLISH", "args": ["video/a", "frame-data"]}),
    )
    .await;
    let published = mock.published.lock().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0.topic, "video/a");
    assert_eq!(published[0].1, b"frame-data".to_vec());
    // Success is announced only on acknowledgment, not at issue
    assert!(drain_events(&mut event_rx).is_empty());
}

#[tokio::test]
async fn test_send_command_is_a_publish() {
    let (mut router, mock, _event_rx) = make_connected().await;

    dispatch_message(
        &mut router,
        json!({"command": "SEND", "args": ["video/a", "frame-data"]}),
    )
    .await;
    assert_eq!(mock.published_topics().await, vec!["video/a".to_string()]);
}

#[tokio::test]
async fn test_subscribe_and_unsubscribe_commands() {
    let (mut router, mock, _event_rx) = make_connected().await;

    dispatch_message(
        &mut router,
        json!({"command": "SUBSCRIBE", "args": ["video/a"]}),
    )
    .await;
    dispatch_message(
        &mut router,
        json!({"command": "UNSUBSCRIBE", "args": ["video/a"]}),
    )
    .await;
    assert_eq!(*mock.subscribed.lock().await, vec!["video/a".to_string()]);
    assert_eq!(*mock.unsubscribed.lock().await, vec!["video/a".to_string()]);
}

#[tokio::test]
async fn test_unknown_command_emits_single_window_message_fail() {
    let (mut router, mock, mut event_rx) = make_router();

    dispatch_message(&mut router, json!({"command": "REWIND"})).await;

    let events = drain_events(&mut event_rx);
    assert_eq!(events.len(), 1);
    match &events[0] {
        Event::WindowMessageFail { command, reason } => {
            assert_eq!(command, "REWIND");
            assert!(reason.contains("REWIND"));
        }
        other => panic!("expected WindowMessageFail, got {other:?}"),
    }

    // No Router method ran; the state machine and transport are untouched
    assert_eq!(router.state(), RouterState::Idle);
    assert_eq!(mock.connect_count().await, 0);
    assert!(mock.published.lock().await.is_empty());
}

#[tokio::test]
async fn test_malformed_message_emits_window_message_fail() {
    let (mut router, _mock, mut event_rx) = make_router();

    // `command` must be a string
    dispatch_message(&mut router, json!({"command": 42})).await;
    // No `command` member at all
    dispatch_message(&mut router, json!({"topic": "video/a"})).await;
    // Not even an object
    dispatch_message(&mut router, json!("CONNECT")).await;

    let events = drain_events(&mut event_rx);
    assert_eq!(events.len(), 3);
    for event in events {
        match event {
            Event::WindowMessageFail { command, .. } => assert_eq!(command, "<malformed>"),
            other => panic!("expected WindowMessageFail, got {other:?}"),
        }
    }
    assert_eq!(router.state(), RouterState::Idle);
}

#[tokio::test]
async fn test_bad_argument_types_emit_window_message_fail() {
    let (mut router, mock, mut event_rx) = make_connected().await;

    dispatch_message(
        &mut router,
        json!({"command": "PUBLISH", "args": ["video/a", 7]}),
    )
    .await;
    dispatch_message(&mut router, json!({"command": "SUBSCRIBE"})).await;

    let events = drain_events(&mut event_rx);
    assert_eq!(events.len(), 2);
    match &events[0] {
        Event::WindowMessageFail { command, reason } => {
            assert_eq!(command, "PUBLISH");
            assert!(reason.contains("message"));
        }
        other => panic!("expected WindowMessageFail, got {other:?}"),
    }
    match &events[1] {
        Event::WindowMessageFail { command, reason } => {
            assert_eq!(command, "SUBSCRIBE");
            assert!(reason.contains("topic"));
        }
        other => panic!("expected WindowMessageFail, got {other:?}"),
    }

    assert!(mock.published.lock().await.is_empty());
    assert!(mock.subscribed.lock().await.is_empty());
}

#[tokio::test]
async fn test_rejected_operation_emits_its_own_failure_not_window_fail() {
    let (mut router, mock, mut event_rx) = make_router();

    // Well-formed command, invalid state: this is an operation failure, not
    // a message failure
    dispatch_message(
        &mut router,
        json!({"command": "PUBLISH", "args": ["video/a", "frame"]}),
    )
    .await;

    let events = drain_events(&mut event_rx);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], Event::PublishFailure { .. }));
    assert!(mock.published.lock().await.is_empty());
}

#[tokio::test]
async fn test_dispatch_never_panics_on_junk() {
    let (mut router, _mock, mut event_rx) = make_router();

    for raw in [
        json!(null),
        json!([]),
        json!({"command": "", "args": {}}),
        json!({"command": "PUBLISH", "args": [null, null]}),
    ] {
        dispatch_message(&mut router, raw).await;
    }
    // One failure event per junk message, nothing more
    assert_eq!(drain_events(&mut event_rx).len(), 4);
}
