//! Integration tests for terminal streaming
//!
//! The first half drives the transport with the in-memory connector; the
//! second half goes over a real WebSocket against the test daemon.

use std::sync::Arc;
use std::time::Duration;

use super::common::daemon_server::TestDaemon;
use schmux::config::ReconnectPolicy;
use schmux::daemon::mock::MockDaemon;
use schmux::daemon::{DaemonApi, HttpDaemon};
use schmux::error::TransportError;
use schmux::model::SpawnRequest;
use schmux::terminal::mock::{MockConnector, RecordingView, ViewEvent};
use schmux::terminal::{
    ClientFrame, TerminalConnector, TerminalOptions, TerminalStatus, TerminalTransport,
    WsConnector,
};

fn options(seed_lines: usize) -> TerminalOptions {
    TerminalOptions {
        cols: 100,
        rows: 30,
        seed_lines,
        history: 500,
        reconnect: ReconnectPolicy {
            initial: Duration::from_millis(50),
            max: Duration::from_millis(400),
            max_attempts: 0,
        },
    }
}

async fn spawned_session(daemon: &MockDaemon) -> String {
    let results = daemon
        .spawn(&SpawnRequest::fresh("r", "main").with_target("claude", 1))
        .await
        .expect("spawn should succeed");
    results[0].session_id.clone().expect("session id")
}

/// Seed scrollback is always rendered before any live byte
#[tokio::test(start_paused = true)]
async fn test_seed_precedes_live_output() {
    let seed: Vec<String> = (1..=5).map(|i| format!("line {i}")).collect();
    let daemon = Arc::new(MockDaemon::new().with_seed("s1", seed));
    let connector = Arc::new(MockConnector::new());
    let view = RecordingView::new();

    let transport = TerminalTransport::open(
        "s1",
        options(3),
        daemon.clone(),
        connector.clone(),
        Box::new(view.clone()),
    );
    assert!(connector.wait_for_connections(1, Duration::from_secs(1)).await);
    connector.send_output("live\n");
    tokio::time::sleep(Duration::from_millis(10)).await;

    let renders: Vec<String> = view
        .events()
        .into_iter()
        .filter_map(|e| match e {
            ViewEvent::Render(text) => Some(text),
            _ => None,
        })
        .collect();
    assert_eq!(renders, vec!["line 3\nline 4\nline 5\n", "live\n"]);

    // The first N lines are exactly the seed, live output starts a new line
    let lines = transport.lines();
    assert_eq!(lines[..3], ["line 3", "line 4", "line 5"]);
    assert_eq!(lines[3..], ["live"]);
}

/// Unlimited retries keep reconnecting and re-send the viewport each time
#[tokio::test(start_paused = true)]
async fn test_reconnect_resends_viewport_without_reseeding() {
    let daemon = Arc::new(MockDaemon::new().with_seed("s1", vec!["seed".into()]));
    let connector = Arc::new(MockConnector::new());
    let view = RecordingView::new();
    let transport = TerminalTransport::open(
        "s1",
        options(10),
        daemon.clone(),
        connector.clone(),
        Box::new(view.clone()),
    );
    assert!(connector.wait_for_connections(1, Duration::from_secs(1)).await);
    tokio::time::sleep(Duration::from_millis(10)).await;
    transport.resize(120, 40).expect("resize accepted");
    tokio::time::sleep(Duration::from_millis(10)).await;

    connector.refuse_connections(true);
    connector.drop_connection();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(transport.status(), TerminalStatus::Reconnecting);
    assert!(connector.connect_count() > 3);

    connector.refuse_connections(false);
    let status = transport
        .wait_for_status(Duration::from_secs(2), |s| s == TerminalStatus::Connected)
        .await;
    assert_eq!(status, Some(TerminalStatus::Connected));
    tokio::time::sleep(Duration::from_millis(10)).await;

    let resizes: Vec<ClientFrame> = connector
        .received()
        .into_iter()
        .filter(|f| matches!(f, ClientFrame::Resize { .. }))
        .collect();
    assert_eq!(
        resizes,
        vec![
            ClientFrame::Resize { cols: 100, rows: 30 },
            ClientFrame::Resize { cols: 120, rows: 40 },
            ClientFrame::Resize { cols: 120, rows: 40 },
        ]
    );
    assert_eq!(view.rendered(), "seed\n");
}

/// Dispose twice, then nothing reaches the view
#[tokio::test(start_paused = true)]
async fn test_dispose_is_idempotent() {
    let daemon = Arc::new(MockDaemon::new().with_seed("s1", Vec::new()));
    let connector = Arc::new(MockConnector::new());
    let view = RecordingView::new();
    let transport = TerminalTransport::open(
        "s1",
        options(10),
        daemon.clone(),
        connector.clone(),
        Box::new(view.clone()),
    );
    assert!(connector.wait_for_connections(1, Duration::from_secs(1)).await);

    transport.dispose();
    transport.dispose();
    let seen = view.events().len();
    connector.send_output("after dispose");
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(view.events().len(), seen);
    assert!(transport.is_disposed());
    assert!(!connector.is_connected());
    assert_eq!(transport.resize(1, 1), Err(TransportError::Disposed));
}

/// A disposed session goes straight to Error and never reports Connected
#[tokio::test(start_paused = true)]
async fn test_disposed_session_errors_without_connecting() {
    let daemon = Arc::new(MockDaemon::new());
    let session_id = spawned_session(&daemon).await;
    daemon
        .dispose_session(&session_id)
        .await
        .expect("dispose should succeed");

    let connector = Arc::new(MockConnector::new());
    let view = RecordingView::new();
    let transport = TerminalTransport::open(
        session_id.as_str(),
        options(10),
        daemon.clone(),
        connector.clone(),
        Box::new(view.clone()),
    );

    let status = transport
        .wait_for_status(Duration::from_secs(1), |s| s.is_final())
        .await;
    assert_eq!(status, Some(TerminalStatus::Error));
    assert_eq!(view.statuses(), vec![TerminalStatus::Connecting, TerminalStatus::Error]);
    assert_eq!(connector.connect_count(), 0);
}

/// A handshake-level not-found is final, with no retries
#[tokio::test(start_paused = true)]
async fn test_handshake_not_found_is_final() {
    let daemon = Arc::new(MockDaemon::new().with_seed("s1", Vec::new()));
    let connector = Arc::new(MockConnector::new());
    connector.mark_missing("s1");
    let transport = TerminalTransport::open(
        "s1",
        options(10),
        daemon.clone(),
        connector.clone(),
        Box::new(RecordingView::new()),
    );

    let status = transport
        .wait_for_status(Duration::from_secs(1), |s| s.is_final())
        .await;
    assert_eq!(status, Some(TerminalStatus::Error));
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(connector.connect_count(), 1);
}

/// Seed over HTTP, live output and input echo over a real WebSocket
#[tokio::test]
async fn test_websocket_stream_end_to_end() {
    let mock = MockDaemon::new();
    let session_id = spawned_session(&mock).await;
    let server = TestDaemon::start(mock).await;
    let http = HttpDaemon::new(server.url.clone()).expect("valid url");

    let view = RecordingView::new();
    let transport = TerminalTransport::open(
        session_id.as_str(),
        options(10),
        Arc::new(http.clone()),
        Arc::new(WsConnector::new(http)),
        Box::new(view.clone()),
    );

    let status = transport
        .wait_for_status(Duration::from_secs(5), |s| s == TerminalStatus::Connected)
        .await;
    assert_eq!(status, Some(TerminalStatus::Connected));

    transport.send_input(b"echo hi\r").expect("input accepted");
    let expected = format!("attached to {}\necho hi\r", session_id);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while view.rendered() != expected && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(view.rendered(), expected);

    let frames = server.terminal_frames();
    assert_eq!(frames[0], ClientFrame::Resize { cols: 100, rows: 30 });
    assert!(frames.contains(&ClientFrame::Input("echo hi\r".into())));

    transport.dispose();
}

/// The WebSocket connector maps a 404 handshake to a not-found session
#[tokio::test]
async fn test_websocket_unknown_session_is_not_found() {
    let server = TestDaemon::start(MockDaemon::new()).await;
    let connector = WsConnector::new(HttpDaemon::new(server.url.clone()).expect("valid url"));

    match connector.connect("nope").await {
        Err(err) => assert_eq!(err, TransportError::SessionNotFound("nope".into())),
        Ok(_) => panic!("Expected the handshake to be rejected"),
    }
}
