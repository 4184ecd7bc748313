// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway session behaviour against scripted connections.

use std::sync::Arc;
use std::time::Duration;

use drover_core::{ConnectionState, Connectivity, DispatchSink};
use drover_gateway::{
    ConnectGuards, DispatchRouter, GatewaySession, SessionHandle, SessionSettings,
};
use drover_test_utils::{
    ConnectScript, MockConnector, RecordingDisabler, RecordingDispatchSink, ScriptStep, fixtures,
};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::timeout;

struct Harness {
    handle: SessionHandle,
    task: JoinHandle<()>,
    disabler: Arc<RecordingDisabler>,
}

fn start(connector: &MockConnector, sink: Arc<dyn DispatchSink>) -> Harness {
    let account = fixtures::account("acct-1", &["c1"]);
    let settings = SessionSettings::new(&account, &fixtures::gateway());
    let disabler = Arc::new(RecordingDisabler::default());
    let session = GatewaySession::new(
        settings,
        Arc::new(connector.clone()),
        sink,
        disabler.clone(),
        ConnectGuards::default(),
    );
    let (handle, task) = session.spawn();
    Harness {
        handle,
        task,
        disabler,
    }
}

async fn reaches(handle: &SessionHandle, state: ConnectionState, limit: Duration) -> bool {
    let mut rx = handle.subscribe();
    timeout(limit, async move { rx.wait_for(|s| *s == state).await.is_ok() })
        .await
        .unwrap_or(false)
}

#[tokio::test(start_paused = true)]
async fn unacked_heartbeat_resumes_with_captured_session() {
    let connector = MockConnector::new(vec![
        ConnectScript::silent(vec![
            ScriptStep::hello(41_250),
            ScriptStep::ready(1, "sess-1", "wss://resume.test"),
            ScriptStep::dispatch(2, "MESSAGE_CREATE", json!({"channel_id": "c1", "id": "m1"})),
        ]),
        ConnectScript::accept(vec![ScriptStep::hello(41_250), ScriptStep::resumed(3)]),
    ]);
    let dispatches = Arc::new(RecordingDispatchSink::default());
    let harness = start(&connector, dispatches.clone());

    assert!(harness.handle.wait_connected(Duration::from_secs(5)).await);
    assert!(
        reaches(
            &harness.handle,
            ConnectionState::Reconnecting,
            Duration::from_millis(2 * 41_250 + 1_000)
        )
        .await
    );
    assert!(harness.handle.wait_connected(Duration::from_secs(10)).await);

    let urls = connector.urls();
    assert_eq!(urls.len(), 2);
    assert_eq!(urls[0], "wss://gateway.test?v=9&encoding=json");
    assert_eq!(urls[1], "wss://resume.test?v=9&encoding=json");

    assert_eq!(connector.sent_ops(0)[0], 2, "first connection identifies");
    let resume = &connector.sent_json(1)[0];
    assert_eq!(resume["op"], 6);
    assert_eq!(resume["d"]["session_id"], "sess-1");
    assert_eq!(resume["d"]["seq"], 2);
    assert_eq!(resume["d"]["token"], "token-acct-1");

    assert!(connector.close_codes().contains(&4000));
    assert_eq!(
        dispatches.event_types(),
        vec!["READY", "MESSAGE_CREATE", "RESUMED"]
    );
    assert!(harness.disabler.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn session_fatal_close_never_resumes_and_disables_after_retry_limit() {
    let connector = MockConnector::new(vec![ConnectScript::accept(vec![
        ScriptStep::hello(41_250),
        ScriptStep::close(4004),
    ])]);
    let harness = start(&connector, Arc::new(RecordingDispatchSink::default()));

    timeout(Duration::from_secs(600), harness.task)
        .await
        .expect("session should stop on its own")
        .unwrap();

    let calls = harness.disabler.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "acct-1");
    assert!(
        calls[0].1.contains("failed to reconnect"),
        "unexpected reason: {}",
        calls[0].1
    );
    assert_eq!(harness.handle.state(), ConnectionState::Error);

    assert_eq!(connector.connect_attempts(), 5);
    assert!(!connector.sent_ops(0).contains(&6));
    assert!(
        connector
            .urls()
            .iter()
            .all(|u| u.starts_with("wss://gateway.test"))
    );
}

#[tokio::test(start_paused = true)]
async fn invalid_session_identifies_from_scratch() {
    let connector = MockConnector::new(vec![
        ConnectScript::accept(vec![
            ScriptStep::hello(41_250),
            ScriptStep::ready(1, "sess-1", "wss://resume.test"),
            ScriptStep::Delay(Duration::from_secs(1)),
            ScriptStep::Json(json!({"op": 9, "d": true})),
        ]),
        ConnectScript::accept(vec![
            ScriptStep::hello(41_250),
            ScriptStep::ready(1, "sess-2", "wss://resume.test"),
        ]),
    ]);
    let harness = start(&connector, Arc::new(RecordingDispatchSink::default()));

    assert!(harness.handle.wait_connected(Duration::from_secs(5)).await);
    assert!(reaches(&harness.handle, ConnectionState::Reconnecting, Duration::from_secs(5)).await);
    assert!(harness.handle.wait_connected(Duration::from_secs(120)).await);

    assert_eq!(connector.sent_ops(1)[0], 2);
    assert!(!connector.sent_ops(1).contains(&6));
    assert!(connector.urls()[1].starts_with("wss://gateway.test"));
    assert!(harness.disabler.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn reconnect_requests_are_dropped_while_connecting() {
    let connector = MockConnector::new(vec![
        ConnectScript::accept(vec![
            ScriptStep::Delay(Duration::from_secs(10)),
            ScriptStep::hello(41_250),
            ScriptStep::ready(1, "sess-1", "wss://resume.test"),
        ]),
        ConnectScript::accept(vec![ScriptStep::hello(41_250), ScriptStep::resumed(2)]),
    ]);
    let harness = start(&connector, Arc::new(RecordingDispatchSink::default()));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(harness.handle.state(), ConnectionState::Connecting);
    assert!(!harness.handle.request_reconnect());

    assert!(harness.handle.wait_connected(Duration::from_secs(30)).await);
    assert_eq!(connector.connect_attempts(), 1);

    assert!(harness.handle.request_reconnect());
    assert!(reaches(&harness.handle, ConnectionState::Reconnecting, Duration::from_secs(5)).await);
    assert!(harness.handle.wait_connected(Duration::from_secs(10)).await);

    assert_eq!(connector.sent_json(1)[0]["op"], 6);
    assert_eq!(connector.sent_json(1)[0]["d"]["session_id"], "sess-1");
}

#[tokio::test(start_paused = true)]
async fn reconnect_requests_during_the_reconnect_pause_are_not_replayed() {
    let connector = MockConnector::new(vec![
        ConnectScript::accept(vec![
            ScriptStep::hello(41_250),
            ScriptStep::ready(1, "sess-1", "wss://resume.test"),
            ScriptStep::Delay(Duration::from_secs(1)),
            ScriptStep::Json(json!({"op": 7})),
        ]),
        ConnectScript::accept(vec![ScriptStep::hello(41_250), ScriptStep::resumed(2)]),
    ]);
    let harness = start(&connector, Arc::new(RecordingDispatchSink::default()));

    assert!(harness.handle.wait_connected(Duration::from_secs(5)).await);
    assert!(reaches(&harness.handle, ConnectionState::Reconnecting, Duration::from_secs(5)).await);
    assert!(!harness.handle.request_reconnect());

    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(connector.connect_attempts(), 2);
    assert_eq!(harness.handle.state(), ConnectionState::Connected);
    assert_eq!(connector.sent_json(1)[0]["op"], 6);
    assert_eq!(connector.close_codes(), vec![4000]);
    assert!(harness.disabler.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_normally_and_routes_only_matching_dispatches() {
    let connector = MockConnector::new(vec![ConnectScript::accept(vec![
        ScriptStep::hello(41_250),
        ScriptStep::ready(1, "sess-1", "wss://resume.test"),
        ScriptStep::dispatch(2, "TYPING_START", json!({"channel_id": "c1"})),
        ScriptStep::dispatch(3, "MESSAGE_CREATE", json!({"channel_id": "c1", "id": "m1"})),
    ])]);
    let recorder = Arc::new(RecordingDispatchSink::default());
    let router = Arc::new(DispatchRouter::new());
    router.register_for("messages", 0, &["MESSAGE_CREATE"], recorder.clone());
    let harness = start(&connector, router);

    assert!(harness.handle.wait_connected(Duration::from_secs(5)).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    harness.handle.shutdown();
    timeout(Duration::from_secs(5), harness.task)
        .await
        .expect("session should stop")
        .unwrap();

    assert_eq!(connector.close_codes(), vec![1000]);
    assert_eq!(harness.handle.state(), ConnectionState::Disconnected);
    assert!(!harness.handle.request_reconnect());

    let events = recorder.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "MESSAGE_CREATE");
    assert_eq!(events[0].account_id, "acct-1");
    assert_eq!(events[0].sequence, Some(3));
    assert_eq!(events[0].channel_id(), Some("c1"));
}
