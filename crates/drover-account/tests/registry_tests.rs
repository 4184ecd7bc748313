// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registry reconciliation and cross-account routing.

use std::sync::Arc;
use std::time::Duration;

use drover_account::{InstanceDeps, InstanceRegistry, Placement};
use drover_core::{Connectivity, DroverError, Job, JobAction, JobId, SubmitResult, submit_fn};
use drover_test_utils::{
    ConnectScript, MockConnector, RecordingDisabler, RecordingDispatchSink, RecordingJobSink,
    ScriptStep, fixtures,
};

fn connected_script(session: &str) -> ConnectScript {
    ConnectScript::accept(vec![
        ScriptStep::hello(41_250),
        ScriptStep::ready(1, session, "wss://resume.test"),
    ])
}

fn registry(connector: &MockConnector) -> InstanceRegistry {
    InstanceRegistry::new(InstanceDeps::new(
        Arc::new(connector.clone()),
        Arc::new(RecordingDispatchSink::default()),
        Arc::new(RecordingDisabler::default()),
        Arc::new(RecordingJobSink::default()),
    ))
}

async fn all_connected(registry: &InstanceRegistry) {
    for instance in registry.instances() {
        assert!(
            instance
                .session()
                .wait_connected(Duration::from_secs(5))
                .await,
            "{} did not connect",
            instance.account_id()
        );
    }
}

fn submit(
    registry: &InstanceRegistry,
    id: &str,
    account: Option<&str>,
    channel: Option<&str>,
) -> Result<(Arc<Job>, Placement), DroverError> {
    let job = Arc::new(Job::new(id, JobAction::Imagine));
    let placement = registry.submit(
        Arc::clone(&job),
        submit_fn(|| async { SubmitResult::success() }),
        account,
        channel,
    )?;
    Ok((job, placement))
}

#[tokio::test(start_paused = true)]
async fn refresh_starts_only_enabled_accounts() {
    let connector = MockConnector::new(vec![connected_script("sess-a")]);
    let registry = registry(&connector);
    let mut disabled = fixtures::account("acct-b", &["b1"]);
    disabled.enabled = false;
    let config = fixtures::config(vec![fixtures::account("acct-a", &["a1"]), disabled]);

    let summary = registry.refresh(&config).await;
    assert_eq!(summary.added, vec!["acct-a"]);
    assert!(registry.get("acct-b").is_none());
    all_connected(&registry).await;

    let health = registry.health();
    assert_eq!(health.len(), 1);
    assert_eq!(health[0].0, "acct-a");
    assert_eq!(health[0].1, drover_core::HealthStatus::Healthy);

    assert!(registry.refresh(&config).await.restarted.is_empty());
    registry.shutdown("service shutting down").await;
    assert!(registry.is_empty());
    assert_eq!(connector.close_codes(), vec![1000]);
}

#[tokio::test(start_paused = true)]
async fn routes_by_account_channel_and_weight() {
    let connector = MockConnector::new(vec![connected_script("sess-a"), connected_script("sess-b")]);
    let registry = registry(&connector);
    let mut reserved = fixtures::account("acct-a", &["a1"]);
    reserved.weight = 0;
    let config = fixtures::config(vec![reserved, fixtures::account("acct-b", &["b1"])]);
    registry.refresh(&config).await;
    all_connected(&registry).await;

    let (_, placed) = submit(&registry, "explicit", Some("acct-a"), None).unwrap();
    assert_eq!(placed.account_id, "acct-a");
    assert_eq!(placed.channel_id, "a1");

    let (_, placed) = submit(&registry, "sticky", None, Some("a1")).unwrap();
    assert_eq!(placed.account_id, "acct-a");

    for n in 0..3 {
        let (_, placed) = submit(&registry, &format!("weighted-{n}"), None, None).unwrap();
        assert_eq!(placed.account_id, "acct-b", "zero weight is never picked");
    }

    let err = submit(&registry, "lost", Some("acct-z"), None).unwrap_err();
    assert!(matches!(err, DroverError::AccountUnavailable { .. }));

    let (account, channel, _) = registry.find_job(&JobId::from("sticky")).unwrap();
    assert_eq!((account.as_str(), channel.as_str()), ("acct-a", "a1"));
    assert!(registry.cancel_job(&JobId::from("sticky"), "cancelled by client"));
    assert!(registry.find_job(&JobId::from("sticky")).is_none());

    registry.shutdown("service shutting down").await;
}

#[tokio::test(start_paused = true)]
async fn refresh_removes_updates_and_restarts() {
    let connector = MockConnector::new(vec![connected_script("sess-a"), connected_script("sess-b")]);
    let registry = registry(&connector);
    let config = fixtures::config(vec![
        fixtures::account("acct-a", &["a1"]),
        fixtures::account("acct-b", &["b1"]),
    ]);
    registry.refresh(&config).await;
    all_connected(&registry).await;

    let (orphan, _) = submit(&registry, "orphan", Some("acct-b"), None).unwrap();

    let mut resized = fixtures::account("acct-a", &["a1"]);
    resized.queue_size = 4;
    let summary = registry.refresh(&fixtures::config(vec![resized])).await;
    assert_eq!(summary.removed, vec!["acct-b"]);
    assert_eq!(summary.updated, vec!["acct-a"]);
    assert_eq!(orphan.snapshot().failure_reason(), Some("channel removed"));
    let a1 = registry.get("acct-a").unwrap().pool().channel("a1").unwrap();
    assert_eq!(a1.queue_capacity(), 4);

    connector.push(connected_script("sess-a2"));
    let mut rotated = fixtures::account("acct-a", &["a1"]);
    rotated.token = "rotated-token".to_string();
    let summary = registry.refresh(&fixtures::config(vec![rotated])).await;
    assert_eq!(summary.restarted, vec!["acct-a"]);
    all_connected(&registry).await;

    let identify = connector
        .sent_json(2)
        .into_iter()
        .find(|v| v["op"] == 2)
        .unwrap();
    assert_eq!(identify["d"]["token"], "rotated-token");

    registry.shutdown("service shutting down").await;
}
