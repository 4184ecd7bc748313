// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `drover serve` command implementation.
//!
//! Starts one instance per enabled account, re-reads the configuration on
//! an interval and shuts everything down on SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use drover_account::{InstanceDeps, InstanceRegistry, LogOnlyDisabler};
use drover_config::DroverConfig;
use drover_core::{
    BroadcastJobSink, DispatchEvent, DispatchFlow, DispatchSink, DroverError, JobChangeEvent,
};
use drover_gateway::{DispatchRouter, WsConnector};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::shutdown;

/// Failure reason for jobs still queued when the service stops.
const SHUTDOWN_REASON: &str = "service shutting down";

/// Run until a shutdown signal arrives.
pub async fn run_serve(
    config: DroverConfig,
    config_path: Option<PathBuf>,
) -> Result<(), DroverError> {
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        accounts = config.accounts.len(),
        "starting drover serve"
    );

    let cancel = shutdown::install_signal_handler();

    let jobs = Arc::new(BroadcastJobSink::default());
    tokio::spawn(log_job_changes(jobs.subscribe(), cancel.clone()));

    let router = Arc::new(DispatchRouter::new());
    router.register("dispatch-log", i32::MIN, Arc::new(DispatchLog));

    let deps = InstanceDeps::new(
        Arc::new(WsConnector::default()),
        router,
        Arc::new(LogOnlyDisabler),
        jobs,
    );
    let registry = Arc::new(InstanceRegistry::new(deps));

    let summary = registry.refresh(&config).await;
    if summary.added.is_empty() {
        warn!("no enabled accounts configured");
    }

    let poller = match config.service.config_refresh_secs {
        0 => None,
        secs => Some(tokio::spawn(poll_config(
            Arc::clone(&registry),
            config_path,
            Duration::from_secs(secs),
            cancel.clone(),
        ))),
    };

    cancel.cancelled().await;
    info!("shutdown requested, stopping account instances");
    if let Some(poller) = poller {
        let _ = poller.await;
    }

    let grace = Duration::from_secs(config.service.shutdown_timeout_secs);
    if tokio::time::timeout(grace, registry.shutdown(SHUTDOWN_REASON))
        .await
        .is_err()
    {
        warn!(timeout_secs = grace.as_secs(), "account instances did not stop in time");
    }

    info!("drover serve shutdown complete");
    Ok(())
}

/// Re-read the configuration every `every` and reconcile the registry.
async fn poll_config(
    registry: Arc<InstanceRegistry>,
    path: Option<PathBuf>,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(every);
    // Skip the first immediate tick.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Some(config) = reload(path.as_deref()) {
                    let summary = registry.refresh(&config).await;
                    debug!(
                        added = summary.added.len(),
                        removed = summary.removed.len(),
                        restarted = summary.restarted.len(),
                        "configuration refreshed"
                    );
                }
            }
            _ = cancel.cancelled() => {
                debug!("config poller shutting down");
                break;
            }
        }
    }
}

/// Load and validate; invalid configuration keeps the current one.
fn reload(path: Option<&std::path::Path>) -> Option<DroverConfig> {
    match crate::load_config(path) {
        Ok(config) => Some(config),
        Err(errors) => {
            warn!(
                errors = errors.len(),
                report = %drover_config::render_to_string(&errors),
                "config reload failed, keeping current configuration"
            );
            None
        }
    }
}

async fn log_job_changes(mut rx: broadcast::Receiver<JobChangeEvent>, cancel: CancellationToken) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = rx.recv() => event,
        };
        match event {
            Ok(event) if event.job.status.is_terminal() => info!(
                account = %event.account_id,
                channel = %event.channel_id,
                job = %event.job.id,
                status = %event.job.status,
                reason = event.job.failure_reason().unwrap_or(""),
                "job finished"
            ),
            Ok(event) => debug!(
                account = %event.account_id,
                channel = %event.channel_id,
                job = %event.job.id,
                status = %event.job.status,
                "job changed"
            ),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "job change logger lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Lowest-priority sink: every dispatch shows up at trace level.
struct DispatchLog;

impl DispatchSink for DispatchLog {
    fn handle(&self, event: &DispatchEvent) -> DispatchFlow {
        trace!(
            account = %event.account_id,
            event = %event.event_type,
            seq = ?event.sequence,
            channel = event.channel_id().unwrap_or("-"),
            "dispatch"
        );
        DispatchFlow::Continue
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("drover={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use drover_core::{Job, JobAction};
    use serde_json::json;

    use super::*;

    #[test]
    fn dispatch_log_never_stops_routing() {
        let event = DispatchEvent {
            account_id: "acct".into(),
            sequence: Some(4),
            event_type: "MESSAGE_CREATE".into(),
            data: json!({"channel_id": "c1"}),
        };
        assert_eq!(DispatchLog.handle(&event), DispatchFlow::Continue);
    }

    #[test]
    fn reload_keeps_current_config_on_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drover.toml");
        std::fs::write(&path, "[service]\nlog_levle = \"debug\"\n").unwrap();
        assert!(reload(Some(&path)).is_none());

        std::fs::write(&path, "[service]\nlog_level = \"debug\"\n").unwrap();
        let config = reload(Some(&path)).unwrap();
        assert_eq!(config.service.log_level, "debug");
    }

    #[tokio::test]
    async fn job_logger_stops_on_cancel() {
        let sink = BroadcastJobSink::new(4);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(log_job_changes(sink.subscribe(), cancel.clone()));

        let job = Job::new("job-1", JobAction::Imagine);
        job.fail("cancelled");
        drover_core::JobChangeSink::publish(
            &sink,
            JobChangeEvent {
                account_id: "acct".into(),
                channel_id: "c1".into(),
                job: job.snapshot(),
            },
        );

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
