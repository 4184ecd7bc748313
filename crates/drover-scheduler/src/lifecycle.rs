// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Drives one dequeued job from submission to its terminal state.
//!
//! The lifecycle never propagates an error or a panic: anything that goes
//! wrong becomes a single Failure transition, and the running entry and its
//! slot are always released on the way out.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use drover_core::{Job, JobStatus};
use futures::FutureExt;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, info, warn};

use crate::channel::{Channel, PendingJob, RunningEntry};
use crate::context::PoolContext;
use crate::error::LifecycleError;

/// Run a job to completion. Spawned detached by the channel worker.
pub(crate) async fn run(
    channel: Arc<Channel>,
    ctx: Arc<PoolContext>,
    pending: PendingJob,
    entry: Arc<RunningEntry>,
) {
    let job = Arc::clone(&pending.job);
    let result = AssertUnwindSafe(drive(&channel, &ctx, pending, &entry))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(LifecycleError::Panicked(panic_message(panic))));

    match result {
        Ok(()) => {
            debug!(channel = %channel.id(), job = %job.id(), status = %job.status(), "job finished");
        }
        Err(e) => {
            if job.fail(e.to_string()) {
                info!(channel = %channel.id(), job = %job.id(), reason = %e, "job failed");
            }
        }
    }

    channel.finish_running(&entry);
    channel.publish(&job);
}

async fn drive(
    channel: &Channel,
    ctx: &PoolContext,
    pending: PendingJob,
    entry: &RunningEntry,
) -> Result<(), LifecycleError> {
    let PendingJob { job, submit } = pending;
    let token = &entry.token;

    if token.is_cancelled() || job.is_terminal() {
        return Err(LifecycleError::Cancelled);
    }

    let connected = tokio::select! {
        biased;
        _ = token.cancelled() => return Err(LifecycleError::Cancelled),
        ok = ctx.connectivity().wait_connected(ctx.scheduler().connect_wait()) => ok,
    };
    if !connected {
        return Err(LifecycleError::InstanceUnavailable);
    }

    if !job.mark_submitted() {
        // Finished by someone else while we waited.
        return Ok(());
    }
    channel.publish(&job);

    // The execution timeout covers the submission call and the wait after it.
    let minutes = ctx.account().timeout_minutes;
    let deadline = Instant::now() + ctx.account().timeout();

    let result = tokio::select! {
        biased;
        _ = token.cancelled() => return Err(LifecycleError::Cancelled),
        _ = sleep_until(deadline) => return Err(LifecycleError::TimedOut { minutes }),
        result = submit() => result,
    };
    if !result.is_success() {
        return Err(LifecycleError::Rejected(result.description));
    }
    debug!(channel = %channel.id(), job = %job.id(), "job accepted upstream");

    await_completion(channel, ctx, &job, entry, deadline).await?;

    if job.status() == JobStatus::Success {
        after_success(channel, ctx, &job).await;
    }
    Ok(())
}

/// Wait for the job to leave Submitted/InProgress, woken by its own change
/// signal with a polling fallback, until the account timeout expires.
async fn await_completion(
    channel: &Channel,
    ctx: &PoolContext,
    job: &Job,
    entry: &RunningEntry,
    deadline: Instant,
) -> Result<(), LifecycleError> {
    let minutes = ctx.account().timeout_minutes;
    let poll = ctx.scheduler().completion_poll();
    let mut last_seen = (job.status(), job.snapshot().progress);

    loop {
        let changed = job.changed();
        tokio::pin!(changed);
        changed.as_mut().enable();

        let snapshot = job.snapshot();
        if !snapshot.status.is_awaiting_remote() {
            return Ok(());
        }
        let seen = (snapshot.status, snapshot.progress);
        if seen != last_seen {
            channel.publish(job);
            last_seen = seen;
        }

        tokio::select! {
            biased;
            _ = entry.token.cancelled() => return Err(LifecycleError::Cancelled),
            _ = sleep_until(deadline) => {
                warn!(channel = %channel.id(), job = %job.id(), minutes, "job timed out");
                return Err(LifecycleError::TimedOut { minutes });
            }
            _ = &mut changed => {}
            _ = sleep(poll) => {}
        }
    }
}

/// Best-effort message housekeeping; failures are only logged.
async fn after_success(channel: &Channel, ctx: &PoolContext, job: &Job) {
    let (Some(messages), Some(message_id)) = (ctx.messages(), job.message_id()) else {
        return;
    };
    let account = ctx.account();

    if account.auto_read_messages
        && let Err(e) = messages.mark_read(channel.id(), &message_id).await
    {
        warn!(channel = %channel.id(), job = %job.id(), error = %e, "mark read failed");
    }
    if account.auto_delete_messages
        && let Err(e) = messages.delete_message(channel.id(), &message_id).await
    {
        warn!(channel = %channel.id(), job = %job.id(), error = %e, "auto-delete failed");
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "job task panicked".to_string()
    }
}
