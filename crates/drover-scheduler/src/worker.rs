// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-channel worker loop.
//!
//! One task per channel. Each iteration is isolated: an error is logged,
//! the loop backs off briefly and carries on. The slot is taken before a
//! job leaves the queue, so the running set can never outgrow the gate.

use std::sync::Arc;
use std::time::Duration;

use drover_core::DroverError;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::channel::Channel;
use crate::context::PoolContext;
use crate::lifecycle;

/// Run until the channel's shutdown token is cancelled.
pub(crate) async fn run(channel: Arc<Channel>, ctx: Arc<PoolContext>) {
    info!(account = %ctx.account_id(), channel = %channel.id(), "channel worker started");
    let stop = channel.shutdown_token().clone();

    while !stop.is_cancelled() {
        if let Err(e) = tick(&channel, &ctx).await {
            warn!(channel = %channel.id(), error = %e, "worker iteration failed");
            pause(&channel, ctx.scheduler().slot_backoff()).await;
        }
    }

    info!(account = %ctx.account_id(), channel = %channel.id(), "channel worker stopped");
}

async fn tick(channel: &Arc<Channel>, ctx: &Arc<PoolContext>) -> Result<(), DroverError> {
    let gate = channel.gate();
    let target = channel.target_concurrency();

    if target != gate.capacity() {
        if gate.set_capacity(target) {
            info!(channel = %channel.id(), capacity = target, "concurrency resized");
        } else {
            debug!(channel = %channel.id(), target, held = gate.held(), "resize deferred");
            pause(channel, ctx.scheduler().resize_retry()).await;
        }
        return Ok(());
    }

    if !channel.has_pending() {
        let wake = channel.wake().notified();
        tokio::select! {
            _ = channel.shutdown_token().cancelled() => {}
            _ = timeout(ctx.scheduler().idle_wait(), wake) => {}
        }
        return Ok(());
    }

    let acquired = tokio::select! {
        _ = channel.shutdown_token().cancelled() => return Ok(()),
        acquired = timeout(ctx.scheduler().slot_backoff(), gate.acquire()) => acquired.is_ok(),
    };
    if !acquired {
        return Ok(());
    }

    if !pause(channel, ctx.pre_interval()).await {
        release(channel)?;
        return Ok(());
    }

    let Some((pending, entry)) = channel.dequeue_into_running() else {
        // Removed while we paced.
        release(channel)?;
        return Ok(());
    };

    let light = pending.job.action().is_light();
    debug!(channel = %channel.id(), job = %pending.job.id(), "job dispatched");
    tokio::spawn(lifecycle::run(
        Arc::clone(channel),
        Arc::clone(ctx),
        pending,
        entry,
    ));

    pause(channel, ctx.post_interval(light)).await;
    Ok(())
}

/// Sleep unless the channel shuts down first. Returns `false` on shutdown.
async fn pause(channel: &Channel, duration: Duration) -> bool {
    tokio::select! {
        _ = channel.shutdown_token().cancelled() => false,
        _ = sleep(duration) => true,
    }
}

fn release(channel: &Channel) -> Result<(), DroverError> {
    channel
        .gate()
        .release()
        .map_err(|e| DroverError::Internal(format!("channel {}: {e}", channel.id())))
}
