// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job change events for persistence and notification layers.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::job::JobSnapshot;

/// Emitted by the channel pool on every job status transition.
#[derive(Debug, Clone, Serialize)]
pub struct JobChangeEvent {
    pub account_id: String,
    pub channel_id: String,
    pub job: JobSnapshot,
}

/// Consumer of job change events. Called from worker and job tasks, so
/// implementations must return quickly.
pub trait JobChangeSink: Send + Sync {
    fn publish(&self, event: JobChangeEvent);
}

/// Fan-out sink backed by a tokio broadcast channel.
///
/// Slow subscribers lag and miss events rather than stalling the scheduler.
#[derive(Debug, Clone)]
pub struct BroadcastJobSink {
    tx: broadcast::Sender<JobChangeEvent>,
}

impl BroadcastJobSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobChangeEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastJobSink {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl JobChangeSink for BroadcastJobSink {
    fn publish(&self, event: JobChangeEvent) {
        if self.tx.send(event).is_err() {
            trace!("job change event dropped: no subscribers");
        }
    }
}
