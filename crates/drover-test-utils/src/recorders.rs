// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborators that record what they were asked to do.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use drover_core::{
    AccountDisabler, ConnectionState, Connectivity, DispatchEvent, DispatchFlow, DispatchSink,
    DroverError, JobChangeEvent, JobChangeSink, JobId, JobStatus, MessageActions,
};
use tokio::sync::watch;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

/// Captures every job change event.
#[derive(Debug, Default)]
pub struct RecordingJobSink {
    events: Mutex<Vec<JobChangeEvent>>,
}

impl RecordingJobSink {
    pub fn events(&self) -> Vec<JobChangeEvent> {
        lock(&self.events).clone()
    }

    /// Statuses published for one job, in order.
    pub fn statuses(&self, job_id: &str) -> Vec<JobStatus> {
        let id = JobId::from(job_id);
        lock(&self.events)
            .iter()
            .filter(|e| e.job.id == id)
            .map(|e| e.job.status)
            .collect()
    }
}

impl JobChangeSink for RecordingJobSink {
    fn publish(&self, event: JobChangeEvent) {
        lock(&self.events).push(event);
    }
}

/// Captures every dispatch the session routes.
#[derive(Debug, Default)]
pub struct RecordingDispatchSink {
    events: Mutex<Vec<DispatchEvent>>,
}

impl RecordingDispatchSink {
    pub fn events(&self) -> Vec<DispatchEvent> {
        lock(&self.events).clone()
    }

    pub fn event_types(&self) -> Vec<String> {
        lock(&self.events)
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }
}

impl DispatchSink for RecordingDispatchSink {
    fn handle(&self, event: &DispatchEvent) -> DispatchFlow {
        lock(&self.events).push(event.clone());
        DispatchFlow::Continue
    }
}

/// Captures `(account_id, reason)` for every disable call.
#[derive(Debug, Default)]
pub struct RecordingDisabler {
    calls: Mutex<Vec<(String, String)>>,
}

impl RecordingDisabler {
    pub fn calls(&self) -> Vec<(String, String)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl AccountDisabler for RecordingDisabler {
    async fn disable(&self, account_id: &str, reason: &str) -> Result<(), DroverError> {
        lock(&self.calls).push((account_id.to_string(), reason.to_string()));
        Ok(())
    }
}

/// Captures mark-read and delete calls as `(action, channel_id, message_id)`.
#[derive(Debug, Default)]
pub struct RecordingMessageActions {
    calls: Mutex<Vec<(&'static str, String, String)>>,
    fail: bool,
}

impl RecordingMessageActions {
    /// A recorder whose calls all return an error.
    pub fn failing() -> Self {
        Self {
            calls: Mutex::default(),
            fail: true,
        }
    }

    pub fn calls(&self) -> Vec<(&'static str, String, String)> {
        lock(&self.calls).clone()
    }

    fn record(&self, action: &'static str, channel_id: &str, message_id: &str) -> Result<(), DroverError> {
        lock(&self.calls).push((action, channel_id.to_string(), message_id.to_string()));
        if self.fail {
            Err(DroverError::transport(format!("{action} refused")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MessageActions for RecordingMessageActions {
    async fn mark_read(&self, channel_id: &str, message_id: &str) -> Result<(), DroverError> {
        self.record("mark_read", channel_id, message_id)
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), DroverError> {
        self.record("delete_message", channel_id, message_id)
    }
}

/// Connection state set directly by the test.
#[derive(Debug)]
pub struct StaticConnectivity {
    state: watch::Sender<ConnectionState>,
}

impl StaticConnectivity {
    pub fn new(state: ConnectionState) -> Self {
        Self {
            state: watch::Sender::new(state),
        }
    }

    pub fn connected() -> Self {
        Self::new(ConnectionState::Connected)
    }

    pub fn disconnected() -> Self {
        Self::new(ConnectionState::Disconnected)
    }

    pub fn set(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }
}

#[async_trait]
impl Connectivity for StaticConnectivity {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    async fn wait_connected(&self, timeout: Duration) -> bool {
        let mut rx = self.state.subscribe();
        tokio::time::timeout(timeout, rx.wait_for(|s| *s == ConnectionState::Connected))
            .await
            .is_ok_and(|r| r.is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn static_connectivity_waits_for_connected() {
        let connectivity = StaticConnectivity::disconnected();
        assert!(!connectivity.wait_connected(Duration::from_secs(1)).await);
        connectivity.set(ConnectionState::Connected);
        assert!(connectivity.wait_connected(Duration::from_secs(1)).await);
    }
}
