// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The job record shared between the caller, the channel pool, and the
//! inbound message pipeline.
//!
//! All mutation goes through guarded transition methods. A transition that
//! would modify a job already in a terminal status is refused and returns
//! `false`, so exactly one terminal transition can ever succeed no matter
//! how many paths race to finish the same job.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::sync::futures::Notified;

use crate::types::{JobAction, JobId, JobStatus};

/// Terminal result of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobOutcome {
    /// Reference to the generated artifact (URL, attachment id, ...).
    Success { payload: String },
    Failure { reason: String },
    Cancelled { reason: String },
}

/// Point-in-time copy of a job, handed to change listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub action: JobAction,
    pub status: JobStatus,
    pub progress: Option<String>,
    pub channel_id: Option<String>,
    pub message_id: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: Option<JobOutcome>,
}

impl JobSnapshot {
    /// Failure reason, if the job failed.
    pub fn failure_reason(&self) -> Option<&str> {
        match &self.outcome {
            Some(JobOutcome::Failure { reason }) => Some(reason),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct JobState {
    status: JobStatus,
    progress: Option<String>,
    channel_id: Option<String>,
    message_id: Option<String>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    outcome: Option<JobOutcome>,
}

/// An image-generation job.
#[derive(Debug)]
pub struct Job {
    id: JobId,
    action: JobAction,
    submitted_at: DateTime<Utc>,
    state: Mutex<JobState>,
    changed: Notify,
}

impl Job {
    pub fn new(id: impl Into<JobId>, action: JobAction) -> Self {
        Self {
            id: id.into(),
            action,
            submitted_at: Utc::now(),
            state: Mutex::new(JobState {
                status: JobStatus::NotStarted,
                progress: None,
                channel_id: None,
                message_id: None,
                started_at: None,
                finished_at: None,
                outcome: None,
            }),
            changed: Notify::new(),
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn action(&self) -> JobAction {
        self.action
    }

    pub fn status(&self) -> JobStatus {
        self.lock().status
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn message_id(&self) -> Option<String> {
        self.lock().message_id.clone()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let state = self.lock();
        JobSnapshot {
            id: self.id.clone(),
            action: self.action,
            status: state.status,
            progress: state.progress.clone(),
            channel_id: state.channel_id.clone(),
            message_id: state.message_id.clone(),
            submitted_at: self.submitted_at,
            started_at: state.started_at,
            finished_at: state.finished_at,
            outcome: state.outcome.clone(),
        }
    }

    /// Future resolved on the next status or progress change.
    ///
    /// Call [`Notified::enable`] (or poll once) before re-checking the status
    /// to avoid missing a change that lands in between.
    pub fn changed(&self) -> Notified<'_> {
        self.changed.notified()
    }

    /// Record the channel the job was routed to.
    pub fn assign_channel(&self, channel_id: &str) {
        self.lock().channel_id = Some(channel_id.to_string());
    }

    /// NotStarted -> Submitted. Stamps the start time.
    pub fn mark_submitted(&self) -> bool {
        self.transition(|state| {
            if state.status != JobStatus::NotStarted {
                return false;
            }
            state.status = JobStatus::Submitted;
            state.started_at = Some(Utc::now());
            true
        })
    }

    /// Report remote progress. Allowed from any non-terminal status except
    /// NotStarted.
    pub fn mark_in_progress(&self, progress: Option<String>) -> bool {
        self.transition(|state| {
            if state.status == JobStatus::NotStarted {
                return false;
            }
            state.status = JobStatus::InProgress;
            if progress.is_some() {
                state.progress = progress;
            }
            true
        })
    }

    /// The remote side asked for modal input before it can continue.
    pub fn await_modal(&self) -> bool {
        self.transition(|state| {
            state.status = JobStatus::AwaitingModal;
            true
        })
    }

    /// Attach the remote message id once the pipeline correlates it.
    pub fn set_message_id(&self, message_id: impl Into<String>) -> bool {
        let message_id = message_id.into();
        self.transition(|state| {
            state.message_id = Some(message_id);
            true
        })
    }

    pub fn succeed(&self, payload: impl Into<String>) -> bool {
        let payload = payload.into();
        self.finish(
            JobStatus::Success,
            JobOutcome::Success { payload },
            Some("100%".to_string()),
        )
    }

    pub fn fail(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        self.finish(JobStatus::Failure, JobOutcome::Failure { reason }, None)
    }

    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        self.finish(JobStatus::Cancelled, JobOutcome::Cancelled { reason }, None)
    }

    fn finish(&self, status: JobStatus, outcome: JobOutcome, progress: Option<String>) -> bool {
        self.transition(|state| {
            state.status = status;
            state.outcome = Some(outcome);
            state.finished_at = Some(Utc::now());
            if progress.is_some() {
                state.progress = progress;
            }
            true
        })
    }

    fn transition(&self, apply: impl FnOnce(&mut JobState) -> bool) -> bool {
        let applied = {
            let mut state = self.lock();
            if state.status.is_terminal() {
                false
            } else {
                apply(&mut state)
            }
        };
        if applied {
            self.changed.notify_waiters();
        }
        applied
    }

    fn lock(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
