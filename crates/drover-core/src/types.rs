// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across the scheduler, gateway, and account layers.

use std::fmt;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Unique identifier for a job, assigned by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Lifecycle status of a job.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    NotStarted,
    Submitted,
    InProgress,
    Success,
    Failure,
    AwaitingModal,
    Cancelled,
}

impl JobStatus {
    /// Terminal statuses never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Cancelled)
    }

    /// Statuses during which the lifecycle keeps waiting for the remote side.
    pub fn is_awaiting_remote(self) -> bool {
        matches!(self, Self::Submitted | Self::InProgress)
    }
}

/// Category of work a job performs. Only used to branch submission pacing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobAction {
    Imagine,
    Upscale,
    Variation,
    Reroll,
    Describe,
    Blend,
    Shorten,
    Zoom,
    Pan,
    Custom,
}

impl JobAction {
    /// Light actions operate on an already generated grid and are paced at
    /// the interval floor instead of the randomized post-submission window.
    pub fn is_light(self) -> bool {
        matches!(self, Self::Upscale)
    }
}

/// Result code returned by the external submission call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReturnCode {
    Success,
    Failure,
    NotFound,
    ValidationError,
    Existed,
    InQueue,
}

/// Outcome of the opaque external submission call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResult {
    pub code: ReturnCode,
    pub description: String,
}

impl SubmitResult {
    pub fn success() -> Self {
        Self {
            code: ReturnCode::Success,
            description: "success".to_string(),
        }
    }

    pub fn failure(description: impl Into<String>) -> Self {
        Self {
            code: ReturnCode::Failure,
            description: description.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == ReturnCode::Success
    }
}

/// Opaque external submission, injected per job at enqueue time.
pub type SubmitFn = Box<dyn FnOnce() -> BoxFuture<'static, SubmitResult> + Send>;

/// Wrap an async closure into a [`SubmitFn`].
pub fn submit_fn<F, Fut>(f: F) -> SubmitFn
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = SubmitResult> + Send + 'static,
{
    Box::new(move || Box::pin(f()))
}

/// Connection state of an account's gateway session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

/// Health status reported for an account instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Connected and accepting work.
    Healthy,
    /// Operational but impaired (reconnecting, queues saturated).
    Degraded(String),
    /// Not operational.
    Unhealthy(String),
}
