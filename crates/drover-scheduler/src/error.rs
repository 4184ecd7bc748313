// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduler-internal error types.

use thiserror::Error;

/// Misuse of a [`ConcurrencyGate`](crate::gate::ConcurrencyGate).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// `release` was called with no slot held.
    #[error("concurrency gate released more often than acquired (capacity {capacity})")]
    OverRelease { capacity: usize },
}

/// Why a job lifecycle ended in Failure. The `Display` text becomes the
/// job's failure reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("cancelled")]
    Cancelled,

    #[error("instance unavailable")]
    InstanceUnavailable,

    /// The external submission returned a non-success code.
    #[error("{0}")]
    Rejected(String),

    #[error("execution timed out after {minutes} minutes")]
    TimedOut { minutes: u64 },

    #[error("{0}")]
    Panicked(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_reasons_render_as_plain_text() {
        assert_eq!(LifecycleError::Cancelled.to_string(), "cancelled");
        assert_eq!(
            LifecycleError::InstanceUnavailable.to_string(),
            "instance unavailable"
        );
        assert_eq!(
            LifecycleError::TimedOut { minutes: 5 }.to_string(),
            "execution timed out after 5 minutes"
        );
        assert_eq!(
            LifecycleError::Rejected("banned prompt".into()).to_string(),
            "banned prompt"
        );
    }
}
