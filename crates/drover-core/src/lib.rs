// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Drover job router.
//!
//! Provides the job model, the shared error type, and the collaborator
//! traits that connect the scheduler to the gateway session and to the
//! systems Drover does not own.

pub mod error;
pub mod job;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::DroverError;
pub use job::{Job, JobOutcome, JobSnapshot};
pub use types::{
    ConnectionState, HealthStatus, JobAction, JobId, JobStatus, ReturnCode, SubmitFn,
    SubmitResult, submit_fn,
};

pub use traits::{
    AccountDisabler, BroadcastJobSink, Connectivity, Connector, DispatchEvent, DispatchFlow,
    DispatchSink, Frame, GatewayTransport, JobChangeEvent, JobChangeSink, MessageActions,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drover_error_variants_render() {
        let no_capacity = DroverError::NoCapacity {
            account_id: "acct-1".into(),
        };
        assert!(no_capacity.to_string().contains("acct-1"));
        assert!(no_capacity.is_admission());

        let full = DroverError::QueueFull {
            channel_id: "c1".into(),
            capacity: 2,
        };
        assert!(full.to_string().contains("capacity 2"));
        assert!(full.is_admission());

        let transport = DroverError::transport("connection reset");
        assert!(!transport.is_admission());
        assert_eq!(transport.to_string(), "transport error: connection reset");

        let timeout = DroverError::Timeout {
            duration: std::time::Duration::from_secs(30),
        };
        assert!(timeout.to_string().contains("30"));
    }

    #[test]
    fn job_status_round_trips_through_strings() {
        use std::str::FromStr;

        let all = [
            JobStatus::NotStarted,
            JobStatus::Submitted,
            JobStatus::InProgress,
            JobStatus::Success,
            JobStatus::Failure,
            JobStatus::AwaitingModal,
            JobStatus::Cancelled,
        ];
        for status in all {
            let parsed = JobStatus::from_str(&status.to_string()).expect("should parse back");
            assert_eq!(status, parsed);
        }
        assert_eq!(JobStatus::InProgress.to_string(), "in_progress");
    }

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Success.is_terminal());
        assert!(JobStatus::Failure.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::AwaitingModal.is_terminal());
        assert!(JobStatus::Submitted.is_awaiting_remote());
        assert!(!JobStatus::AwaitingModal.is_awaiting_remote());
    }

    #[tokio::test]
    async fn submit_fn_wraps_async_closure() {
        let submit = submit_fn(|| async { SubmitResult::failure("banned prompt") });
        let result = submit().await;
        assert!(!result.is_success());
        assert_eq!(result.description, "banned prompt");
    }

    #[test]
    fn connection_state_display() {
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
    }
}
