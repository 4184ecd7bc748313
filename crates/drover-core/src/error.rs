// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Drover job router.

use thiserror::Error;

/// The primary error type shared by every Drover crate.
#[derive(Debug, Error)]
pub enum DroverError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// No channel of the account can accept another job right now.
    #[error("no channel with free capacity for account {account_id}")]
    NoCapacity { account_id: String },

    /// The selected channel's pending queue is full.
    #[error("queue full on channel {channel_id} (capacity {capacity})")]
    QueueFull { channel_id: String, capacity: usize },

    /// The referenced channel is not a member of the pool.
    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    /// The account is disabled or unknown.
    #[error("account {account_id} is unavailable: {reason}")]
    AccountUnavailable { account_id: String, reason: String },

    /// Transport failures (connect refused, socket reset, send on a closed stream).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Malformed or unexpected gateway frames.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DroverError {
    /// Shorthand for a transport error without an underlying source.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Returns `true` for admission errors that the caller may retry later.
    pub fn is_admission(&self) -> bool {
        matches!(self, Self::NoCapacity { .. } | Self::QueueFull { .. })
    }
}

impl From<serde_json::Error> for DroverError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(format!("invalid JSON payload: {err}"))
    }
}
