// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Why a connection ended, and how the session recovers from it.

use std::time::Duration;

use drover_core::DroverError;
use thiserror::Error;

use crate::protocol::SESSION_CLOSE_THRESHOLD;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("connect failed: {0}")]
    Connect(#[source] DroverError),

    #[error("no hello within {0:?}")]
    HelloTimeout(Duration),

    #[error("heartbeat was not acknowledged")]
    Zombie,

    #[error("server requested reconnect")]
    ServerReconnect,

    #[error("reconnect requested locally")]
    ReconnectRequested,

    #[error("session invalidated (resumable: {resumable})")]
    InvalidSession { resumable: bool },

    #[error("closed by remote with code {}", .0.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    Closed(Option<u16>),

    #[error("transport failed: {0}")]
    Transport(#[source] DroverError),

    #[error("stream ended")]
    StreamEnded,
}

/// How to reconnect after an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Keep the session and resume it when one exists.
    Resume,
    /// Discard the session and identify from scratch.
    Fresh,
}

impl GatewayError {
    pub fn recovery(&self) -> Recovery {
        match self {
            Self::InvalidSession { .. } => Recovery::Fresh,
            Self::Closed(Some(code)) if *code >= SESSION_CLOSE_THRESHOLD => Recovery::Fresh,
            _ => Recovery::Resume,
        }
    }

    /// Remote closed with a session-fatal code.
    pub fn is_fatal_close(&self) -> bool {
        matches!(self, Self::Closed(Some(code)) if *code >= SESSION_CLOSE_THRESHOLD)
    }
}
