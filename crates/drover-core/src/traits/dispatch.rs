// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound dispatch delivery to the message-to-job correlation pipeline.

use serde::Serialize;

/// A decoded gateway dispatch. Only the envelope is interpreted; `data` is
/// forwarded untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchEvent {
    pub account_id: String,
    pub sequence: Option<u64>,
    pub event_type: String,
    pub data: serde_json::Value,
}

impl DispatchEvent {
    /// `data.channel_id`, when present.
    pub fn channel_id(&self) -> Option<&str> {
        self.data.get("channel_id").and_then(serde_json::Value::as_str)
    }
}

/// Whether later handlers still see the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchFlow {
    Continue,
    Stop,
}

/// Receives decoded dispatches. Runs on the session task, so
/// implementations must not block; hand heavy work to a channel.
pub trait DispatchSink: Send + Sync {
    fn handle(&self, event: &DispatchEvent) -> DispatchFlow;
}
