// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Best-effort follow-up calls made after a job succeeds.

use async_trait::async_trait;

use crate::error::DroverError;

#[async_trait]
pub trait MessageActions: Send + Sync {
    /// Mark the result message as read on the remote channel.
    async fn mark_read(&self, channel_id: &str, message_id: &str) -> Result<(), DroverError>;

    /// Delete the source message that produced the result.
    async fn delete_message(&self, channel_id: &str, message_id: &str)
    -> Result<(), DroverError>;
}
