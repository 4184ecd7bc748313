// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Permanent account disablement.

use async_trait::async_trait;

use crate::error::DroverError;

/// Invoked by the gateway session when an account can no longer connect.
///
/// Implementations persist the disabled flag and reason, notify the
/// operator, and may kick off external re-authentication.
#[async_trait]
pub trait AccountDisabler: Send + Sync {
    async fn disable(&self, account_id: &str, reason: &str) -> Result<(), DroverError>;
}
