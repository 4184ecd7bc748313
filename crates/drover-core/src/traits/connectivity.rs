// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway liveness as seen by the job lifecycle.

use std::time::Duration;

use async_trait::async_trait;

use crate::types::ConnectionState;

/// Read-only view of an account's gateway connection.
#[async_trait]
pub trait Connectivity: Send + Sync {
    /// Current connection state.
    fn state(&self) -> ConnectionState;

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Wait up to `timeout` for the connection to report Connected.
    async fn wait_connected(&self, timeout: Duration) -> bool;
}
