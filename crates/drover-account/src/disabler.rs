// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Remembers why an account was disabled before handing the call on.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use drover_core::{AccountDisabler, DroverError};

pub(crate) struct ReasonRecorder {
    inner: Arc<dyn AccountDisabler>,
    reason: Arc<Mutex<Option<String>>>,
}

impl ReasonRecorder {
    pub(crate) fn new(inner: Arc<dyn AccountDisabler>, reason: Arc<Mutex<Option<String>>>) -> Self {
        Self { inner, reason }
    }
}

#[async_trait]
impl AccountDisabler for ReasonRecorder {
    async fn disable(&self, account_id: &str, reason: &str) -> Result<(), DroverError> {
        *self.reason.lock().unwrap_or_else(|p| p.into_inner()) = Some(reason.to_string());
        self.inner.disable(account_id, reason).await
    }
}

/// Disabler that only records the reason in logs. Used when nothing
/// outside the process needs to know.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlyDisabler;

#[async_trait]
impl AccountDisabler for LogOnlyDisabler {
    async fn disable(&self, account_id: &str, reason: &str) -> Result<(), DroverError> {
        tracing::warn!(account = %account_id, reason, "account disabled");
        Ok(())
    }
}
