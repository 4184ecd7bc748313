// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! State shared by a pool's workers and job tasks.
//!
//! Workers never see the pool itself, only this context and their own
//! channel.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use drover_config::{AccountConfig, SchedulerConfig};
use drover_core::{Connectivity, JobChangeSink, MessageActions};
use rand::Rng;

pub struct PoolContext {
    account_id: String,
    account: ArcSwap<AccountConfig>,
    scheduler: SchedulerConfig,
    connectivity: Arc<dyn Connectivity>,
    sink: Arc<dyn JobChangeSink>,
    messages: Option<Arc<dyn MessageActions>>,
}

impl std::fmt::Debug for PoolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolContext")
            .field("account_id", &self.account_id)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl PoolContext {
    pub fn new(
        account: AccountConfig,
        scheduler: SchedulerConfig,
        connectivity: Arc<dyn Connectivity>,
        sink: Arc<dyn JobChangeSink>,
    ) -> Self {
        Self {
            account_id: account.id.clone(),
            account: ArcSwap::from_pointee(account),
            scheduler,
            connectivity,
            sink,
            messages: None,
        }
    }

    /// Enable the post-success mark-read and auto-delete actions.
    pub fn with_message_actions(mut self, messages: Arc<dyn MessageActions>) -> Self {
        self.messages = Some(messages);
        self
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Current account configuration.
    pub fn account(&self) -> Arc<AccountConfig> {
        self.account.load_full()
    }

    pub(crate) fn store_account(&self, account: AccountConfig) {
        self.account.store(Arc::new(account));
    }

    pub fn scheduler(&self) -> &SchedulerConfig {
        &self.scheduler
    }

    pub fn connectivity(&self) -> &Arc<dyn Connectivity> {
        &self.connectivity
    }

    pub fn sink(&self) -> &Arc<dyn JobChangeSink> {
        &self.sink
    }

    pub fn messages(&self) -> Option<&Arc<dyn MessageActions>> {
        self.messages.as_ref()
    }

    /// Pre-submission interval, never below the floor.
    pub fn pre_interval(&self) -> Duration {
        let floor = self.scheduler.min_interval();
        secs(self.account().interval_secs).max(floor)
    }

    /// Post-submission interval: the floor for light actions, otherwise a
    /// random pick from the configured window clamped to the floor.
    pub fn post_interval(&self, light: bool) -> Duration {
        let floor = self.scheduler.min_interval();
        if light {
            return floor;
        }
        let account = self.account();
        let low = secs(account.after_interval_min_secs).max(floor);
        let high = secs(account.after_interval_max_secs).max(floor);
        if high <= low {
            return low;
        }
        rand::thread_rng().gen_range(low..=high)
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use drover_test_utils::{RecordingJobSink, StaticConnectivity};

    use super::*;

    fn context(interval: f64, min: f64, max: f64) -> PoolContext {
        let mut account = AccountConfig::new("acct", "c1");
        account.interval_secs = interval;
        account.after_interval_min_secs = min;
        account.after_interval_max_secs = max;
        PoolContext::new(
            account,
            SchedulerConfig::default(),
            Arc::new(StaticConnectivity::connected()),
            Arc::new(RecordingJobSink::default()),
        )
    }

    #[test]
    fn pre_interval_is_floored() {
        assert_eq!(context(0.1, 0.0, 0.0).pre_interval(), Duration::from_millis(1200));
        assert_eq!(context(3.0, 0.0, 0.0).pre_interval(), Duration::from_secs(3));
    }

    #[test]
    fn post_interval_stays_in_window() {
        let ctx = context(1.2, 2.0, 4.0);
        for _ in 0..32 {
            let d = ctx.post_interval(false);
            assert!(d >= Duration::from_secs(2) && d <= Duration::from_secs(4), "{d:?}");
        }
    }

    #[test]
    fn light_actions_and_low_windows_use_the_floor() {
        let ctx = context(1.2, 2.0, 4.0);
        assert_eq!(ctx.post_interval(true), Duration::from_millis(1200));
        let low = context(1.2, 0.5, 0.8);
        assert_eq!(low.post_interval(false), Duration::from_millis(1200));
    }

    #[test]
    fn refreshed_account_is_visible() {
        let ctx = context(1.2, 1.2, 1.2);
        let mut updated = (*ctx.account()).clone();
        updated.interval_secs = 5.0;
        ctx.store_account(updated);
        assert_eq!(ctx.pre_interval(), Duration::from_secs(5));
    }
}
