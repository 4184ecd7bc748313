// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The channels of one account and their workers.
//!
//! The pool owns the channel map; each worker only holds its own channel
//! and the shared [`PoolContext`]. Membership changes touch only the
//! channels that were added or removed.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use drover_config::AccountConfig;
use drover_core::{DroverError, Job, JobId, SubmitFn};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelSettings};
use crate::context::PoolContext;
use crate::selector::{ChannelSelector, selector_for};
use crate::stats::PoolSnapshot;
use crate::worker;

/// Failure reason for jobs on a channel that left the pool.
pub const CHANNEL_REMOVED: &str = "channel removed";

struct ChannelEntry {
    channel: Arc<Channel>,
    worker: JoinHandle<()>,
}

/// Scheduler for every channel of one account.
pub struct ChannelPool {
    ctx: Arc<PoolContext>,
    selector: Arc<dyn ChannelSelector>,
    channels: RwLock<BTreeMap<String, ChannelEntry>>,
    disposed: AtomicBool,
}

impl std::fmt::Debug for ChannelPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelPool")
            .field("account_id", &self.ctx.account_id())
            .field("selector", &self.selector.name())
            .field("channels", &self.channel_ids())
            .finish()
    }
}

impl ChannelPool {
    /// Create the pool with the configured selector and start one worker per
    /// configured channel. Must be called inside a tokio runtime.
    pub fn new(ctx: PoolContext) -> Self {
        let selector = selector_for(ctx.scheduler().selector);
        Self::with_selector(ctx, selector)
    }

    pub fn with_selector(ctx: PoolContext, selector: Arc<dyn ChannelSelector>) -> Self {
        let pool = Self {
            ctx: Arc::new(ctx),
            selector,
            channels: RwLock::new(BTreeMap::new()),
            disposed: AtomicBool::new(false),
        };
        let ids = pool.ctx.account().all_channel_ids();
        pool.refresh_membership(&ids);
        info!(
            account = %pool.ctx.account_id(),
            selector = pool.selector.name(),
            channels = ids.len(),
            "channel pool started"
        );
        pool
    }

    pub fn account_id(&self) -> &str {
        self.ctx.account_id()
    }

    pub fn context(&self) -> &Arc<PoolContext> {
        &self.ctx
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Route a job to a channel and queue it. Returns the chosen channel id.
    ///
    /// Admission errors (no channel, queue full) are returned here; the job
    /// is never dropped silently.
    pub fn submit(
        &self,
        job: Arc<Job>,
        submit: SubmitFn,
        preferred: Option<&str>,
    ) -> Result<String, DroverError> {
        if self.is_disposed() {
            return Err(DroverError::AccountUnavailable {
                account_id: self.account_id().to_string(),
                reason: "pool disposed".to_string(),
            });
        }

        let channels = self.channels();
        let channel = match self.selector.select(&channels, preferred) {
            Some(channel) => channel,
            None => {
                let fallback = channels
                    .iter()
                    .filter(|c| c.is_enabled())
                    .min_by_key(|c| c.pending_len())
                    .cloned()
                    .ok_or_else(|| DroverError::NoCapacity {
                        account_id: self.account_id().to_string(),
                    })?;
                warn!(
                    account = %self.account_id(),
                    channel = %fallback.id(),
                    job = %job.id(),
                    "no idle channel, falling back to shortest pending queue"
                );
                fallback
            }
        };

        channel.enqueue(job, submit)?;
        Ok(channel.id().to_string())
    }

    /// Make the pool's channels match `ids` (the primary channel is always
    /// kept). Removed channels fail their jobs and stop their worker.
    pub fn refresh_membership(&self, ids: &[String]) {
        let account = self.ctx.account();
        let mut wanted: BTreeSet<String> =
            ids.iter().filter(|id| !id.is_empty()).cloned().collect();
        wanted.insert(account.channel_id.clone());

        let removed: Vec<Arc<Channel>> = {
            let mut channels = self.write();
            let obsolete: Vec<String> = channels
                .keys()
                .filter(|id| !wanted.contains(*id))
                .cloned()
                .collect();
            let removed: Vec<Arc<Channel>> = obsolete
                .iter()
                .filter_map(|id| channels.remove(id))
                .map(|entry| entry.channel)
                .collect();

            if !self.is_disposed() {
                for id in wanted {
                    if channels.contains_key(&id) {
                        continue;
                    }
                    let channel = Arc::new(Channel::new(
                        ChannelSettings {
                            id: id.clone(),
                            account_id: self.account_id().to_string(),
                            guild_id: account.guild_id.clone(),
                            queue_capacity: account.queue_size,
                            max_concurrency: account.effective_concurrency(),
                        },
                        Arc::clone(self.ctx.sink()),
                    ));
                    let worker =
                        tokio::spawn(worker::run(Arc::clone(&channel), Arc::clone(&self.ctx)));
                    info!(account = %self.account_id(), channel = %id, "channel added");
                    channels.insert(id, ChannelEntry { channel, worker });
                }
            }
            removed
        };

        for channel in removed {
            let failed = channel.cancel_and_clear_all(CHANNEL_REMOVED);
            info!(account = %self.account_id(), channel = %channel.id(), failed, "channel removed");
        }
    }

    /// Apply a new account configuration: queue sizes, concurrency targets
    /// and channel membership.
    pub fn refresh(&self, account: AccountConfig) {
        let ids = account.all_channel_ids();
        let concurrency = account.effective_concurrency();
        let queue_size = account.queue_size;
        self.ctx.store_account(account);

        for channel in self.channels() {
            channel.set_queue_capacity(queue_size);
            channel.set_target_concurrency(concurrency);
        }
        self.refresh_membership(&ids);
        debug!(account = %self.account_id(), "pool configuration refreshed");
    }

    /// Change the concurrency of one channel, or of all when `channel_id` is
    /// `None`. Returns `true` when every gate was resized immediately;
    /// otherwise the workers keep retrying until their channel drains.
    pub fn resize(&self, channel_id: Option<&str>, max: usize) -> Result<bool, DroverError> {
        let targets = match channel_id {
            Some(id) => vec![
                self.channel(id)
                    .ok_or_else(|| DroverError::ChannelNotFound(id.to_string()))?,
            ],
            None => self.channels(),
        };

        let mut all_applied = true;
        for channel in targets {
            channel.set_target_concurrency(max);
            all_applied &= channel.gate().set_capacity(max.max(1));
        }
        Ok(all_applied)
    }

    /// Whether `channel_id` (or any channel) can accept another job.
    pub fn has_available_resource(&self, channel_id: Option<&str>) -> bool {
        let usable = |c: &Arc<Channel>| c.is_enabled() && c.is_idle_queue();
        match channel_id {
            Some(id) => self.channel(id).is_some_and(|c| usable(&c)),
            None => self.channels().iter().any(usable),
        }
    }

    pub fn channel(&self, id: &str) -> Option<Arc<Channel>> {
        self.read().get(id).map(|entry| Arc::clone(&entry.channel))
    }

    /// All channels, ordered by id.
    pub fn channels(&self) -> Vec<Arc<Channel>> {
        self.read()
            .values()
            .map(|entry| Arc::clone(&entry.channel))
            .collect()
    }

    pub fn channel_ids(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Find a queued or running job and the channel holding it.
    pub fn find_job(&self, id: &JobId) -> Option<(String, Arc<Job>)> {
        self.channels()
            .into_iter()
            .find_map(|c| c.find_job(id).map(|job| (c.id().to_string(), job)))
    }

    /// Cancel a queued or running job wherever it is.
    pub fn cancel_job(&self, id: &JobId, reason: &str) -> bool {
        self.channels().iter().any(|c| c.cancel_job(id, reason))
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            account_id: self.account_id().to_string(),
            channels: self.channels().iter().map(|c| c.stats()).collect(),
        }
    }

    /// Stop every worker and fail every job with `reason`. Idempotent.
    pub async fn dispose(&self, reason: &str) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let entries: Vec<ChannelEntry> = {
            let mut channels = self.write();
            std::mem::take(&mut *channels).into_values().collect()
        };

        let mut failed = 0;
        for entry in &entries {
            failed += entry.channel.cancel_and_clear_all(reason);
        }
        for entry in entries {
            let mut worker = entry.worker;
            if tokio::time::timeout(Duration::from_secs(5), &mut worker)
                .await
                .is_err()
            {
                warn!(channel = %entry.channel.id(), "worker did not stop, aborting");
                worker.abort();
            }
        }
        info!(account = %self.account_id(), failed, reason, "channel pool disposed");
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, ChannelEntry>> {
        self.channels.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, ChannelEntry>> {
        self.channels.write().unwrap_or_else(|p| p.into_inner())
    }
}

impl Drop for ChannelPool {
    fn drop(&mut self) {
        for entry in self.read().values() {
            entry.channel.shutdown_token().cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use drover_core::{JobAction, JobStatus, SubmitResult, submit_fn};
    use drover_test_utils::{RecordingJobSink, StaticConnectivity, fixtures};
    use tracing_test::traced_test;

    use super::*;

    fn pool(account: AccountConfig, connectivity: StaticConnectivity) -> ChannelPool {
        ChannelPool::new(PoolContext::new(
            account,
            fixtures::scheduler(),
            Arc::new(connectivity),
            Arc::new(RecordingJobSink::default()),
        ))
    }

    fn job(id: &str) -> Arc<Job> {
        Arc::new(Job::new(id, JobAction::Imagine))
    }

    fn noop() -> SubmitFn {
        submit_fn(|| async { SubmitResult::success() })
    }

    #[tokio::test]
    #[traced_test]
    async fn full_queues_fall_back_and_log() {
        let mut account = fixtures::account("acct", &["c1"]);
        account.queue_size = 1;
        let pool = pool(account, StaticConnectivity::connected());

        pool.submit(job("a"), noop(), None).unwrap();
        let err = pool.submit(job("b"), noop(), None).unwrap_err();

        assert!(matches!(err, DroverError::QueueFull { .. }));
        assert!(logs_contain("falling back to shortest pending queue"));
        pool.dispose("test over").await;
    }

    #[tokio::test]
    async fn primary_channel_survives_membership_refresh() {
        let pool = pool(
            fixtures::account("acct", &["c1", "c2", "c3"]),
            StaticConnectivity::connected(),
        );
        assert_eq!(pool.channel_ids(), vec!["c1", "c2", "c3"]);

        pool.refresh_membership(&["c3".to_string(), "c4".to_string()]);
        assert_eq!(pool.channel_ids(), vec!["c1", "c3", "c4"]);
        pool.dispose("test over").await;
    }

    #[tokio::test]
    async fn preferred_channel_is_sticky() {
        let pool = pool(
            fixtures::account("acct", &["c1", "c2"]),
            StaticConnectivity::connected(),
        );
        let chosen = pool.submit(job("a"), noop(), Some("c2")).unwrap();
        assert_eq!(chosen, "c2");
        assert!(pool.has_available_resource(Some("c2")));
        assert!(!pool.has_available_resource(Some("nope")));
        pool.dispose("test over").await;
    }

    #[tokio::test(start_paused = true)]
    async fn disconnected_instance_fails_job() {
        let pool = pool(
            fixtures::account("acct", &["c1"]),
            StaticConnectivity::disconnected(),
        );
        let a = job("a");
        pool.submit(Arc::clone(&a), noop(), None).unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(a.status(), JobStatus::Failure);
        assert_eq!(a.snapshot().failure_reason(), Some("instance unavailable"));
        assert_eq!(pool.channel("c1").unwrap().gate().held(), 0);
        pool.dispose("test over").await;
    }

    #[tokio::test]
    async fn find_and_cancel_job() {
        let pool = pool(
            fixtures::account("acct", &["c1", "c2"]),
            StaticConnectivity::connected(),
        );
        let a = job("a");
        let channel = pool.submit(Arc::clone(&a), noop(), Some("c2")).unwrap();

        let (found_in, found) = pool.find_job(a.id()).unwrap();
        assert_eq!(found_in, channel);
        assert!(Arc::ptr_eq(&found, &a));

        assert!(pool.cancel_job(a.id(), "client cancelled"));
        assert_eq!(a.status(), JobStatus::Cancelled);
        assert!(!pool.cancel_job(a.id(), "client cancelled"));
        pool.dispose("test over").await;
    }

    #[tokio::test]
    async fn disposed_pool_rejects_submissions() {
        let pool = pool(
            fixtures::account("acct", &["c1"]),
            StaticConnectivity::connected(),
        );
        let a = job("a");
        pool.submit(Arc::clone(&a), noop(), None).unwrap();
        pool.dispose("service shutting down").await;

        assert_eq!(a.snapshot().failure_reason(), Some("service shutting down"));
        assert!(pool.channel_ids().is_empty());
        let err = pool.submit(job("b"), noop(), None).unwrap_err();
        assert!(matches!(err, DroverError::AccountUnavailable { .. }));
        // Second dispose is a no-op.
        pool.dispose("again").await;
    }
}
