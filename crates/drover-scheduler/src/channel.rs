// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A single channel: its pending FIFO, its running set and its gate.
//!
//! A job is either pending or running, never both. Every path that drops a
//! running job releases the slot it holds through the entry's `holds_slot`
//! flag, so a slot is released exactly once however the removal races with
//! the job's own cleanup.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use drover_core::{DroverError, Job, JobChangeEvent, JobChangeSink, JobId, SubmitFn};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::gate::ConcurrencyGate;
use crate::stats::ChannelStats;

/// A queued job together with the submission it will run.
pub struct PendingJob {
    pub job: Arc<Job>,
    pub submit: SubmitFn,
}

impl fmt::Debug for PendingJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingJob")
            .field("job", &self.job.id())
            .finish_non_exhaustive()
    }
}

/// Book-keeping for a job that left the queue.
#[derive(Debug)]
pub(crate) struct RunningEntry {
    pub(crate) job: Arc<Job>,
    pub(crate) token: CancellationToken,
    holds_slot: AtomicBool,
}

impl RunningEntry {
    /// Clears the slot flag, returning whether it was set.
    fn take_slot(&self) -> bool {
        self.holds_slot.swap(false, Ordering::AcqRel)
    }
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<PendingJob>,
    running: HashMap<JobId, Arc<RunningEntry>>,
}

/// Static identity and limits of a channel.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    pub id: String,
    pub account_id: String,
    pub guild_id: String,
    /// 0 means unbounded.
    pub queue_capacity: usize,
    pub max_concurrency: usize,
}

/// How a removed job ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Removal {
    Fail,
    Cancel,
}

/// One upstream channel of an account.
pub struct Channel {
    id: String,
    account_id: String,
    guild_id: String,
    queue_capacity: AtomicUsize,
    target_concurrency: AtomicUsize,
    gate: ConcurrencyGate,
    state: Mutex<QueueState>,
    wake: Notify,
    enabled: AtomicBool,
    shutdown: CancellationToken,
    sink: Arc<dyn JobChangeSink>,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("account_id", &self.account_id)
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

impl Channel {
    /// An enabled channel with an empty queue and a gate sized to
    /// `max_concurrency`.
    pub fn new(settings: ChannelSettings, sink: Arc<dyn JobChangeSink>) -> Self {
        let concurrency = settings.max_concurrency.max(1);
        Self {
            id: settings.id,
            account_id: settings.account_id,
            guild_id: settings.guild_id,
            queue_capacity: AtomicUsize::new(settings.queue_capacity),
            target_concurrency: AtomicUsize::new(concurrency),
            gate: ConcurrencyGate::new(concurrency),
            state: Mutex::new(QueueState::default()),
            wake: Notify::new(),
            enabled: AtomicBool::new(true),
            shutdown: CancellationToken::new(),
            sink,
        }
    }

    /// Upstream channel id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Owning account, fixed for the channel's lifetime.
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn guild_id(&self) -> &str {
        &self.guild_id
    }

    /// The concurrency gate running jobs hold a slot of.
    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    /// False once the channel is torn down; it then admits nothing.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Pending-queue bound, 0 meaning unlimited.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.load(Ordering::Acquire)
    }

    /// Applies to future admissions; queued jobs stay.
    pub fn set_queue_capacity(&self, capacity: usize) {
        self.queue_capacity.store(capacity, Ordering::Release);
    }

    /// Concurrency the worker converges the gate to.
    pub fn target_concurrency(&self) -> usize {
        self.target_concurrency.load(Ordering::Acquire)
    }

    /// Record a new concurrency and wake the worker to resize the gate.
    pub fn set_target_concurrency(&self, max: usize) {
        self.target_concurrency.store(max.max(1), Ordering::Release);
        self.wake.notify_one();
    }

    /// Append a job if the queue has room and wake the worker.
    pub fn enqueue(&self, job: Arc<Job>, submit: SubmitFn) -> Result<(), DroverError> {
        if !self.is_enabled() {
            return Err(DroverError::ChannelNotFound(self.id.clone()));
        }
        let capacity = self.queue_capacity();
        {
            let mut state = self.lock();
            if capacity != 0 && state.pending.len() >= capacity {
                return Err(DroverError::QueueFull {
                    channel_id: self.id.clone(),
                    capacity,
                });
            }
            job.assign_channel(&self.id);
            state.pending.push_back(PendingJob {
                job: Arc::clone(&job),
                submit,
            });
        }
        debug!(channel = %self.id, job = %job.id(), "job enqueued");
        self.wake.notify_one();
        Ok(())
    }

    /// Pop the oldest pending job.
    pub fn try_dequeue(&self) -> Option<PendingJob> {
        self.lock().pending.pop_front()
    }

    /// Pop the oldest pending job straight into the running set. The caller
    /// must already hold a gate slot; the entry takes ownership of it.
    pub(crate) fn dequeue_into_running(&self) -> Option<(PendingJob, Arc<RunningEntry>)> {
        let mut state = self.lock();
        let pending = state.pending.pop_front()?;
        let entry = Arc::new(RunningEntry {
            job: Arc::clone(&pending.job),
            token: self.shutdown.child_token(),
            holds_slot: AtomicBool::new(true),
        });
        state
            .running
            .insert(pending.job.id().clone(), Arc::clone(&entry));
        Some((pending, entry))
    }

    /// Drop a running entry once its lifecycle is over and release its slot.
    pub(crate) fn finish_running(&self, entry: &Arc<RunningEntry>) {
        {
            let mut state = self.lock();
            let same = state
                .running
                .get(entry.job.id())
                .is_some_and(|current| Arc::ptr_eq(current, entry));
            if same {
                state.running.remove(entry.job.id());
            }
        }
        self.release_slot(entry);
        self.wake.notify_one();
    }

    /// Fail a job wherever it is. Returns `false` when the job is unknown,
    /// which makes a second call a no-op.
    pub fn remove_job(&self, id: &JobId, reason: &str) -> bool {
        self.take_job(id, reason, Removal::Fail)
    }

    /// Like [`remove_job`](Self::remove_job) but ends the job as Cancelled.
    pub fn cancel_job(&self, id: &JobId, reason: &str) -> bool {
        self.take_job(id, reason, Removal::Cancel)
    }

    /// Fail every pending job. Returns how many were dropped.
    pub fn clear_pending(&self, reason: &str) -> usize {
        let drained: Vec<PendingJob> = self.lock().pending.drain(..).collect();
        for pending in &drained {
            self.end_job(&pending.job, reason, Removal::Fail);
        }
        drained.len()
    }

    /// Fail every running job, cancel its token and release its slot.
    pub fn clear_running(&self, reason: &str) -> usize {
        let drained: Vec<Arc<RunningEntry>> =
            self.lock().running.drain().map(|(_, entry)| entry).collect();
        for entry in &drained {
            self.stop_running(entry, reason, Removal::Fail);
        }
        drained.len()
    }

    /// Tear the channel down: no more admissions, every job failed, the
    /// worker stopped.
    pub fn cancel_and_clear_all(&self, reason: &str) -> usize {
        self.enabled.store(false, Ordering::Release);
        let cleared = self.clear_pending(reason) + self.clear_running(reason);
        self.shutdown.cancel();
        self.wake.notify_one();
        cleared
    }

    /// Admission test used by channel selection.
    pub fn is_idle_queue(&self) -> bool {
        let capacity = self.queue_capacity();
        capacity == 0 || self.pending_len() < capacity
    }

    /// No pending and no running jobs.
    pub fn is_idle(&self) -> bool {
        let state = self.lock();
        state.pending.is_empty() && state.running.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn running_len(&self) -> usize {
        self.lock().running.len()
    }

    /// Whether any job is waiting to be dequeued.
    pub fn has_pending(&self) -> bool {
        !self.lock().pending.is_empty()
    }

    /// Look a job up in either half of the channel.
    pub fn find_job(&self, id: &JobId) -> Option<Arc<Job>> {
        let state = self.lock();
        state
            .running
            .get(id)
            .map(|entry| Arc::clone(&entry.job))
            .or_else(|| {
                state
                    .pending
                    .iter()
                    .find(|p| p.job.id() == id)
                    .map(|p| Arc::clone(&p.job))
            })
    }

    /// Queue and gate counters at one instant.
    pub fn stats(&self) -> ChannelStats {
        let (pending, running) = {
            let state = self.lock();
            (state.pending.len(), state.running.len())
        };
        ChannelStats {
            channel_id: self.id.clone(),
            enabled: self.is_enabled(),
            pending,
            running,
            queue_capacity: self.queue_capacity(),
            capacity: self.gate.capacity(),
            held: self.gate.held(),
        }
    }

    /// Publish the job's current state to the change sink.
    pub fn publish(&self, job: &Job) {
        self.sink.publish(JobChangeEvent {
            account_id: self.account_id.clone(),
            channel_id: self.id.clone(),
            job: job.snapshot(),
        });
    }

    pub(crate) fn wake(&self) -> &Notify {
        &self.wake
    }

    pub(crate) fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    fn take_job(&self, id: &JobId, reason: &str, removal: Removal) -> bool {
        enum Found {
            Pending(PendingJob),
            Running(Arc<RunningEntry>),
        }

        let found = {
            let mut state = self.lock();
            if let Some(entry) = state.running.remove(id) {
                Some(Found::Running(entry))
            } else {
                state
                    .pending
                    .iter()
                    .position(|p| p.job.id() == id)
                    .and_then(|index| state.pending.remove(index))
                    .map(Found::Pending)
            }
        };

        match found {
            Some(Found::Pending(pending)) => {
                self.end_job(&pending.job, reason, removal);
                true
            }
            Some(Found::Running(entry)) => {
                self.stop_running(&entry, reason, removal);
                true
            }
            None => false,
        }
    }

    fn stop_running(&self, entry: &Arc<RunningEntry>, reason: &str, removal: Removal) {
        self.end_job(&entry.job, reason, removal);
        entry.token.cancel();
        self.release_slot(entry);
        self.wake.notify_one();
    }

    fn end_job(&self, job: &Job, reason: &str, removal: Removal) {
        let changed = match removal {
            Removal::Fail => job.fail(reason),
            Removal::Cancel => job.cancel(reason),
        };
        if changed {
            debug!(channel = %self.id, job = %job.id(), reason, "job removed");
            self.publish(job);
        }
    }

    fn release_slot(&self, entry: &RunningEntry) {
        if entry.take_slot()
            && let Err(e) = self.gate.release()
        {
            warn!(channel = %self.id, job = %entry.job.id(), error = %e, "slot release failed");
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
