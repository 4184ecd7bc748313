// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resizable counting gate bounding how many jobs a channel runs at once.
//!
//! Unlike a semaphore, the capacity can be changed at runtime, but only
//! while the gate is completely quiet: no slot held and no acquirer parked.
//! The check and the change happen under the same lock as `acquire`, so a
//! resize can never interleave with a half-finished acquisition.

use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;

use crate::error::GateError;

#[derive(Debug)]
struct GateState {
    capacity: usize,
    held: usize,
    waiters: usize,
}

/// Counting admission gate with a runtime-adjustable capacity.
#[derive(Debug)]
pub struct ConcurrencyGate {
    state: Mutex<GateState>,
    released: Notify,
}

impl ConcurrencyGate {
    /// Gate with `capacity` free slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(GateState {
                capacity,
                held: 0,
                waiters: 0,
            }),
            released: Notify::new(),
        }
    }

    /// Wait until a slot is free and take it. Cancel-safe: dropping the
    /// future before it resolves takes nothing.
    pub async fn acquire(&self) {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.held < state.capacity {
                    state.held += 1;
                    return;
                }
                state.waiters += 1;
            }

            let _waiting = WaiterGuard { gate: self };
            notified.await;
        }
    }

    /// Take a slot if one is free right now.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.lock();
        if state.held < state.capacity {
            state.held += 1;
            true
        } else {
            false
        }
    }

    /// Return a slot. Errors when nothing is held; the count is left at zero.
    pub fn release(&self) -> Result<(), GateError> {
        {
            let mut state = self.lock();
            if state.held == 0 {
                return Err(GateError::OverRelease {
                    capacity: state.capacity,
                });
            }
            state.held -= 1;
        }
        self.released.notify_one();
        Ok(())
    }

    /// Change the capacity. Only succeeds when no slot is held and nobody is
    /// waiting in [`acquire`](Self::acquire); otherwise nothing changes and
    /// the caller retries later. A capacity of zero is refused.
    pub fn set_capacity(&self, capacity: usize) -> bool {
        if capacity == 0 {
            return false;
        }
        let mut state = self.lock();
        if state.held != 0 || state.waiters != 0 {
            return false;
        }
        state.capacity = capacity;
        true
    }

    /// Current slot count.
    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// Slots taken and not yet released.
    pub fn held(&self) -> usize {
        self.lock().held
    }

    /// Whether a slot is free right now.
    pub fn is_available(&self) -> bool {
        let state = self.lock();
        state.held < state.capacity
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct WaiterGuard<'a> {
    gate: &'a ConcurrencyGate,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.lock();
        state.waiters = state.waiters.saturating_sub(1);
    }
}
