// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sliding-window count of failed fresh connects.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
pub struct FailureTracker {
    window: Duration,
    limit: u32,
    failures: VecDeque<Instant>,
}

impl FailureTracker {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            window,
            limit: limit.max(1),
            failures: VecDeque::new(),
        }
    }

    /// Record a failure now. Returns `true` once `limit` failures fall
    /// inside the window.
    pub fn record(&mut self) -> bool {
        let now = Instant::now();
        self.prune(now);
        self.failures.push_back(now);
        self.failures.len() >= self.limit as usize
    }

    /// Failures currently inside the window.
    pub fn count(&mut self) -> usize {
        self.prune(Instant::now());
        self.failures.len()
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn reset(&mut self) {
        self.failures.clear();
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.failures.front() {
            if now.duration_since(*oldest) >= self.window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }
}
