// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Point-in-time views of channel and pool load.

/// Load of a single channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStats {
    pub channel_id: String,
    pub enabled: bool,
    pub pending: usize,
    pub running: usize,
    /// Pending queue capacity; 0 means unbounded.
    pub queue_capacity: usize,
    /// Current gate capacity.
    pub capacity: usize,
    /// Gate slots currently held.
    pub held: usize,
}

impl ChannelStats {
    /// Pending queue is at capacity.
    pub fn is_saturated(&self) -> bool {
        self.queue_capacity != 0 && self.pending >= self.queue_capacity
    }
}

/// Load of every channel in an account's pool, ordered by channel id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub account_id: String,
    pub channels: Vec<ChannelStats>,
}

impl PoolSnapshot {
    pub fn pending(&self) -> usize {
        self.channels.iter().map(|c| c.pending).sum()
    }

    pub fn running(&self) -> usize {
        self.channels.iter().map(|c| c.running).sum()
    }

    /// Every channel's queue is full.
    pub fn is_saturated(&self) -> bool {
        !self.channels.is_empty() && self.channels.iter().all(ChannelStats::is_saturated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(pending: usize, running: usize, queue_capacity: usize) -> ChannelStats {
        ChannelStats {
            channel_id: "c".into(),
            enabled: true,
            pending,
            running,
            queue_capacity,
            capacity: 1,
            held: running,
        }
    }

    #[test]
    fn unbounded_queue_never_saturates() {
        assert!(!stats(100, 1, 0).is_saturated());
        assert!(stats(2, 1, 2).is_saturated());
    }

    #[test]
    fn snapshot_totals() {
        let snapshot = PoolSnapshot {
            account_id: "a".into(),
            channels: vec![stats(2, 1, 2), stats(1, 0, 2)],
        };
        assert_eq!(snapshot.pending(), 3);
        assert_eq!(snapshot.running(), 1);
        assert!(!snapshot.is_saturated());
        assert!(!PoolSnapshot::default().is_saturated());
    }
}
