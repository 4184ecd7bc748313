// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel selection policies.
//!
//! Every policy first honours a preferred channel (sticky routing) and then
//! chooses among the enabled channels whose queue still admits work. The
//! pool hands channels over ordered by id, so ties resolve the same way on
//! every call.

use std::sync::{Arc, Mutex};

use drover_config::SelectorKind;

use crate::channel::Channel;

/// Picks the channel a new job is routed to.
pub trait ChannelSelector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Choose among `candidates`, all enabled and queue-idle, ordered by id.
    fn pick(&self, candidates: &[Arc<Channel>]) -> Option<Arc<Channel>>;

    /// Called when the preferred channel takes the job instead of `pick`.
    fn preferred_taken(&self) {}

    /// Route to `preferred` when it can take work, otherwise apply the policy.
    fn select(&self, channels: &[Arc<Channel>], preferred: Option<&str>) -> Option<Arc<Channel>> {
        if let Some(id) = preferred
            && let Some(channel) = channels
                .iter()
                .find(|c| c.id() == id && c.is_enabled() && c.is_idle_queue())
        {
            self.preferred_taken();
            return Some(Arc::clone(channel));
        }

        let candidates: Vec<Arc<Channel>> = channels
            .iter()
            .filter(|c| c.is_enabled() && c.is_idle_queue())
            .cloned()
            .collect();
        if candidates.is_empty() {
            return None;
        }
        self.pick(&candidates)
    }
}

/// Build the selector for a configured policy.
pub fn selector_for(kind: SelectorKind) -> Arc<dyn ChannelSelector> {
    match kind {
        SelectorKind::Default => Arc::new(IdleFirstSelector),
        SelectorKind::RoundRobin => Arc::new(RoundRobinSelector::default()),
        SelectorKind::LeastLoad => Arc::new(LeastLoadSelector),
    }
}

/// Prefer a channel with nothing running (shortest queue among those),
/// else the shortest queue with the fewest running jobs.
#[derive(Debug, Default)]
pub struct IdleFirstSelector;

impl ChannelSelector for IdleFirstSelector {
    fn name(&self) -> &'static str {
        "default"
    }

    fn pick(&self, candidates: &[Arc<Channel>]) -> Option<Arc<Channel>> {
        let loads: Vec<(usize, usize)> = candidates
            .iter()
            .map(|c| (c.running_len(), c.pending_len()))
            .collect();

        let idle = loads
            .iter()
            .enumerate()
            .filter(|(_, (running, _))| *running == 0)
            .min_by_key(|(_, (_, pending))| *pending)
            .map(|(i, _)| i);

        let index = idle.or_else(|| {
            loads
                .iter()
                .enumerate()
                .min_by_key(|(_, (running, pending))| (*pending, *running))
                .map(|(i, _)| i)
        })?;
        candidates.get(index).cloned()
    }
}

/// Rotate over the candidates in id order. The index advances on every
/// selection, sticky ones included.
#[derive(Debug, Default)]
pub struct RoundRobinSelector {
    next: Mutex<usize>,
}

impl RoundRobinSelector {
    fn advance(&self) -> usize {
        let mut next = self.next.lock().unwrap_or_else(|p| p.into_inner());
        let current = *next;
        *next = next.wrapping_add(1);
        current
    }
}

impl ChannelSelector for RoundRobinSelector {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn pick(&self, candidates: &[Arc<Channel>]) -> Option<Arc<Channel>> {
        if candidates.is_empty() {
            return None;
        }
        let index = self.advance() % candidates.len();
        candidates.get(index).cloned()
    }

    fn preferred_taken(&self) {
        self.advance();
    }
}

/// Lowest `running + 0.5 * pending` wins.
#[derive(Debug, Default)]
pub struct LeastLoadSelector;

impl LeastLoadSelector {
    fn score(channel: &Channel) -> f64 {
        channel.running_len() as f64 + 0.5 * channel.pending_len() as f64
    }
}

impl ChannelSelector for LeastLoadSelector {
    fn name(&self) -> &'static str {
        "least_load"
    }

    fn pick(&self, candidates: &[Arc<Channel>]) -> Option<Arc<Channel>> {
        candidates
            .iter()
            .map(|c| (Self::score(c), c))
            .min_by(|(a, _), (b, _)| a.total_cmp(b))
            .map(|(_, c)| Arc::clone(c))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use drover_core::{Job, JobAction, SubmitResult, submit_fn};
    use drover_test_utils::RecordingJobSink;

    use super::*;
    use crate::channel::ChannelSettings;

    fn channel(id: &str, queue_capacity: usize) -> Arc<Channel> {
        Arc::new(Channel::new(
            ChannelSettings {
                id: id.into(),
                account_id: "acct".into(),
                guild_id: "guild".into(),
                queue_capacity,
                max_concurrency: 1,
            },
            Arc::new(RecordingJobSink::default()),
        ))
    }

    fn fill(channel: &Channel, pending: usize) {
        for i in 0..pending {
            let job = Arc::new(Job::new(format!("{}-{i}", channel.id()), JobAction::Imagine));
            channel
                .enqueue(job, submit_fn(|| async { SubmitResult::success() }))
                .unwrap();
        }
    }

    fn start_one(channel: &Channel) {
        assert!(channel.gate().try_acquire());
        channel.dequeue_into_running().unwrap();
    }

    #[test]
    fn preferred_channel_wins_when_it_has_room() {
        let channels = vec![channel("a", 0), channel("b", 0)];
        fill(&channels[1], 3);
        let chosen = IdleFirstSelector.select(&channels, Some("b")).unwrap();
        assert_eq!(chosen.id(), "b");
    }

    #[test]
    fn full_preferred_channel_falls_through_to_policy() {
        let channels = vec![channel("a", 1), channel("b", 1)];
        fill(&channels[1], 1);
        let chosen = IdleFirstSelector.select(&channels, Some("b")).unwrap();
        assert_eq!(chosen.id(), "a");
    }

    #[test]
    fn default_prefers_zero_running_over_shorter_queue() {
        let channels = vec![channel("busy", 0), channel("quiet", 0)];
        // busy: one running, empty queue. quiet: nothing running, two queued.
        fill(&channels[0], 1);
        start_one(&channels[0]);
        fill(&channels[1], 2);

        let chosen = IdleFirstSelector.select(&channels, None).unwrap();
        assert_eq!(chosen.id(), "quiet");
    }

    #[test]
    fn default_uses_shortest_queue_when_all_busy() {
        let channels = vec![channel("a", 0), channel("b", 0)];
        for (c, queued) in channels.iter().zip([3, 1]) {
            fill(c, queued + 1);
            start_one(c);
        }
        let chosen = IdleFirstSelector.select(&channels, None).unwrap();
        assert_eq!(chosen.id(), "b");
    }

    #[test]
    fn round_robin_visits_each_channel_once_per_cycle() {
        let channels: Vec<_> = ["a", "b", "c", "d"].iter().map(|id| channel(id, 0)).collect();
        let selector = RoundRobinSelector::default();
        let visited: HashSet<String> = (0..channels.len())
            .map(|_| selector.select(&channels, None).unwrap().id().to_string())
            .collect();
        assert_eq!(visited.len(), channels.len());
    }

    #[test]
    fn round_robin_rotation_counts_sticky_selections() {
        let channels = vec![channel("a", 0), channel("b", 0), channel("c", 0)];
        let selector = RoundRobinSelector::default();
        assert_eq!(selector.select(&channels, None).unwrap().id(), "a");
        assert_eq!(selector.select(&channels, Some("a")).unwrap().id(), "a");
        assert_eq!(selector.select(&channels, None).unwrap().id(), "c");
    }

    #[test]
    fn least_load_scores_running_over_pending() {
        let channels = vec![channel("a", 0), channel("b", 0)];
        // a: 1 running + 0 pending = 1.0; b: 0 running + 3 pending = 1.5
        fill(&channels[0], 1);
        start_one(&channels[0]);
        fill(&channels[1], 3);
        assert_eq!(LeastLoadSelector.select(&channels, None).unwrap().id(), "a");
    }

    #[test]
    fn nothing_idle_selects_nothing() {
        let channels = vec![channel("a", 1)];
        fill(&channels[0], 1);
        assert!(IdleFirstSelector.select(&channels, None).is_none());
        assert!(LeastLoadSelector.select(&channels, None).is_none());
        assert!(RoundRobinSelector::default().select(&channels, None).is_none());
    }

    #[test]
    fn selector_for_maps_kinds() {
        assert_eq!(selector_for(SelectorKind::Default).name(), "default");
        assert_eq!(selector_for(SelectorKind::RoundRobin).name(), "round_robin");
        assert_eq!(selector_for(SelectorKind::LeastLoad).name(), "least_load");
    }
}
