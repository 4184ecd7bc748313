// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Heartbeat bookkeeping for one connection.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

/// Tracks the heartbeat cadence and whether the last beat was acked.
///
/// A beat that is still unacked when the next one falls due marks the
/// connection as a zombie.
#[derive(Debug)]
pub struct Heartbeat {
    interval: Duration,
    next_due: Instant,
    awaiting_ack: bool,
    last_sent: Option<Instant>,
    latency: Option<Duration>,
}

/// The previous heartbeat was never acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zombie;

impl Heartbeat {
    /// Start the cadence with a jittered first beat in `[0, interval)`.
    pub fn start(interval: Duration) -> Self {
        let jitter = rand::thread_rng().gen_range(0.0..1.0);
        Self::with_first_delay(interval, interval.mul_f64(jitter))
    }

    pub fn with_first_delay(interval: Duration, first: Duration) -> Self {
        Self {
            interval,
            next_due: Instant::now() + first,
            awaiting_ack: false,
            last_sent: None,
            latency: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn next_due(&self) -> Instant {
        self.next_due
    }

    /// Called when the timer fires. Schedules the next beat and reports a
    /// zombie if the previous one is still unacked.
    pub fn on_due(&mut self) -> Result<(), Zombie> {
        if self.awaiting_ack {
            return Err(Zombie);
        }
        self.record_sent();
        self.next_due = Instant::now() + self.interval;
        Ok(())
    }

    /// Server asked for an immediate beat (op 1). Does not move the cadence.
    pub fn record_sent(&mut self) {
        self.awaiting_ack = true;
        self.last_sent = Some(Instant::now());
    }

    pub fn ack(&mut self) {
        self.awaiting_ack = false;
        if let Some(sent) = self.last_sent {
            self.latency = Some(sent.elapsed());
        }
    }

    pub fn awaiting_ack(&self) -> bool {
        self.awaiting_ack
    }

    /// Round trip of the most recent acked beat.
    pub fn latency(&self) -> Option<Duration> {
        self.latency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn unacked_beat_is_a_zombie_at_next_tick() {
        let interval = Duration::from_millis(41_250);
        let mut hb = Heartbeat::with_first_delay(interval, Duration::ZERO);

        assert!(hb.on_due().is_ok());
        assert!(hb.awaiting_ack());
        tokio::time::advance(interval).await;
        assert_eq!(hb.on_due(), Err(Zombie));
    }

    #[tokio::test(start_paused = true)]
    async fn ack_clears_and_records_latency() {
        let mut hb = Heartbeat::with_first_delay(Duration::from_secs(10), Duration::ZERO);
        hb.on_due().unwrap();
        tokio::time::advance(Duration::from_millis(80)).await;
        hb.ack();

        assert!(!hb.awaiting_ack());
        assert_eq!(hb.latency(), Some(Duration::from_millis(80)));
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(hb.on_due().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn first_beat_is_jittered_within_interval() {
        let interval = Duration::from_secs(40);
        let start = Instant::now();
        for _ in 0..32 {
            let hb = Heartbeat::start(interval);
            assert!(hb.next_due() >= start);
            assert!(hb.next_due() < start + interval);
        }
    }
}
