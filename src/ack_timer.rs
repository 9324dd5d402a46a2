//! A reusable exponential-backoff retry timer.
//!
//! Grounded on `original_source/`'s `AckTimer.hpp`, which both the
//! NOTIFY sender and the replication primary's per-follower keepalive
//! use to decide when to give up waiting for an acknowledgment and
//! retry (or drop the peer). This port keeps the same doubling-with-cap
//! shape but is pure state (no timer-thread registration); callers
//! drive it from their own `tokio::time::sleep`/`interval` loop.
//!
//! Exhaustion is bounded by wall-clock deadline rather than attempt
//! count, per RFC 1996's retry guidance: a peer that's unreachable for
//! `deadline` is given up on regardless of how the backoff happened to
//! divide up that time.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AckTimerConfig {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub deadline: Duration,
}

impl Default for AckTimerConfig {
    fn default() -> Self {
        AckTimerConfig {
            initial_backoff: Duration::from_secs(6),
            max_backoff: Duration::from_secs(60),
            deadline: Duration::from_secs(120),
        }
    }
}

/// Tracks retry attempts for one outstanding ack. `next_backoff` is
/// called once per failed attempt; `reset` on success.
#[derive(Debug)]
pub struct AckTimer {
    config: AckTimerConfig,
    attempt: u32,
    elapsed: Duration,
}

impl AckTimer {
    pub fn new(config: AckTimerConfig) -> Self {
        AckTimer { config, attempt: 0, elapsed: Duration::ZERO }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn exhausted(&self) -> bool {
        self.elapsed >= self.config.deadline
    }

    /// The delay before the next retry, doubling each call and capped at
    /// `max_backoff`. Returns `None` once that delay would push the
    /// cumulative wait past `deadline`; the caller should give up on the
    /// peer at that point.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        let multiplier = 1u32.checked_shl(self.attempt).unwrap_or(u32::MAX);
        let delay = self.config.initial_backoff.saturating_mul(multiplier).min(self.config.max_backoff);
        if self.elapsed + delay > self.config.deadline {
            return None;
        }
        self.elapsed += delay;
        self.attempt += 1;
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
        self.elapsed = Duration::ZERO;
    }
}
