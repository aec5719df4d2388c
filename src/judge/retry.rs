//! Exponential backoff as a transport-free state machine.
//!
//! The judge client feeds every failed attempt into [`Backoff::on_failure`]
//! and either sleeps for the returned delay or gives up.

use crate::config;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
    pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&config::Retry::default())
    }
}

impl From<&config::Retry> for RetryPolicy {
    fn from(cfg: &config::Retry) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            initial_delay: Duration::from_millis(cfg.initial_delay_ms),
            backoff_factor: cfg.backoff_factor.max(1.0),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
            jitter_fraction: cfg.jitter_fraction.clamp(0.0, 1.0),
        }
    }
}

impl RetryPolicy {
    /// A policy that retries `max_attempts` times with no sleeping.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::ZERO,
            backoff_factor: 1.0,
            max_delay: Duration::ZERO,
            jitter_fraction: 0.0,
        }
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32, hint: Option<Duration>) -> Duration {
        // A server-provided Retry-After wins, still bounded by max_delay.
        if let Some(hint) = hint {
            return hint.min(self.max_delay);
        }
        let base_ms = self.initial_delay.as_millis() as f64 * self.backoff_factor.powi(retry as i32);
        let capped_ms = base_ms.min(self.max_delay.as_millis() as f64);
        let final_ms = capped_ms * deterministic_jitter(retry, self.jitter_fraction);
        Duration::from_millis(final_ms.max(0.0) as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Retry(Duration),
    GiveUp,
}

#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Records one failed attempt and decides what happens next.
    pub fn on_failure(&mut self, retriable: bool, hint: Option<Duration>) -> Step {
        self.attempts += 1;
        if !retriable || self.attempts >= self.policy.max_attempts {
            return Step::GiveUp;
        }
        Step::Retry(self.policy.delay_for(self.attempts - 1, hint))
    }
}

/// Multiplier in `[1 - fraction, 1 + fraction]`, reproducible per attempt.
fn deterministic_jitter(attempt: u32, fraction: f64) -> f64 {
    let hash = attempt.wrapping_mul(2_654_435_761) as f64 / u32::MAX as f64;
    1.0 + fraction * (2.0 * hash - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_in_range() {
        for attempt in 0..32 {
            let j = deterministic_jitter(attempt, 0.2);
            assert!((0.8..=1.2).contains(&j), "attempt {attempt}: {j}");
        }
    }

    #[test]
    fn jitter_is_reproducible() {
        assert_eq!(deterministic_jitter(7, 0.2), deterministic_jitter(7, 0.2));
    }

    #[test]
    fn zero_fraction_means_no_jitter() {
        assert_eq!(deterministic_jitter(3, 0.0), 1.0);
    }
}
