// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry backoff policy.
//!
//! Delay before attempt `k+1` is `base · factor^(k−1) · (1 + roll · jitter)`
//! where `roll` is uniform in `[-1, 1]`, clamped to at least 100ms. The roll
//! is supplied by the caller so the policy itself stays deterministic.

use std::time::Duration;

/// Minimum inter-attempt delay after jitter.
pub const MIN_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_factor: f64,
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            jitter_factor: 0.5,
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep after failed attempt `attempt` (1-based) before the
    /// next one. `roll` must be uniform in `[-1, 1]`.
    pub fn delay_after(&self, attempt: u32, roll: f64) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let base = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let jittered = base * (1.0 + roll.clamp(-1.0, 1.0) * self.jitter_factor);
        let floor = MIN_RETRY_DELAY.as_secs_f64();
        Duration::from_secs_f64(jittered.max(floor))
    }

    /// Inclusive bounds of the possible delay after `attempt`.
    pub fn delay_bounds(&self, attempt: u32) -> (Duration, Duration) {
        (self.delay_after(attempt, -1.0), self.delay_after(attempt, 1.0))
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
