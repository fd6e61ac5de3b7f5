//! Reconnect backoff for the sensor source
//!
//! delay = min(initial * multiplier^attempt, max) * (1 ± jitter)

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// `None` retries forever
    pub max_attempts: Option<u32>,

    pub initial_delay_ms: u64,

    pub max_delay_ms: u64,

    pub backoff_multiplier: f32,

    /// Fraction of the delay added or removed at random
    pub jitter_factor: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            initial_delay_ms: 1000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `attempt` (0-indexed)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(31) as i32;
        let base_delay = self.initial_delay_ms as f64 * (self.backoff_multiplier as f64).powi(exponent);
        let capped_delay = base_delay.min(self.max_delay_ms as f64);

        let jitter_range = capped_delay * self.jitter_factor as f64;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        let final_delay = (capped_delay + jitter).max(0.0);

        Duration::from_millis(final_delay as u64)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }
}
