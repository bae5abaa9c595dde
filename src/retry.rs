//! Bounded exponential backoff with jitter for instance API calls.

use std::time::Duration;

use log::warn;
use rand::Rng;

use crate::config::HttpConfig;

/// Outcome of a single attempt that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// Network failure, timeout, 429 or 5xx. Worth another attempt.
    Transient(String),
    /// Anything else (401, 404, undecodable body). Retrying cannot help.
    Permanent(String),
}

impl AttemptError {
    fn message(&self) -> &str {
        match self {
            AttemptError::Transient(message) | AttemptError::Permanent(message) => message,
        }
    }
}

/// Retry schedule applied to every HTTP call of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Extra random delay as a fraction of the computed delay (0.0-1.0).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter_factor: 0.3,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(http: &HttpConfig) -> Self {
        Self {
            max_attempts: http.retry_attempts.max(1),
            initial_delay: Duration::from_millis(http.retry_initial_delay_ms),
            max_delay: Duration::from_millis(http.retry_max_delay_ms),
            ..Self::default()
        }
    }

    /// Policy that never waits between attempts.
    #[cfg(test)]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter_factor: 0.0,
        }
    }

    /// Delay before retry number `attempt` (1-based), capped at `max_delay`
    /// before jitter is added.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let multiplier = 2_u32.saturating_pow(attempt.saturating_sub(1));
        let capped_delay = self.initial_delay.saturating_mul(multiplier).min(self.max_delay);
        if self.jitter_factor <= 0.0 || capped_delay.is_zero() {
            return capped_delay;
        }
        let jitter = rand::rng().random_range(0.0..self.jitter_factor);
        capped_delay + Duration::from_secs_f64(capped_delay.as_secs_f64() * jitter)
    }

    /// Runs `attempt` until it succeeds, fails permanently, or the attempt
    /// budget is spent. Blocks the caller while backing off.
    pub fn run<T, F>(&self, operation: &str, mut attempt: F) -> Result<T, String>
    where
        F: FnMut() -> Result<T, AttemptError>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt_number = 1;
        loop {
            match attempt() {
                Ok(value) => return Ok(value),
                Err(AttemptError::Permanent(message)) => return Err(message),
                Err(err) if attempt_number >= max_attempts => {
                    return Err(format!(
                        "{} (gave up after {max_attempts} attempts)",
                        err.message()
                    ));
                }
                Err(err) => {
                    let delay = self.calculate_delay(attempt_number);
                    warn!(
                        "{operation} failed (attempt {attempt_number}/{max_attempts}): {}. \
                         Retrying in {}ms",
                        err.message(),
                        delay.as_millis()
                    );
                    std::thread::sleep(delay);
                    attempt_number += 1;
                }
            }
        }
    }
}
