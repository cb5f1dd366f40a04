// Exponential backoff with additive, bounded jitter
use std::time::Duration;

use rand::Rng;

use crate::retry::constants::{
    DEFAULT_BASE_DELAY, DEFAULT_JITTER_FRACTION, DEFAULT_MAX_DELAY, DEFAULT_MAX_RETRIES,
    DEFAULT_MULTIPLIER, MAX_BACKOFF_EXPONENT, MAX_MAX_RETRIES,
};
use crate::retry::error::{RetryError, RetryResult};

/// Backoff schedule for retrying a failed operation.
///
/// The delay before retry `n` (zero-based) is
/// `min(base * multiplier^n, max_delay)` plus a random amount in
/// `[0, jitter_fraction * that delay]`. Jitter is only ever added, so a
/// schedule never waits less than its deterministic floor.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffStrategy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter_fraction: f64,
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            jitter_fraction: DEFAULT_JITTER_FRACTION,
        }
    }
}

impl BackoffStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a custom strategy with validation
    pub fn custom(
        max_retries: u32,
        base_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
    ) -> RetryResult<Self> {
        if base_delay > max_delay {
            return Err(RetryError::config(format!(
                "base_delay ({base_delay:?}) cannot be greater than max_delay ({max_delay:?})"
            )));
        }

        Self { base_delay, max_delay, ..Self::default() }
            .with_max_retries(max_retries)?
            .with_multiplier(multiplier)
    }

    /// Set the number of retries allowed after the first attempt
    pub fn with_max_retries(mut self, retries: u32) -> RetryResult<Self> {
        if retries > MAX_MAX_RETRIES {
            return Err(RetryError::config(format!(
                "max_retries must be at most {MAX_MAX_RETRIES}, got {retries}"
            )));
        }
        self.max_retries = retries;
        Ok(self)
    }

    /// Set the base delay for exponential backoff
    pub fn with_base_delay(mut self, delay: Duration) -> RetryResult<Self> {
        if delay > self.max_delay {
            return Err(RetryError::config(format!(
                "base_delay ({delay:?}) cannot be greater than max_delay ({:?})",
                self.max_delay
            )));
        }
        self.base_delay = delay;
        Ok(self)
    }

    /// Set the maximum delay cap
    pub fn with_max_delay(mut self, delay: Duration) -> RetryResult<Self> {
        if delay < self.base_delay {
            return Err(RetryError::config(format!(
                "max_delay ({delay:?}) cannot be less than base_delay ({:?})",
                self.base_delay
            )));
        }
        self.max_delay = delay;
        Ok(self)
    }

    /// Set the growth factor between consecutive delays
    pub fn with_multiplier(mut self, multiplier: f64) -> RetryResult<Self> {
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(RetryError::config(format!(
                "multiplier must be a finite value >= 1.0, got {multiplier}"
            )));
        }
        self.multiplier = multiplier;
        Ok(self)
    }

    /// Set the jitter fraction, clamped to [0, 1]
    pub fn with_jitter_fraction(mut self, fraction: f64) -> Self {
        self.jitter_fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Whether another retry is allowed after `retries_done` retries
    pub fn should_retry(&self, retries_done: u32) -> bool {
        retries_done < self.max_retries
    }

    /// Deterministic part of the delay before retry `attempt` (zero-based)
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(MAX_BACKOFF_EXPONENT);
        let base_millis = self.base_delay.as_millis() as f64;
        let max_millis = self.max_delay.as_millis() as f64;

        // powi saturates to infinity rather than overflowing; min() then caps it
        let delay_millis = (base_millis * self.multiplier.powi(exponent as i32)).min(max_millis);

        Duration::from_millis(delay_millis as u64)
    }

    /// Delay before retry `attempt` (zero-based), jitter included
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.apply_jitter(self.base_delay_for(attempt))
    }

    /// Add random jitter in [0, jitter_fraction * delay]
    fn apply_jitter(&self, delay: Duration) -> Duration {
        if self.jitter_fraction == 0.0 || delay.is_zero() {
            return delay;
        }

        let delay_millis = delay.as_millis() as f64;
        let jitter_range = delay_millis * self.jitter_fraction;
        let jitter = rand::thread_rng().gen_range(0.0..=jitter_range);

        delay + Duration::from_millis(jitter as u64)
    }
}
