//! Retry policy with exponential backoff and jitter
//!
//! The policy decides *whether* and *when* to retry; the loop that actually
//! re-issues calls lives in [`super::pipeline::ResiliencePipeline`].

use crate::providers::ProviderError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (not including the initial attempt)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial delay before first retry (milliseconds)
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries (milliseconds)
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Base for exponential backoff (e.g., 2.0 for doubling)
    #[serde(default = "default_exponential_base")]
    pub exponential_base: f64,

    /// Randomize delays
    #[serde(default = "default_true")]
    pub jitter: bool,

    /// Jitter factor (0.0 to 1.0) applied when `jitter` is on
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,

    /// Whether to respect retry-after hints from the provider
    #[serde(default = "default_true")]
    pub respect_retry_after: bool,

    /// Maximum total time to spend retrying (milliseconds)
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_delay() -> u64 { 100 }
fn default_max_delay() -> u64 { 10_000 }
fn default_exponential_base() -> f64 { 2.0 }
fn default_jitter_factor() -> f64 { 0.1 }
fn default_true() -> bool { true }

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            exponential_base: default_exponential_base(),
            jitter: true,
            jitter_factor: default_jitter_factor(),
            respect_retry_after: true,
            timeout_ms: None,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with custom retry count
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given retry attempt (0-based)
    pub fn calculate_delay(&self, attempt: u32, error: &ProviderError) -> Duration {
        if self.respect_retry_after {
            if let Some(retry_after) = error.retry_after() {
                return retry_after.min(Duration::from_millis(self.max_delay_ms));
            }
        }

        let base_delay = self.initial_delay_ms as f64 * self.exponential_base.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_delay_ms as f64);

        let delay_with_jitter = if self.jitter && self.jitter_factor > 0.0 {
            let mut rng = rand::thread_rng();
            let jitter_range = capped_delay * self.jitter_factor;
            let jitter = rng.gen_range(-jitter_range..=jitter_range);
            (capped_delay + jitter).max(0.0)
        } else {
            capped_delay
        };

        Duration::from_millis(delay_with_jitter as u64)
    }

    /// Check if we should retry based on the error and attempt count
    pub fn should_retry(&self, error: &ProviderError, attempt: u32) -> bool {
        if attempt >= self.max_retries {
            return false;
        }

        error.is_retryable()
    }

    /// Validate retry policy
    pub fn validate(&self, path: &str) -> Result<(), crate::config::ValidationError> {
        use crate::config::ValidationError;

        if self.max_delay_ms < self.initial_delay_ms {
            return Err(ValidationError::incompatible(
                format!("{}.max_delay_ms", path),
                "Must be >= initial_delay_ms",
            ));
        }

        if self.exponential_base < 1.0 {
            return Err(ValidationError::out_of_range(
                format!("{}.exponential_base", path),
                "Must be at least 1.0",
            ));
        }

        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ValidationError::out_of_range(
                format!("{}.jitter_factor", path),
                "Must be between 0.0 and 1.0",
            ));
        }

        Ok(())
    }
}
