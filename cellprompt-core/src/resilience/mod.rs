//! Resilience policy applied to every provider call
//!
//! The rate limiter gates whole dispatches; everything else is applied per
//! HTTP attempt by [`ResiliencePipeline`].

mod circuit_breaker;
mod pipeline;
mod rate_limit;
mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use pipeline::ResiliencePipeline;
pub use rate_limit::{ConcurrencyConfig, ConcurrencyLimiter, RateLimitConfig, TokenBucket};
pub use retry::RetryPolicy;

use serde::{Deserialize, Serialize};

/// Full resilience configuration for a client or a single provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResilienceConfiguration {
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub concurrency: ConcurrencyConfig,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Timeout for a single HTTP attempt (milliseconds)
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_ms: u64,
}

fn default_attempt_timeout() -> u64 {
    120_000
}

impl Default for ResilienceConfiguration {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            retry: RetryPolicy::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            attempt_timeout_ms: default_attempt_timeout(),
        }
    }
}

impl ResilienceConfiguration {
    /// Validate every nested policy
    pub fn validate(&self, path: &str) -> Result<(), crate::config::ValidationError> {
        use crate::config::ValidationError;

        self.retry.validate(&format!("{}.retry", path))?;

        if self.rate_limit.capacity == 0 || self.rate_limit.tokens_per_period == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.rate_limit", path),
                "capacity and tokens_per_period must be positive",
            ));
        }
        if self.rate_limit.refill_period_ms == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.rate_limit.refill_period_ms", path),
                "Must be positive",
            ));
        }
        if self.concurrency.max_concurrent == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.concurrency.max_concurrent", path),
                "Must be positive",
            ));
        }
        if !(0.0..=1.0).contains(&self.circuit_breaker.failure_ratio) {
            return Err(ValidationError::out_of_range(
                format!("{}.circuit_breaker.failure_ratio", path),
                "Must be between 0.0 and 1.0",
            ));
        }
        if self.attempt_timeout_ms == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.attempt_timeout_ms", path),
                "Must be positive",
            ));
        }
        Ok(())
    }
}
