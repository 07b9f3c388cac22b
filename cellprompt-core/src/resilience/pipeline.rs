//! Per-provider resilience pipeline
//!
//! Composes, from the outside in: concurrency limiter, retry loop, circuit
//! breaker check, per-attempt timeout. Every wait races the caller's
//! cancellation token.

use super::circuit_breaker::CircuitBreaker;
use super::rate_limit::ConcurrencyLimiter;
use super::retry::RetryPolicy;
use super::ResilienceConfiguration;
use crate::providers::{ProviderError, ProviderResult};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Wraps provider calls with the configured resilience strategies
#[derive(Debug)]
pub struct ResiliencePipeline {
    name: String,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
    concurrency: ConcurrencyLimiter,
    attempt_timeout: Duration,
}

impl ResiliencePipeline {
    /// Build a pipeline for the named provider
    pub fn new(name: impl Into<String>, config: &ResilienceConfiguration) -> Self {
        let name = name.into();
        Self {
            breaker: CircuitBreaker::new(name.clone(), config.circuit_breaker.clone()),
            concurrency: ConcurrencyLimiter::new(&config.concurrency),
            retry: config.retry.clone(),
            attempt_timeout: Duration::from_millis(config.attempt_timeout_ms),
            name,
        }
    }

    /// Circuit breaker guarding this pipeline
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Run `operation` until it succeeds, fails terminally, or is cancelled
    ///
    /// `operation` is invoked once per attempt, so at most
    /// `max_retries + 1` times.
    pub async fn execute<F, Fut, T>(&self, cancel: &CancellationToken, operation: F) -> ProviderResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        self.execute_with_timeout(cancel, self.attempt_timeout, operation)
            .await
    }

    /// [`execute`](Self::execute) with a per-attempt timeout other than the configured one
    pub async fn execute_with_timeout<F, Fut, T>(
        &self,
        cancel: &CancellationToken,
        attempt_timeout: Duration,
        mut operation: F,
    ) -> ProviderResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let _permit = self.concurrency.acquire(cancel).await?;

        let started = Instant::now();
        let budget = self.retry.timeout_ms.map(Duration::from_millis);
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(ProviderError::Cancelled);
            }
            self.breaker.check()?;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ProviderError::Cancelled),
                outcome = tokio::time::timeout(attempt_timeout, operation()) => {
                    outcome.unwrap_or(Err(ProviderError::Timeout))
                }
            };

            let error = match result {
                Ok(value) => {
                    self.breaker.record(Ok(()));
                    if attempt > 0 {
                        debug!("{} succeeded after {} retries", self.name, attempt);
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };
            self.breaker.record(Err(&error));

            if !self.retry.should_retry(&error, attempt) {
                if attempt > 0 {
                    warn!("{} failed after {} retries: {}", self.name, attempt, error);
                }
                return Err(error);
            }

            let delay = self.retry.calculate_delay(attempt, &error);
            if let Some(budget) = budget {
                if started.elapsed() + delay > budget {
                    warn!("{} retry budget of {:?} exhausted: {}", self.name, budget, error);
                    return Err(error);
                }
            }

            warn!(
                "{} attempt {} failed: {}. Retrying in {:?}",
                self.name,
                attempt + 1,
                error,
                delay
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::CircuitBreakerConfig;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn config(max_retries: u32) -> ResilienceConfiguration {
        ResilienceConfiguration {
            retry: RetryPolicy {
                max_retries,
                initial_delay_ms: 1,
                max_delay_ms: 5,
                jitter: false,
                ..RetryPolicy::default()
            },
            circuit_breaker: CircuitBreakerConfig {
                enabled: false,
                ..CircuitBreakerConfig::default()
            },
            ..ResilienceConfiguration::default()
        }
    }

    #[tokio::test]
    async fn test_retries_bounded() {
        let pipeline = ResiliencePipeline::new("test", &config(3));
        let calls = Arc::new(AtomicU32::new(0));

        let result: ProviderResult<()> = pipeline
            .execute(&CancellationToken::new(), || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ProviderError::ServerError {
                        status_code: 503,
                        message: "busy".into(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(ProviderError::ServerError { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_fast() {
        let pipeline = ResiliencePipeline::new("test", &config(3));
        let calls = Arc::new(AtomicU32::new(0));

        let result: ProviderResult<()> = pipeline
            .execute(&CancellationToken::new(), || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ProviderError::InvalidRequest {
                        status_code: 400,
                        message: "bad".into(),
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let pipeline = ResiliencePipeline::new("test", &config(3));
        let calls = Arc::new(AtomicU32::new(0));

        let result = pipeline
            .execute(&CancellationToken::new(), || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(ProviderError::Timeout)
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_attempt_timeout_maps_to_timeout() {
        let pipeline = ResiliencePipeline::new(
            "test",
            &ResilienceConfiguration {
                attempt_timeout_ms: 10,
                ..config(0)
            },
        );

        let result: ProviderResult<()> = pipeline
            .execute(&CancellationToken::new(), || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(ProviderError::Timeout)));

        let result = pipeline
            .execute_with_timeout(&CancellationToken::new(), Duration::from_secs(1), || async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok("pulled")
            })
            .await;
        assert_eq!(result.unwrap(), "pulled");
    }

    #[tokio::test]
    async fn test_cancel_stops_retrying() {
        let pipeline = ResiliencePipeline::new(
            "test",
            &ResilienceConfiguration {
                retry: RetryPolicy {
                    max_retries: 10,
                    initial_delay_ms: 10_000,
                    max_delay_ms: 10_000,
                    jitter: false,
                    ..RetryPolicy::default()
                },
                ..config(10)
            },
        );
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result: ProviderResult<()> = pipeline
            .execute(&cancel, || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ProviderError::Timeout)
                }
            })
            .await;

        assert!(matches!(result, Err(ProviderError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_open_circuit_short_circuits() {
        let pipeline = ResiliencePipeline::new(
            "test",
            &ResilienceConfiguration {
                circuit_breaker: CircuitBreakerConfig {
                    enabled: true,
                    minimum_throughput: 1,
                    failure_ratio: 0.5,
                    break_duration_ms: 60_000,
                    ..CircuitBreakerConfig::default()
                },
                ..config(0)
            },
        );
        let cancel = CancellationToken::new();

        let _ = pipeline
            .execute(&cancel, || async { Err::<(), _>(ProviderError::Timeout) })
            .await;

        let calls = Arc::new(AtomicU32::new(0));
        let result: ProviderResult<()> = pipeline
            .execute(&cancel, || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        assert!(matches!(result, Err(ProviderError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
