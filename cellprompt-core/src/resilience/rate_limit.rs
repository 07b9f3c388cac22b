//! Rate limiting and concurrency limiting
//!
//! [`TokenBucket`] is the outer gate in front of every dispatch;
//! [`ConcurrencyLimiter`] caps in-flight HTTP calls per provider. Both queue
//! callers up to a bounded limit and reject beyond it.

use crate::providers::{ProviderError, ProviderResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Token bucket configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Maximum tokens held by the bucket
    #[serde(default = "default_capacity")]
    pub capacity: u32,

    /// Refill period in milliseconds
    #[serde(default = "default_refill_period")]
    pub refill_period_ms: u64,

    /// Tokens added every refill period
    #[serde(default = "default_tokens_per_period")]
    pub tokens_per_period: u32,

    /// Callers allowed to wait for a token before new ones are rejected
    #[serde(default = "default_queue_limit")]
    pub queue_limit: usize,
}

fn default_capacity() -> u32 { 60 }
fn default_refill_period() -> u64 { 1_000 }
fn default_tokens_per_period() -> u32 { 10 }
fn default_queue_limit() -> usize { 1_000 }
fn default_max_concurrent() -> usize { 8 }

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_period_ms: default_refill_period(),
            tokens_per_period: default_tokens_per_period(),
            queue_limit: default_queue_limit(),
        }
    }
}

/// Concurrency limiter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConcurrencyConfig {
    /// Maximum simultaneous in-flight calls
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Callers allowed to wait for a slot before new ones are rejected
    #[serde(default = "default_queue_limit")]
    pub queue_limit: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            queue_limit: default_queue_limit(),
        }
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: u32,
    last_refill: Instant,
}

/// Decrements a waiter count when a queued caller leaves the queue
struct QueueSlot<'a>(&'a AtomicUsize);

impl<'a> QueueSlot<'a> {
    fn enter(counter: &'a AtomicUsize, limit: usize) -> Option<Self> {
        let previous = counter.fetch_add(1, Ordering::SeqCst);
        if previous >= limit {
            counter.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        Some(Self(counter))
    }
}

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Token bucket rate limiter with a bounded wait queue
#[derive(Debug)]
pub struct TokenBucket {
    config: RateLimitConfig,
    state: Mutex<BucketState>,
    waiting: AtomicUsize,
}

impl TokenBucket {
    /// Create a full bucket
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: config.capacity,
                last_refill: Instant::now(),
            }),
            config,
            waiting: AtomicUsize::new(0),
        }
    }

    fn refill_period(&self) -> Duration {
        Duration::from_millis(self.config.refill_period_ms.max(1))
    }

    /// Take a token without waiting; on failure returns the time until the next refill
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let period = self.refill_period();
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let periods = elapsed_periods(state.last_refill.elapsed(), period);
        if periods > 0 {
            let added = periods.saturating_mul(self.config.tokens_per_period);
            state.tokens = state.tokens.saturating_add(added).min(self.config.capacity);
            state.last_refill = period
                .checked_mul(periods)
                .and_then(|advance| state.last_refill.checked_add(advance))
                .unwrap_or_else(Instant::now);
        }

        if state.tokens > 0 {
            state.tokens -= 1;
            Ok(())
        } else {
            Err(period.saturating_sub(state.last_refill.elapsed()))
        }
    }

    /// Take a token, waiting in the bounded queue when the bucket is empty
    pub async fn acquire(&self, cancel: &CancellationToken) -> ProviderResult<()> {
        let mut wait = match self.try_acquire() {
            Ok(()) => return Ok(()),
            Err(wait) => wait,
        };

        let _slot = QueueSlot::enter(&self.waiting, self.config.queue_limit)
            .ok_or(ProviderError::RateLimitRejected)?;
        debug!("Rate limiter exhausted, queueing for {:?}", wait);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                _ = tokio::time::sleep(wait.max(Duration::from_millis(1))) => {}
            }
            match self.try_acquire() {
                Ok(()) => return Ok(()),
                Err(next) => wait = next,
            }
        }
    }

    /// Tokens currently available
    pub fn available(&self) -> u32 {
        self.state
            .lock()
            .map(|state| state.tokens)
            .unwrap_or_default()
    }
}

/// Bounded concurrency limiter with a bounded wait queue
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    waiting: Arc<AtomicUsize>,
    queue_limit: usize,
}

impl ConcurrencyLimiter {
    /// Create a limiter
    pub fn new(config: &ConcurrencyConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            waiting: Arc::new(AtomicUsize::new(0)),
            queue_limit: config.queue_limit,
        }
    }

    /// Acquire an execution slot; the slot is released when the permit drops
    pub async fn acquire(&self, cancel: &CancellationToken) -> ProviderResult<OwnedSemaphorePermit> {
        if let Ok(permit) = self.semaphore.clone().try_acquire_owned() {
            return Ok(permit);
        }

        let _slot = QueueSlot::enter(&self.waiting, self.queue_limit)
            .ok_or(ProviderError::BulkheadRejected)?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProviderError::Cancelled),
            permit = self.semaphore.clone().acquire_owned() => {
                permit.map_err(|_| ProviderError::BulkheadRejected)
            }
        }
    }

    /// Free slots right now
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// Whole refill periods in `elapsed`, saturating after a long idle spell
fn elapsed_periods(elapsed: Duration, period: Duration) -> u32 {
    u32::try_from(elapsed.as_nanos() / period.as_nanos()).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_periods_saturate() {
        let period = Duration::from_millis(1);
        assert_eq!(elapsed_periods(Duration::from_millis(2_500), period), 2_500);
        assert_eq!(elapsed_periods(Duration::from_secs(10_000_000), period), u32::MAX);
    }

    fn bucket(capacity: u32, queue_limit: usize) -> TokenBucket {
        TokenBucket::new(RateLimitConfig {
            capacity,
            refill_period_ms: 60_000,
            tokens_per_period: 1,
            queue_limit,
        })
    }

    #[test]
    fn test_bucket_drains() {
        let bucket = bucket(2, 0);
        assert!(bucket.try_acquire().is_ok());
        assert!(bucket.try_acquire().is_ok());
        assert!(bucket.try_acquire().is_err());
        assert_eq!(bucket.available(), 0);
    }

    #[tokio::test]
    async fn test_bucket_rejects_when_queue_full() {
        let bucket = bucket(1, 0);
        let cancel = CancellationToken::new();

        bucket.acquire(&cancel).await.unwrap();
        let result = bucket.acquire(&cancel).await;
        assert!(matches!(result, Err(ProviderError::RateLimitRejected)));
    }

    #[tokio::test]
    async fn test_bucket_wait_is_cancellable() {
        let bucket = bucket(1, 10);
        let cancel = CancellationToken::new();
        bucket.acquire(&cancel).await.unwrap();

        cancel.cancel();
        let result = bucket.acquire(&cancel).await;
        assert!(matches!(result, Err(ProviderError::Cancelled)));
    }

    #[tokio::test]
    async fn test_bucket_refills() {
        let bucket = TokenBucket::new(RateLimitConfig {
            capacity: 1,
            refill_period_ms: 20,
            tokens_per_period: 1,
            queue_limit: 10,
        });
        let cancel = CancellationToken::new();

        bucket.acquire(&cancel).await.unwrap();
        let started = Instant::now();
        bucket.acquire(&cancel).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_concurrency_limiter_bounds_in_flight() {
        let limiter = ConcurrencyLimiter::new(&ConcurrencyConfig {
            max_concurrent: 1,
            queue_limit: 0,
        });
        let cancel = CancellationToken::new();

        let permit = limiter.acquire(&cancel).await.unwrap();
        assert_eq!(limiter.available(), 0);
        assert!(matches!(
            limiter.acquire(&cancel).await,
            Err(ProviderError::BulkheadRejected)
        ));

        drop(permit);
        assert!(limiter.acquire(&cancel).await.is_ok());
    }

    #[tokio::test]
    async fn test_queued_waiter_resumes_on_release() {
        let limiter = ConcurrencyLimiter::new(&ConcurrencyConfig {
            max_concurrent: 1,
            queue_limit: 1,
        });
        let cancel = CancellationToken::new();

        let permit = limiter.acquire(&cancel).await.unwrap();
        let mut waiter = tokio_test::task::spawn(limiter.acquire(&cancel));
        tokio_test::assert_pending!(waiter.poll());

        drop(permit);
        assert!(waiter.is_woken());
        tokio_test::assert_ready_ok!(waiter.poll());
    }
}
