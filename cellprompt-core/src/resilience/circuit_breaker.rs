//! Failure-ratio circuit breaker
//!
//! Outcomes are sampled over a sliding window. Once at least
//! `minimum_throughput` samples exist and the failure share reaches
//! `failure_ratio`, the circuit opens and rejects calls for
//! `break_duration_ms`. The first call after that is a half-open trial whose
//! outcome closes or re-opens the circuit.

use crate::providers::{ProviderError, ProviderResult};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CircuitBreakerConfig {
    /// Disable to let every call through
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Failure share (0.0 to 1.0) that opens the circuit
    #[serde(default = "default_failure_ratio")]
    pub failure_ratio: f64,

    /// Sliding sampling window in milliseconds
    #[serde(default = "default_sampling_window")]
    pub sampling_window_ms: u64,

    /// Samples required in the window before the ratio is evaluated
    #[serde(default = "default_minimum_throughput")]
    pub minimum_throughput: usize,

    /// How long the circuit stays open, in milliseconds
    #[serde(default = "default_break_duration")]
    pub break_duration_ms: u64,
}

fn default_true() -> bool { true }
fn default_failure_ratio() -> f64 { 0.5 }
fn default_sampling_window() -> u64 { 30_000 }
fn default_minimum_throughput() -> usize { 10 }
fn default_break_duration() -> u64 { 30_000 }

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_ratio: default_failure_ratio(),
            sampling_window_ms: default_sampling_window(),
            minimum_throughput: default_minimum_throughput(),
            break_duration_ms: default_break_duration(),
        }
    }
}

/// Observable circuit state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
enum State {
    Closed,
    Open { until: Instant },
    HalfOpen { trial_in_flight: bool },
}

#[derive(Debug)]
struct Inner {
    state: State,
    samples: VecDeque<(Instant, bool)>,
}

/// Circuit breaker guarding one provider
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a closed breaker
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: State::Closed,
                samples: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current state, promoting an expired open circuit to half-open
    pub fn state(&self) -> CircuitState {
        let inner = self.lock();
        match inner.state {
            State::Closed => CircuitState::Closed,
            State::Open { until } if Instant::now() >= until => CircuitState::HalfOpen,
            State::Open { .. } => CircuitState::Open,
            State::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    /// Ask permission to run one attempt
    pub fn check(&self) -> ProviderResult<()> {
        if !self.config.enabled {
            return Ok(());
        }

        let mut inner = self.lock();
        let now = Instant::now();
        match inner.state {
            State::Closed => Ok(()),
            State::Open { until } if now >= until => {
                info!("Circuit for {} half-open, allowing trial call", self.name);
                inner.state = State::HalfOpen {
                    trial_in_flight: true,
                };
                Ok(())
            }
            State::Open { until } => Err(ProviderError::CircuitOpen {
                provider: self.name.clone(),
                remaining: until - now,
            }),
            State::HalfOpen {
                trial_in_flight: true,
            } => Err(ProviderError::CircuitOpen {
                provider: self.name.clone(),
                remaining: Duration::ZERO,
            }),
            State::HalfOpen {
                trial_in_flight: false,
            } => {
                inner.state = State::HalfOpen {
                    trial_in_flight: true,
                };
                Ok(())
            }
        }
    }

    /// Record the outcome of an attempt admitted by [`check`](Self::check)
    pub fn record(&self, outcome: Result<(), &ProviderError>) {
        if !self.config.enabled {
            return;
        }
        match outcome {
            Err(ProviderError::Cancelled) => self.release_trial(),
            Err(error) if error.is_failure_for_breaker() => self.record_failure(),
            _ => self.record_success(),
        }
    }

    fn release_trial(&self) {
        let mut inner = self.lock();
        if let State::HalfOpen { .. } = inner.state {
            inner.state = State::HalfOpen {
                trial_in_flight: false,
            };
        }
    }

    fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            State::HalfOpen { .. } => {
                info!("Circuit for {} closed after successful trial", self.name);
                inner.state = State::Closed;
                inner.samples.clear();
            }
            _ => self.push_sample(&mut inner, true),
        }
    }

    fn record_failure(&self) {
        let mut inner = self.lock();
        let now = Instant::now();
        let break_duration = Duration::from_millis(self.config.break_duration_ms);

        if let State::HalfOpen { .. } = inner.state {
            warn!("Circuit for {} re-opened after failed trial", self.name);
            inner.state = State::Open {
                until: now + break_duration,
            };
            return;
        }

        self.push_sample(&mut inner, false);

        let total = inner.samples.len();
        let failures = inner.samples.iter().filter(|(_, ok)| !ok).count();
        if total >= self.config.minimum_throughput
            && failures as f64 / total as f64 >= self.config.failure_ratio
        {
            warn!(
                "Circuit for {} opened: {}/{} failures in window, breaking for {:?}",
                self.name, failures, total, break_duration
            );
            inner.state = State::Open {
                until: now + break_duration,
            };
            inner.samples.clear();
        }
    }

    fn push_sample(&self, inner: &mut Inner, success: bool) {
        let now = Instant::now();
        let window = Duration::from_millis(self.config.sampling_window_ms);
        inner.samples.push_back((now, success));
        while let Some((at, _)) = inner.samples.front() {
            if now.duration_since(*at) > window {
                inner.samples.pop_front();
            } else {
                break;
            }
        }
    }
}
