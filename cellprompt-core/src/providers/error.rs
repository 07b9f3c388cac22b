//! Provider error types and retry classification

use std::time::Duration;
use thiserror::Error;

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// 5xx statuses that are never retried: the server told us the request
/// itself cannot be served.
pub const NON_RETRYABLE_SERVER_STATUSES: &[u16] = &[501, 505];

/// Errors that can occur when interacting with model providers
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Rate limit exceeded at the provider (429)
    #[error("Rate limit exceeded{}", .retry_after.map(|d| format!(", retry after {:?}", d)).unwrap_or_default())]
    RateLimit { retry_after: Option<Duration> },

    /// Request or attempt timed out
    #[error("Request timeout")]
    Timeout,

    /// Server error (5xx)
    #[error("Server error ({status_code}): {message}")]
    ServerError { status_code: u16, message: String },

    /// Invalid request that should not be retried (4xx)
    #[error("Invalid request ({status_code}): {message}")]
    InvalidRequest { status_code: u16, message: String },

    /// Authentication failure (401/403), or no credentials to send
    #[error("Authentication failed{}: {message}", .status_code.map(|s| format!(" ({})", s)).unwrap_or_default())]
    AuthenticationError {
        status_code: Option<u16>,
        message: String,
    },

    /// Model not available (404)
    #[error("Model '{model}' not available ({status_code}): {message}")]
    ModelNotAvailable {
        model: String,
        status_code: u16,
        message: String,
    },

    /// Connection-level failure
    #[error("Network error: {message}")]
    NetworkError { message: String },

    /// The provider answered without any assistant content
    #[error("Provider returned an empty response")]
    EmptyResponse,

    /// The response body could not be decoded
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// The circuit breaker is open and short-circuits calls
    #[error("Circuit open for {provider}, retry after {remaining:?}")]
    CircuitOpen { provider: String, remaining: Duration },

    /// The local token bucket and its queue are exhausted
    #[error("Rate limiter rejected the request")]
    RateLimitRejected,

    /// The concurrency limiter and its queue are full
    #[error("Concurrency limiter rejected the request")]
    BulkheadRejected,

    /// A local model server could not be provisioned or started
    #[error("Local process error: {0}")]
    LocalProcess(String),

    /// The caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Determine if this error is transient and worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimit { .. } => true,
            Self::Timeout => true,
            Self::ServerError { status_code, .. } => {
                !NON_RETRYABLE_SERVER_STATUSES.contains(status_code)
            }
            Self::NetworkError { .. } => true,
            Self::InvalidRequest { .. }
            | Self::AuthenticationError { .. }
            | Self::ModelNotAvailable { .. }
            | Self::EmptyResponse
            | Self::ParseError(_)
            | Self::CircuitOpen { .. }
            | Self::RateLimitRejected
            | Self::BulkheadRejected
            | Self::LocalProcess(_)
            | Self::Cancelled => false,
        }
    }

    /// Whether this outcome counts against the circuit breaker
    pub fn is_failure_for_breaker(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::ServerError { .. } | Self::NetworkError { .. } | Self::RateLimit { .. }
        )
    }

    /// Server-suggested delay before the next attempt
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// HTTP status carried by this error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ServerError { status_code, .. }
            | Self::InvalidRequest { status_code, .. }
            | Self::ModelNotAvailable { status_code, .. } => Some(*status_code),
            Self::AuthenticationError { status_code, .. } => *status_code,
            Self::RateLimit { .. } => Some(429),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_connect() {
            ProviderError::NetworkError {
                message: format!("Connection failed: {}", err),
            }
        } else if err.is_decode() {
            ProviderError::ParseError(err.to_string())
        } else {
            ProviderError::NetworkError {
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::ParseError(err.to_string())
    }
}
