//! Dispatcher-level error type and cell sentinels

use crate::config::ConfigError;
use crate::providers::{ProviderError, ProviderId};
use thiserror::Error;

/// Sentinel shown when the model could not follow the instruction
pub const SENTINEL_INSTRUCTION_ERROR: &str = "#INSTRUCTION_ERROR?";
/// Sentinel shown when the provider returned nothing
pub const SENTINEL_EMPTY_RESPONSE: &str = "#EMPTY_RESPONSE?";
/// Sentinel shown when the call was cancelled
pub const SENTINEL_CANCELLED: &str = "#CANCELLED!";
/// Sentinel shown for provider or transport failures
pub const SENTINEL_PROVIDER_ERROR: &str = "#PROVIDER_ERROR!";
/// Sentinel shown for configuration and usage errors
pub const SENTINEL_CONFIG_ERROR: &str = "#CONFIG_ERROR!";

/// Result type for dispatcher operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by [`crate::client::Client::send`]
#[derive(Debug, Error)]
pub enum ClientError {
    /// No adapter is registered for the provider
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(ProviderId),

    /// The provider cannot honour the requested feature combination
    #[error("Unsupported combination for {provider}: {message}")]
    UnsupportedCombination { provider: ProviderId, message: String },

    /// The model kept asking for tools past the configured depth
    #[error("Tool loop exceeded maximum depth of {max_depth}")]
    ToolLoopExceeded { max_depth: usize },

    /// Provider or transport failure
    #[error(transparent)]
    Provider(ProviderError),

    /// The caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<ProviderError> for ClientError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Cancelled => ClientError::Cancelled,
            other => ClientError::Provider(other),
        }
    }
}

impl From<ConfigError> for ClientError {
    fn from(err: ConfigError) -> Self {
        ClientError::Configuration(err.to_string())
    }
}

impl ClientError {
    /// Short, cell-displayable token for this error
    pub fn sentinel(&self) -> &'static str {
        match self {
            ClientError::Provider(ProviderError::EmptyResponse) => SENTINEL_EMPTY_RESPONSE,
            ClientError::Provider(_) => SENTINEL_PROVIDER_ERROR,
            ClientError::ToolLoopExceeded { .. } => SENTINEL_INSTRUCTION_ERROR,
            ClientError::Cancelled => SENTINEL_CANCELLED,
            ClientError::UnsupportedProvider(_)
            | ClientError::UnsupportedCombination { .. }
            | ClientError::Configuration(_) => SENTINEL_CONFIG_ERROR,
        }
    }

    /// Whether the caller cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Cancelled)
    }
}
