//! Provider adapters
//!
//! Each adapter translates a [`Prompt`](crate::protocol::Prompt) into one
//! provider's wire format, sends it through that provider's
//! [`ResiliencePipeline`](crate::resilience::ResiliencePipeline), and appends
//! the assistant's answer to a copy of the prompt.

pub mod adapter;
pub mod anthropic;
mod capabilities;
mod error;
pub mod local;
pub mod ollama;
pub mod openai;

pub use adapter::{ProviderAdapter, Usage};
pub use capabilities::ProviderCapabilities;
pub use error::{ProviderError, ProviderResult, NON_RETRYABLE_SERVER_STATUSES};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a model provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Anthropic,
    DeepSeek,
    Gemini,
    Llamafile,
    Mistral,
    Ollama,
    OpenAi,
    OpenAiCompatible,
}

impl ProviderId {
    pub const ALL: [ProviderId; 8] = [
        ProviderId::Anthropic,
        ProviderId::DeepSeek,
        ProviderId::Gemini,
        ProviderId::Llamafile,
        ProviderId::Mistral,
        ProviderId::Ollama,
        ProviderId::OpenAi,
        ProviderId::OpenAiCompatible,
    ];

    /// Lowercase name as used in configuration files
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Anthropic => "anthropic",
            ProviderId::DeepSeek => "deepseek",
            ProviderId::Gemini => "gemini",
            ProviderId::Llamafile => "llamafile",
            ProviderId::Mistral => "mistral",
            ProviderId::Ollama => "ollama",
            ProviderId::OpenAi => "openai",
            ProviderId::OpenAiCompatible => "openaicompatible",
        }
    }

    /// Public endpoint used when no base URL is configured
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderId::Anthropic => "https://api.anthropic.com/v1",
            ProviderId::DeepSeek => "https://api.deepseek.com/v1",
            ProviderId::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
            ProviderId::Llamafile => "http://127.0.0.1:8080/v1",
            ProviderId::Mistral => "https://api.mistral.ai/v1",
            ProviderId::Ollama => "http://localhost:11434",
            ProviderId::OpenAi => "https://api.openai.com/v1",
            ProviderId::OpenAiCompatible => "http://localhost:8000/v1",
        }
    }

    /// Hosted providers refuse requests without a key
    pub fn requires_api_key(&self) -> bool {
        !matches!(
            self,
            ProviderId::Ollama | ProviderId::Llamafile | ProviderId::OpenAiCompatible
        )
    }

    /// Providers speaking the OpenAI chat completions protocol
    pub fn is_openai_family(&self) -> bool {
        matches!(
            self,
            ProviderId::OpenAi
                | ProviderId::OpenAiCompatible
                | ProviderId::Mistral
                | ProviderId::DeepSeek
                | ProviderId::Gemini
        )
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
