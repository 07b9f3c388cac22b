//! Provider capability flags
//!
//! Capabilities are resolved once per provider when its adapter is built and
//! checked at request-build time.

use super::ProviderId;
use serde::{Deserialize, Serialize};

/// What a provider's API can do
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderCapabilities {
    /// Accepts a JSON schema constraining the answer
    #[serde(default)]
    pub supports_json_schema_responses: bool,

    /// Accepts a response schema and tool declarations in the same request
    #[serde(default)]
    pub supports_structured_output_with_tools: bool,

    #[serde(default = "default_true")]
    pub supports_tools: bool,

    /// Upper bound of the provider's native temperature range
    #[serde(default = "default_max_temperature")]
    pub max_temperature: f32,

    /// Answers may arrive as a JSON array of typed reasoning/answer segments
    #[serde(default)]
    pub emits_thinking_segments: bool,
}

fn default_true() -> bool { true }
fn default_max_temperature() -> f32 { 1.0 }

impl Default for ProviderCapabilities {
    fn default() -> Self {
        Self {
            supports_json_schema_responses: false,
            supports_structured_output_with_tools: false,
            supports_tools: true,
            max_temperature: default_max_temperature(),
            emits_thinking_segments: false,
        }
    }
}

impl ProviderCapabilities {
    /// Built-in capabilities of each provider
    pub fn for_provider(provider: ProviderId) -> Self {
        let base = Self::default();
        match provider {
            ProviderId::Anthropic => Self {
                supports_structured_output_with_tools: true,
                ..base
            },
            ProviderId::OpenAi => Self {
                supports_json_schema_responses: true,
                supports_structured_output_with_tools: true,
                max_temperature: 2.0,
                ..base
            },
            ProviderId::OpenAiCompatible | ProviderId::Gemini => Self {
                supports_json_schema_responses: true,
                max_temperature: 2.0,
                ..base
            },
            ProviderId::Mistral => Self {
                supports_json_schema_responses: true,
                emits_thinking_segments: true,
                ..base
            },
            ProviderId::DeepSeek => Self {
                supports_structured_output_with_tools: true,
                max_temperature: 2.0,
                ..base
            },
            ProviderId::Ollama => Self {
                supports_json_schema_responses: true,
                supports_structured_output_with_tools: true,
                ..base
            },
            ProviderId::Llamafile => Self {
                supports_tools: false,
                ..base
            },
        }
    }

    /// Whether a request with a response schema and tools would be rejected
    pub fn conflicts_with_tools(&self) -> bool {
        !self.supports_structured_output_with_tools
    }
}
