//! Provider adapter contract
//!
//! Adapters never mutate the prompt they are given: they return a copy with
//! the assistant message appended.

use super::{ProviderCapabilities, ProviderError, ProviderId, ProviderResult};
use crate::protocol::{Message, Prompt};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Sends a prompt to one model provider
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> ProviderId;

    fn capabilities(&self) -> &ProviderCapabilities;

    /// Run one model turn and return `prompt` with the answer appended
    async fn send(&self, prompt: &Prompt, cancel: &CancellationToken) -> ProviderResult<Prompt>;
}

/// Token counts reported by a provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    /// Emit usage on the `cellprompt::usage` target
    pub fn record(&self, provider: ProviderId, model: &str) {
        info!(
            target: "cellprompt::usage",
            provider = %provider,
            model = model,
            input_tokens = self.input_tokens,
            output_tokens = self.output_tokens,
            "token usage"
        );
    }
}

/// Append the assistant `message` to a copy of `prompt`
///
/// A message with neither text nor tool calls is an empty response.
pub fn finish(prompt: &Prompt, message: Message) -> ProviderResult<Prompt> {
    if message.content.trim().is_empty() && !message.has_tool_calls() {
        return Err(ProviderError::EmptyResponse);
    }
    Ok(prompt.clone().with_message(message))
}
