//! Anthropic Messages API adapter

use super::converter::{from_anthropic_response, to_anthropic_request};
use super::types::AnthropicResponse;
use crate::config::ProviderConfiguration;
use crate::http::{HttpExecutor, JsonRequest, RequestOptions};
use crate::protocol::Prompt;
use crate::providers::adapter::{finish, ProviderAdapter};
use crate::providers::{ProviderCapabilities, ProviderError, ProviderId, ProviderResult};
use crate::resilience::ResiliencePipeline;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// API version sent with every request
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Adapter for Anthropic's Claude models
pub struct AnthropicAdapter {
    configuration: ProviderConfiguration,
    capabilities: ProviderCapabilities,
    endpoint: String,
    http: Arc<dyn HttpExecutor>,
    pipeline: Arc<ResiliencePipeline>,
}

impl AnthropicAdapter {
    pub fn new(
        configuration: ProviderConfiguration,
        http: Arc<dyn HttpExecutor>,
        pipeline: Arc<ResiliencePipeline>,
    ) -> Self {
        Self {
            capabilities: configuration.capabilities(),
            endpoint: configuration.endpoint().trim_end_matches('/').to_string(),
            configuration,
            http,
            pipeline,
        }
    }

    /// Build the wire request for `prompt`
    pub fn build_request(&self, prompt: &Prompt) -> ProviderResult<JsonRequest> {
        let model = self
            .configuration
            .resolve_model(prompt.options.model.as_deref());
        let body = to_anthropic_request(model, prompt, &self.capabilities);

        let api_key = self
            .configuration
            .api_key
            .as_ref()
            .ok_or_else(|| ProviderError::AuthenticationError {
                status_code: None,
                message: "No API key configured for anthropic".to_string(),
            })?;

        Ok(JsonRequest::new(format!("{}/messages", self.endpoint), serde_json::to_value(&body)?)
            .header("x-api-key", api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION))
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    async fn send(&self, prompt: &Prompt, cancel: &CancellationToken) -> ProviderResult<Prompt> {
        let request = self.build_request(prompt)?;
        let options = RequestOptions::new(Uuid::new_v4());
        let model = request.body["model"].as_str().unwrap_or_default().to_string();

        info!(
            "Sending {} messages to anthropic ({}) [request_id: {}]",
            prompt.messages.len(),
            model,
            options.request_id
        );

        let value = self
            .pipeline
            .execute(cancel, || self.http.post_json(&request, &options))
            .await?;

        let response: AnthropicResponse = serde_json::from_value(value)?;
        debug!(
            "anthropic stop reason {:?} [request_id: {}]",
            response.stop_reason, options.request_id
        );

        let (message, usage) = from_anthropic_response(response);
        if let Some(usage) = usage {
            usage.record(ProviderId::Anthropic, &model);
        }

        finish(prompt, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::RecordingExecutor;
    use crate::protocol::PromptBuilder;
    use crate::resilience::ResilienceConfiguration;
    use serde_json::json;

    #[tokio::test]
    async fn test_headers_and_path() {
        let http = Arc::new(RecordingExecutor::new(vec![Ok(json!({
            "content": [{"type": "text", "text": "Paris"}],
            "stop_reason": "end_turn"
        }))]));
        let adapter = AnthropicAdapter::new(
            ProviderConfiguration::new(ProviderId::Anthropic, "claude-sonnet-4")
                .with_api_key("sk-ant-key"),
            http.clone(),
            Arc::new(ResiliencePipeline::new("anthropic", &ResilienceConfiguration::default())),
        );

        let prompt = PromptBuilder::new().system("s").user("capital of France?").build();
        let result = adapter.send(&prompt, &CancellationToken::new()).await.unwrap();
        assert_eq!(result.last_assistant_text(), Some("Paris"));

        let request = http.request(0);
        assert_eq!(request.url, "https://api.anthropic.com/v1/messages");
        assert!(request
            .headers
            .contains(&("x-api-key".to_string(), "sk-ant-key".to_string())));
        assert!(request
            .headers
            .contains(&("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string())));
        assert_eq!(request.body["model"], "claude-sonnet-4");
    }
}
