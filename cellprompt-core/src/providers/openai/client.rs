//! OpenAI-protocol adapter

use super::converter::{from_openai_response, to_openai_request};
use super::types::OpenAIResponse;
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

/// Adapter for providers speaking the OpenAI chat completions protocol
pub struct OpenAIAdapter {
    configuration: ProviderConfiguration,
    capabilities: ProviderCapabilities,
    endpoint: String,
    http: Arc<dyn HttpExecutor>,
    pipeline: Arc<ResiliencePipeline>,
}

impl OpenAIAdapter {
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
        let body = to_openai_request(self.configuration.provider, model, prompt, &self.capabilities);

        let mut request = JsonRequest::new(
            format!("{}/chat/completions", self.endpoint),
            serde_json::to_value(&body)?,
        );
        if let Some(key) = self.configuration.api_key.as_ref().filter(|k| !k.is_empty()) {
            request = request.bearer(key.expose_secret());
        }
        Ok(request)
    }
}

#[async_trait]
impl ProviderAdapter for OpenAIAdapter {
    fn id(&self) -> ProviderId {
        self.configuration.provider
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    async fn send(&self, prompt: &Prompt, cancel: &CancellationToken) -> ProviderResult<Prompt> {
        let request = self.build_request(prompt)?;
        let options = RequestOptions::new(Uuid::new_v4());
        let model = request.body["model"].as_str().unwrap_or_default().to_string();

        info!(
            "Sending {} messages to {} ({}) [request_id: {}]",
            prompt.messages.len(),
            self.id(),
            model,
            options.request_id
        );

        let value = self
            .pipeline
            .execute(cancel, || self.http.post_json(&request, &options))
            .await?;

        let response: OpenAIResponse = serde_json::from_value(value)?;
        let converted = from_openai_response(response);

        if let Some(usage) = converted.usage {
            usage.record(self.id(), &model);
        }

        let message = converted.message.ok_or(ProviderError::EmptyResponse)?;
        debug!(
            "{} answered with {} chars and {} tool calls [request_id: {}]",
            self.id(),
            message.content.len(),
            message.tool_calls.len(),
            options.request_id
        );

        let mut result = finish(prompt, message)?;
        if let Some(temperature) = converted.temperature {
            result.options.temperature = Some(temperature);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::RecordingExecutor;
    use crate::protocol::PromptBuilder;
    use crate::resilience::ResilienceConfiguration;
    use serde_json::json;

    fn adapter(http: Arc<RecordingExecutor>) -> OpenAIAdapter {
        let configuration = ProviderConfiguration::new(ProviderId::OpenAi, "gpt-4o")
            .with_api_key("sk-test")
            .with_base_url("https://example.test/v1/");
        OpenAIAdapter::new(
            configuration,
            http,
            Arc::new(ResiliencePipeline::new("openai", &ResilienceConfiguration::default())),
        )
    }

    #[tokio::test]
    async fn test_send_appends_answer() {
        let http = Arc::new(RecordingExecutor::new(vec![Ok(json!({
            "choices": [{"message": {"role": "assistant", "content": "hello"}}]
        }))]));
        let adapter = adapter(http.clone());
        let prompt = PromptBuilder::new().system("s").user("hi").temperature(0.3).build();

        let result = adapter.send(&prompt, &CancellationToken::new()).await.unwrap();

        assert_eq!(result.last_assistant_text(), Some("hello"));
        assert_eq!(prompt.messages.len(), 2);

        let request = http.request(0);
        assert_eq!(request.url, "https://example.test/v1/chat/completions");
        assert!(request
            .headers
            .contains(&("Authorization".to_string(), "Bearer sk-test".to_string())));
        assert_eq!(request.body["model"], "gpt-4o");
        assert_eq!(request.body["messages"][0]["role"], "system");
    }

    #[tokio::test]
    async fn test_empty_choice_is_empty_response() {
        let http = Arc::new(RecordingExecutor::new(vec![Ok(json!({
            "choices": [{"message": {"role": "assistant", "content": null}}]
        }))]));
        let adapter = adapter(http);
        let prompt = PromptBuilder::new().user("hi").build();

        let result = adapter.send(&prompt, &CancellationToken::new()).await;
        assert!(matches!(result, Err(ProviderError::EmptyResponse)));
    }
}
