//! Ollama adapter

use super::converter::{from_ollama_response, to_ollama_request};
use super::types::OllamaResponse;
use crate::config::ProviderConfiguration;
use crate::http::{HttpExecutor, JsonRequest, RequestOptions};
use crate::protocol::Prompt;
use crate::providers::adapter::{finish, ProviderAdapter};
use crate::providers::{ProviderCapabilities, ProviderError, ProviderId, ProviderResult};
use crate::resilience::ResiliencePipeline;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// Upper bound for pulling a model
const PULL_TIMEOUT: Duration = Duration::from_secs(3600);

/// Adapter for a local or remote Ollama server
pub struct OllamaAdapter {
    configuration: ProviderConfiguration,
    capabilities: ProviderCapabilities,
    endpoint: String,
    http: Arc<dyn HttpExecutor>,
    pipeline: Arc<ResiliencePipeline>,
    /// Per-model presence check, set once the model is on the server
    ready: DashMap<String, Arc<OnceCell<()>>>,
}

impl OllamaAdapter {
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
            ready: DashMap::new(),
        }
    }

    /// Make sure `model` exists on the server, pulling it once if missing
    ///
    /// Callers for the same model share one check; other models proceed
    /// independently. A failed or cancelled check is retried by the next caller.
    pub async fn ensure_model(&self, model: &str, cancel: &CancellationToken) -> ProviderResult<()> {
        let cell = self.ready.entry(model.to_string()).or_default().value().clone();
        if cell.initialized() {
            return Ok(());
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProviderError::Cancelled),
            result = cell.get_or_try_init(|| self.provision(model, cancel)) => result.map(|_| ()),
        }
    }

    async fn provision(&self, model: &str, cancel: &CancellationToken) -> ProviderResult<()> {
        let show = JsonRequest::new(format!("{}/api/show", self.endpoint), json!({ "model": model }));
        let show_options = RequestOptions::default();
        let shown = self
            .pipeline
            .execute(cancel, || self.http.post_json(&show, &show_options))
            .await;

        match shown {
            Ok(_) => {
                debug!("Ollama model {} is present", model);
                Ok(())
            }
            Err(ProviderError::ModelNotAvailable { .. }) => {
                info!("Pulling ollama model {}", model);
                let pull = JsonRequest::new(
                    format!("{}/api/pull", self.endpoint),
                    json!({ "model": model, "stream": false }),
                );
                let pull_options = RequestOptions::default().with_timeout(PULL_TIMEOUT);
                self.pipeline
                    .execute_with_timeout(cancel, PULL_TIMEOUT, || {
                        self.http.post_json(&pull, &pull_options)
                    })
                    .await?;
                info!("Pulled ollama model {}", model);
                Ok(())
            }
            Err(other) => Err(other),
        }
    }
}

#[async_trait]
impl ProviderAdapter for OllamaAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Ollama
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    async fn send(&self, prompt: &Prompt, cancel: &CancellationToken) -> ProviderResult<Prompt> {
        let model = self
            .configuration
            .resolve_model(prompt.options.model.as_deref());
        self.ensure_model(&model, cancel).await?;

        let body = to_ollama_request(model.clone(), prompt, &self.capabilities);
        let request = JsonRequest::new(format!("{}/api/chat", self.endpoint), serde_json::to_value(&body)?);
        let options = RequestOptions::new(Uuid::new_v4());

        info!(
            "Sending {} messages to ollama ({}) [request_id: {}]",
            prompt.messages.len(),
            model,
            options.request_id
        );

        let value = self
            .pipeline
            .execute(cancel, || self.http.post_json(&request, &options))
            .await?;

        let response: OllamaResponse = serde_json::from_value(value)?;
        let (message, usage) = from_ollama_response(response);
        if let Some(usage) = usage {
            usage.record(ProviderId::Ollama, &model);
        }

        finish(prompt, message.ok_or(ProviderError::EmptyResponse)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::RecordingExecutor;
    use crate::protocol::PromptBuilder;
    use crate::resilience::ResilienceConfiguration;

    fn adapter(http: Arc<RecordingExecutor>) -> OllamaAdapter {
        OllamaAdapter::new(
            ProviderConfiguration::new(ProviderId::Ollama, "llama3.2"),
            http,
            Arc::new(ResiliencePipeline::new("ollama", &ResilienceConfiguration::default())),
        )
    }

    #[tokio::test]
    async fn test_missing_model_is_pulled_once() {
        let http = Arc::new(RecordingExecutor::new(vec![
            Err(ProviderError::ModelNotAvailable {
                model: "llama3.2".into(),
                status_code: 404,
                message: "model 'llama3.2' not found".into(),
            }),
            Ok(json!({"status": "success"})),
            Ok(json!({"message": {"role": "assistant", "content": "one"}})),
            Ok(json!({"message": {"role": "assistant", "content": "two"}})),
        ]));
        let adapter = adapter(http.clone());
        let prompt = PromptBuilder::new().user("hi").build();
        let cancel = CancellationToken::new();

        adapter.send(&prompt, &cancel).await.unwrap();
        let second = adapter.send(&prompt, &cancel).await.unwrap();
        assert_eq!(second.last_assistant_text(), Some("two"));

        let urls: Vec<String> = http.requests.lock().unwrap().iter().map(|r| r.url.clone()).collect();
        assert_eq!(
            urls,
            vec![
                "http://localhost:11434/api/show",
                "http://localhost:11434/api/pull",
                "http://localhost:11434/api/chat",
                "http://localhost:11434/api/chat",
            ]
        );
    }
}
