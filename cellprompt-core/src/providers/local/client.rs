//! Adapter for a model server run as a local process

use super::process::{LocalServer, ProcessRegistry};
use crate::config::{LocalProcessConfig, ProviderConfiguration};
use crate::http::{HttpClient, HttpExecutor};
use crate::protocol::Prompt;
use crate::providers::adapter::ProviderAdapter;
use crate::providers::openai::OpenAIAdapter;
use crate::providers::{ProviderCapabilities, ProviderError, ProviderId, ProviderResult};
use crate::resilience::ResiliencePipeline;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

/// Starts its server on first use, then speaks the OpenAI protocol to it
pub struct LocalProcessAdapter {
    configuration: ProviderConfiguration,
    local: LocalProcessConfig,
    capabilities: ProviderCapabilities,
    client: HttpClient,
    http: Arc<dyn HttpExecutor>,
    pipeline: Arc<ResiliencePipeline>,
    registry: Arc<ProcessRegistry>,
    inner: OnceCell<OpenAIAdapter>,
}

impl LocalProcessAdapter {
    pub fn new(
        configuration: ProviderConfiguration,
        client: HttpClient,
        http: Arc<dyn HttpExecutor>,
        pipeline: Arc<ResiliencePipeline>,
        registry: Arc<ProcessRegistry>,
    ) -> ProviderResult<Self> {
        let local = configuration.local.clone().ok_or_else(|| {
            ProviderError::LocalProcess(format!("{} has no local process settings", configuration.provider))
        })?;
        Ok(Self {
            capabilities: configuration.capabilities(),
            configuration,
            local,
            client,
            http,
            pipeline,
            registry,
            inner: OnceCell::new(),
        })
    }

    async fn adapter(&self, cancel: &CancellationToken) -> ProviderResult<&OpenAIAdapter> {
        self.inner
            .get_or_try_init(|| async {
                let server = LocalServer::start(
                    self.configuration.provider.as_str(),
                    &self.local,
                    &self.client,
                    &self.registry,
                    cancel,
                )
                .await?;
                let configuration = ProviderConfiguration {
                    capabilities: Some(self.capabilities.clone()),
                    ..self.configuration.clone().with_base_url(server.base_url())
                };
                Ok(OpenAIAdapter::new(configuration, self.http.clone(), self.pipeline.clone()))
            })
            .await
    }
}

#[async_trait]
impl ProviderAdapter for LocalProcessAdapter {
    fn id(&self) -> ProviderId {
        self.configuration.provider
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    async fn send(&self, prompt: &Prompt, cancel: &CancellationToken) -> ProviderResult<Prompt> {
        self.adapter(cancel).await?.send(prompt, cancel).await
    }
}
