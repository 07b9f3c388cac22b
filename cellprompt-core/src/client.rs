//! Dispatcher
//!
//! [`Client::send`] composes the pipeline: rate-limit gate, response cache,
//! provider behaviors, the adapter call and the bounded tool loop.

use crate::behaviors::{BehaviorContext, BehaviorTable};
use crate::cache::ResponseCache;
use crate::config::{CellpromptConfig, ConfigError, ConfigValidator, ProviderConfiguration};
use crate::error::{ClientError, ClientResult};
use crate::http::{HttpClient, HttpExecutor};
use crate::protocol::{Message, Prompt};
use crate::providers::anthropic::AnthropicAdapter;
use crate::providers::local::{LocalProcessAdapter, ProcessRegistry};
use crate::providers::ollama::OllamaAdapter;
use crate::providers::openai::OpenAIAdapter;
use crate::providers::{ProviderAdapter, ProviderCapabilities, ProviderId};
use crate::resilience::{RateLimitConfig, ResiliencePipeline, TokenBucket};
use crate::structured::CellOutput;
use crate::tools::{ToolInvoker, ToolRegistry};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

struct RegisteredProvider {
    adapter: Arc<dyn ProviderAdapter>,
    configuration: ProviderConfiguration,
}

/// Sends prompts to registered providers
pub struct Client {
    providers: HashMap<ProviderId, RegisteredProvider>,
    behaviors: BehaviorTable,
    cache: Arc<ResponseCache>,
    tools: Arc<ToolInvoker>,
    gate: Arc<TokenBucket>,
    processes: Arc<ProcessRegistry>,
    max_tool_depth: usize,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("behaviors", &self.behaviors)
            .field("tools", self.tools.registry())
            .field("max_tool_depth", &self.max_tool_depth)
            .finish()
    }
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Build a client with one adapter per configured provider
    pub fn from_config(config: &CellpromptConfig) -> ClientResult<Self> {
        ConfigValidator::new()
            .validate(config)
            .map_err(ConfigError::from)?;

        let http_client = HttpClient::with_config(&config.connection)
            .map_err(|e| ClientError::Configuration(e.to_string()))?;
        let http: Arc<dyn HttpExecutor> = Arc::new(http_client.clone());
        let processes = Arc::new(ProcessRegistry::new());

        let mut builder = ClientBuilder::new()
            .rate_limit(config.resilience.rate_limit.clone())
            .cache(ResponseCache::new(&config.cache))
            .tools(ToolRegistry::from_config(&config.tools))
            .max_tool_depth(config.tools.max_tool_depth)
            .process_registry(processes.clone());

        for configuration in &config.providers {
            let resilience = configuration
                .resilience
                .as_ref()
                .unwrap_or(&config.resilience);
            let pipeline = Arc::new(ResiliencePipeline::new(configuration.provider.as_str(), resilience));

            let adapter: Arc<dyn ProviderAdapter> = match configuration.provider {
                ProviderId::Anthropic => Arc::new(AnthropicAdapter::new(
                    configuration.clone(),
                    http.clone(),
                    pipeline,
                )),
                ProviderId::Ollama => Arc::new(OllamaAdapter::new(configuration.clone(), http.clone(), pipeline)),
                ProviderId::Llamafile => Arc::new(LocalProcessAdapter::new(
                    configuration.clone(),
                    http_client.clone(),
                    http.clone(),
                    pipeline,
                    processes.clone(),
                )?),
                ProviderId::DeepSeek
                | ProviderId::Gemini
                | ProviderId::Mistral
                | ProviderId::OpenAi
                | ProviderId::OpenAiCompatible => {
                    Arc::new(OpenAIAdapter::new(configuration.clone(), http.clone(), pipeline))
                }
            };
            builder = builder.provider(configuration.clone(), adapter);
        }

        Ok(builder.build())
    }

    /// Providers with a registered adapter
    pub fn providers(&self) -> Vec<ProviderId> {
        let mut ids: Vec<_> = self.providers.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Run `prompt` against `provider` and return the completed prompt
    ///
    /// Tool calls requested by the model are executed and fed back until the
    /// model answers without one, for at most `max_tool_depth` round trips.
    pub async fn send(
        &self,
        prompt: Prompt,
        provider: ProviderId,
        cancel: &CancellationToken,
    ) -> ClientResult<Prompt> {
        let request_id = Uuid::new_v4();
        let registered = self
            .providers
            .get(&provider)
            .ok_or(ClientError::UnsupportedProvider(provider))?;

        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        self.gate.acquire(cancel).await?;

        if prompt.system_message_count() != 1 {
            warn!(
                "Prompt has {} system messages, expected 1 [request_id: {}]",
                prompt.system_message_count(),
                request_id
            );
        }

        let key = self.cache.is_enabled().then(|| ResponseCache::key(provider, &prompt));
        if let Some(cached) = key.as_deref().and_then(|key| self.cache.get(key)) {
            info!("Cache hit for {} [request_id: {}]", provider, request_id);
            return Ok(cached);
        }

        let started = Instant::now();
        info!("Dispatching to {} [request_id: {}]", provider, request_id);
        let completed = self.run(prompt, provider, registered, cancel, request_id).await?;
        info!(
            "Completed {} in {:?} with {} messages [request_id: {}]",
            provider,
            started.elapsed(),
            completed.messages.len(),
            request_id
        );

        if let Some(key) = key {
            self.cache.insert(key, &completed);
        }
        Ok(completed)
    }

    /// [`send`](Self::send), rendered for a spreadsheet cell
    pub async fn send_to_cell(
        &self,
        prompt: Prompt,
        provider: ProviderId,
        cancel: &CancellationToken,
    ) -> CellOutput {
        let result = self.send(prompt, provider, cancel).await;
        if let Err(err) = &result {
            warn!("Send to {} failed: {}", provider, err);
        }
        CellOutput::from_result(&result)
    }

    /// Terminate every local model server started by this client
    pub async fn shutdown(&self) {
        self.processes.shutdown().await;
    }

    async fn run(
        &self,
        prompt: Prompt,
        provider: ProviderId,
        registered: &RegisteredProvider,
        cancel: &CancellationToken,
        request_id: Uuid,
    ) -> ClientResult<Prompt> {
        let ctx = BehaviorContext {
            provider,
            capabilities: registered.adapter.capabilities(),
            configuration: &registered.configuration,
        };

        let mut prompt = self.with_builtin_tools(prompt, ctx.capabilities);
        let model = registered.configuration.resolve_model(prompt.options.model.as_deref());
        prompt.options.model = Some(model);

        let mut depth = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(ClientError::Cancelled);
            }

            let outgoing = self.behaviors.before(&ctx, prompt)?;
            let answered = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                result = registered.adapter.send(&outgoing, cancel) => result?,
            };
            let answered = self.behaviors.after(&ctx, answered)?;

            let calls = match answered.last_message() {
                Some(message) if message.has_tool_calls() => message.tool_calls.clone(),
                _ => return Ok(answered),
            };

            if depth >= self.max_tool_depth {
                warn!(
                    "Model still requesting tools after {} round trips [request_id: {}]",
                    depth, request_id
                );
                return Err(ClientError::ToolLoopExceeded {
                    max_depth: self.max_tool_depth,
                });
            }
            depth += 1;

            debug!(
                "Invoking {} tool calls, round trip {} [request_id: {}]",
                calls.len(),
                depth,
                request_id
            );
            let results = self.tools.invoke_all(&calls, cancel).await;
            if cancel.is_cancelled() {
                return Err(ClientError::Cancelled);
            }
            prompt = answered.with_message(Message::tool_results(results));
        }
    }

    /// Advertise built-in tools where the provider can take them
    fn with_builtin_tools(&self, mut prompt: Prompt, capabilities: &ProviderCapabilities) -> Prompt {
        let registry = self.tools.registry();
        if registry.is_empty() || !capabilities.supports_tools {
            return prompt;
        }
        if prompt.wants_structured_output() && capabilities.conflicts_with_tools() {
            debug!("Not advertising built-in tools alongside a structured output request");
            return prompt;
        }

        for definition in registry.definitions() {
            if !prompt.options.tools.iter().any(|t| t.name == definition.name) {
                prompt.options.tools.push(definition);
            }
        }
        prompt
    }
}

/// Builder for [`Client`]
pub struct ClientBuilder {
    providers: HashMap<ProviderId, RegisteredProvider>,
    behaviors: BehaviorTable,
    cache: ResponseCache,
    tools: ToolRegistry,
    rate_limit: RateLimitConfig,
    processes: Arc<ProcessRegistry>,
    max_tool_depth: usize,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            behaviors: BehaviorTable::default(),
            cache: ResponseCache::default(),
            tools: ToolRegistry::new(),
            rate_limit: RateLimitConfig::default(),
            processes: Arc::new(ProcessRegistry::new()),
            max_tool_depth: crate::config::ToolsConfig::default().max_tool_depth,
        }
    }

    /// Register `adapter` for `configuration.provider`, replacing any earlier one
    pub fn provider(mut self, configuration: ProviderConfiguration, adapter: Arc<dyn ProviderAdapter>) -> Self {
        let id = configuration.provider;
        if id != adapter.id() {
            warn!("Adapter {} registered under {}", adapter.id(), id);
        }
        self.providers.insert(id, RegisteredProvider { adapter, configuration });
        self
    }

    pub fn behaviors(mut self, behaviors: BehaviorTable) -> Self {
        self.behaviors = behaviors;
        self
    }

    pub fn cache(mut self, cache: ResponseCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn max_tool_depth(mut self, max_tool_depth: usize) -> Self {
        self.max_tool_depth = max_tool_depth;
        self
    }

    pub fn process_registry(mut self, processes: Arc<ProcessRegistry>) -> Self {
        self.processes = processes;
        self
    }

    pub fn build(self) -> Client {
        Client {
            providers: self.providers,
            behaviors: self.behaviors,
            cache: Arc::new(self.cache),
            tools: Arc::new(ToolInvoker::new(self.tools)),
            gate: Arc::new(TokenBucket::new(self.rate_limit)),
            processes: self.processes,
            max_tool_depth: self.max_tool_depth,
        }
    }
}
