//! Configuration schema structures with serde support

use super::error::{ValidationError, ValidationErrorKind};
use super::secrets::{redact_by_field_name, SafeLogging, SecretString};
use crate::providers::{ProviderCapabilities, ProviderId};
use crate::resilience::ResilienceConfiguration;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

/// Supported schema version
pub const CONFIG_VERSION: &str = "0.1";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CellpromptConfig {
    /// Schema version (required - no default)
    pub version: String,

    #[serde(default)]
    pub providers: Vec<ProviderConfiguration>,

    /// Resilience applied to providers without their own override
    #[serde(default)]
    pub resilience: ResilienceConfiguration,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    /// HTTP client settings shared by every provider
    #[serde(default)]
    pub connection: ConnectionConfig,
}

/// One configured model provider
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfiguration {
    pub provider: ProviderId,

    /// Overrides the provider's public endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// API key (supports environment variable interpolation)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<SecretString>,

    pub default_model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub small_model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium_model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub large_model: Option<String>,

    /// Replaces the provider's built-in capability defaults
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<ProviderCapabilities>,

    /// Extra request fields merged into every prompt's options
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_properties: BTreeMap<String, Value>,

    /// Replaces the global resilience configuration for this provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resilience: Option<ResilienceConfiguration>,

    /// Settings for providers that run as a local process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<LocalProcessConfig>,
}

/// Local model server settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LocalProcessConfig {
    /// Where the server executable lives (downloaded when missing)
    pub executable_path: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable_url: Option<String>,

    /// Model weights passed to the server with `-m`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_url: Option<String>,

    /// Seconds to wait for the server's health endpoint
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_secs: u64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
}

/// Response cache settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Entry lifetime in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_cache_ttl(),
            max_entries: default_max_entries(),
        }
    }
}

/// Built-in tool settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    #[serde(default)]
    pub file_reader: bool,

    #[serde(default)]
    pub file_search: bool,

    /// Tool round trips allowed before a send fails
    #[serde(default = "default_max_tool_depth")]
    pub max_tool_depth: usize,

    /// Sandbox directory for the file tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_root: Option<PathBuf>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            file_reader: false,
            file_search: false,
            max_tool_depth: default_max_tool_depth(),
            file_root: None,
        }
    }
}

/// Connection configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Whole-request timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Maximum idle connections per host
    #[serde(default = "default_max_idle")]
    pub max_idle_per_host: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout(),
            request_timeout_ms: default_request_timeout(),
            max_idle_per_host: default_max_idle(),
        }
    }
}

fn default_true() -> bool { true }
fn default_cache_ttl() -> u64 { 3_600 }
fn default_max_entries() -> usize { 10_000 }
fn default_max_tool_depth() -> usize { 8 }
fn default_startup_timeout() -> u64 { 120 }
fn default_connect_timeout() -> u64 { 10_000 }
fn default_request_timeout() -> u64 { 300_000 }
fn default_max_idle() -> usize { 10 }

impl ProviderConfiguration {
    /// Minimal configuration for `provider` using `default_model`
    pub fn new(provider: ProviderId, default_model: impl Into<String>) -> Self {
        Self {
            provider,
            base_url: None,
            api_key: None,
            default_model: default_model.into(),
            small_model: None,
            medium_model: None,
            large_model: None,
            capabilities: None,
            additional_properties: BTreeMap::new(),
            resilience: None,
            local: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<SecretString>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Endpoint to call, falling back to the provider's public one
    pub fn endpoint(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| self.provider.default_base_url().to_string())
    }

    /// Effective capabilities for this provider
    pub fn capabilities(&self) -> ProviderCapabilities {
        self.capabilities
            .clone()
            .unwrap_or_else(|| ProviderCapabilities::for_provider(self.provider))
    }

    /// Resolve a requested model or alias to a concrete model name
    ///
    /// `None` selects `default_model`; `small`, `medium` and `large` select
    /// the configured size, falling back to `default_model` when unset.
    pub fn resolve_model(&self, requested: Option<&str>) -> String {
        let sized = |name: &Option<String>| name.clone().unwrap_or_else(|| self.default_model.clone());
        match requested {
            None => self.default_model.clone(),
            Some("small") => sized(&self.small_model),
            Some("medium") => sized(&self.medium_model),
            Some("large") => sized(&self.large_model),
            Some(model) => model.to_string(),
        }
    }

    /// Validate provider configuration
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.default_model.is_empty() {
            return Err(ValidationError::required(format!("{}.default_model", path)));
        }

        if self.provider.requires_api_key()
            && self.api_key.as_ref().map_or(true, SecretString::is_empty)
        {
            return Err(ValidationError::required(format!("{}.api_key", path)));
        }

        match &self.base_url {
            Some(base_url) => validate_url(&format!("{}.base_url", path), base_url)?,
            None if self.provider == ProviderId::OpenAiCompatible => {
                return Err(ValidationError::required(format!("{}.base_url", path))
                    .with_context("OpenAI-compatible providers have no default endpoint"));
            }
            None => {}
        }

        if self.provider == ProviderId::Llamafile && self.local.is_none() {
            return Err(ValidationError::required(format!("{}.local", path)));
        }

        if let Some(capabilities) = &self.capabilities {
            if capabilities.max_temperature <= 0.0 {
                return Err(ValidationError::out_of_range(
                    format!("{}.capabilities.max_temperature", path),
                    "Must be positive",
                ));
            }
        }

        if let Some(resilience) = &self.resilience {
            resilience.validate(&format!("{}.resilience", path))?;
        }

        Ok(())
    }
}

impl SafeLogging for ProviderConfiguration {
    fn safe_for_logging(&self) -> String {
        let key = self
            .api_key
            .as_ref()
            .map(SecretString::partial_redact)
            .unwrap_or_else(|| "none".to_string());
        let properties: Vec<String> = self
            .additional_properties
            .iter()
            .map(|(name, value)| format!("{}={}", name, redact_by_field_name(name, &value.to_string())))
            .collect();
        format!(
            "{} at {} (model {}, key {}, properties [{}])",
            self.provider,
            self.endpoint(),
            self.default_model,
            key,
            properties.join(", ")
        )
    }
}

fn validate_url(path: &str, value: &str) -> Result<(), ValidationError> {
    match url::Url::parse(value) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(()),
        Ok(url) => Err(ValidationError::new(
            path,
            ValidationErrorKind::InvalidUrl {
                message: format!("URL scheme must be http or https, got: {}", url.scheme()),
            },
        )),
        Err(e) => Err(ValidationError::new(
            path,
            ValidationErrorKind::InvalidUrl {
                message: e.to_string(),
            },
        )),
    }
}

impl CellpromptConfig {
    /// Configuration with the given providers and defaults everywhere else
    pub fn with_providers(providers: Vec<ProviderConfiguration>) -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            providers,
            resilience: ResilienceConfiguration::default(),
            cache: CacheConfig::default(),
            tools: ToolsConfig::default(),
            connection: ConnectionConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.version.is_empty() {
            return Err(ValidationError::required("version"));
        }

        if self.version != CONFIG_VERSION {
            return Err(ValidationError::new(
                "version",
                ValidationErrorKind::InvalidVersion {
                    expected: CONFIG_VERSION.to_string(),
                    actual: self.version.clone(),
                },
            ));
        }

        if self.providers.is_empty() {
            return Err(ValidationError::required("providers")
                .with_context("At least one provider must be configured"));
        }

        let mut seen = HashSet::new();
        for (i, provider) in self.providers.iter().enumerate() {
            if !seen.insert(provider.provider) {
                return Err(ValidationError::new(
                    format!("providers[{}].provider", i),
                    ValidationErrorKind::DuplicateValue {
                        value: provider.provider.to_string(),
                    },
                ));
            }
            provider.validate(&format!("providers[{}]", i))?;
        }

        self.resilience.validate("resilience")?;

        if self.cache.enabled && self.cache.max_entries == 0 {
            return Err(ValidationError::out_of_range(
                "cache.max_entries",
                "Must be greater than 0 when the cache is enabled",
            ));
        }

        if self.cache.enabled && self.cache.ttl_secs == 0 {
            return Err(ValidationError::out_of_range(
                "cache.ttl_secs",
                "Must be greater than 0 when the cache is enabled",
            ));
        }

        if (self.tools.file_reader || self.tools.file_search) && self.tools.file_root.is_none() {
            return Err(ValidationError::required("tools.file_root")
                .with_context("File tools need a sandbox directory"));
        }

        if self.connection.connect_timeout_ms == 0 || self.connection.request_timeout_ms == 0 {
            return Err(ValidationError::out_of_range(
                "connection",
                "Timeouts must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Configuration entry for `provider`
    pub fn provider(&self, provider: ProviderId) -> Option<&ProviderConfiguration> {
        self.providers.iter().find(|p| p.provider == provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anthropic() -> ProviderConfiguration {
        ProviderConfiguration {
            small_model: Some("claude-haiku".into()),
            large_model: Some("claude-opus".into()),
            ..ProviderConfiguration::new(ProviderId::Anthropic, "claude-sonnet")
                .with_api_key("sk-ant-0123456789")
        }
    }

    #[test]
    fn test_model_aliases() {
        let config = anthropic();
        assert_eq!(config.resolve_model(None), "claude-sonnet");
        assert_eq!(config.resolve_model(Some("small")), "claude-haiku");
        assert_eq!(config.resolve_model(Some("medium")), "claude-sonnet");
        assert_eq!(config.resolve_model(Some("large")), "claude-opus");
        assert_eq!(config.resolve_model(Some("claude-x")), "claude-x");
    }

    #[test]
    fn test_duplicate_provider_rejected() {
        let config = CellpromptConfig::with_providers(vec![anthropic(), anthropic()]);
        let err = config.validate().unwrap_err();
        assert_eq!(err.field_path, "providers[1].provider");
        assert!(matches!(err.kind, ValidationErrorKind::DuplicateValue { .. }));
    }

    #[test]
    fn test_hosted_provider_requires_key() {
        let config = CellpromptConfig::with_providers(vec![ProviderConfiguration::new(
            ProviderId::OpenAi,
            "gpt-4o",
        )]);
        let err = config.validate().unwrap_err();
        assert_eq!(err.field_path, "providers[0].api_key");
    }

    #[test]
    fn test_local_provider_needs_no_key() {
        let config = CellpromptConfig::with_providers(vec![ProviderConfiguration::new(
            ProviderId::Ollama,
            "llama3.2",
        )]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        let config = CellpromptConfig::with_providers(vec![
            anthropic().with_base_url("ftp://example.com")
        ]);
        let err = config.validate().unwrap_err();
        assert_eq!(err.field_path, "providers[0].base_url");
    }

    #[test]
    fn test_cache_ttl_is_bounded() {
        assert_eq!(CacheConfig::default().ttl_secs, 3_600);

        let mut config = CellpromptConfig::with_providers(vec![anthropic()]);
        config.cache.ttl_secs = 0;
        let err = config.validate().unwrap_err();
        assert_eq!(err.field_path, "cache.ttl_secs");

        config.cache.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_safe_logging_hides_key() {
        let mut config = anthropic();
        config
            .additional_properties
            .insert("auth_header".into(), Value::String("secret".into()));
        let rendered = config.safe_for_logging();
        assert!(!rendered.contains("0123456789"));
        assert!(!rendered.contains("\"secret\""));
    }
}
