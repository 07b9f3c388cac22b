//! HTTP client implementation using reqwest

use super::error::map_http_error;
use super::{HttpExecutor, JsonRequest, RequestOptions};
use crate::config::ConnectionConfig;
use crate::providers::{ProviderError, ProviderResult};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, Response};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

/// Maximum JSON response size
const MAX_RESPONSE_SIZE: usize = 32 * 1024 * 1024;

const USER_AGENT: &str = concat!("cellprompt/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client with connection pooling
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    max_response_size: usize,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> ProviderResult<Self> {
        Self::with_config(&ConnectionConfig::default())
    }

    /// Create a new HTTP client from connection settings
    pub fn with_config(config: &ConnectionConfig) -> ProviderResult<Self> {
        let client = ClientBuilder::new()
            .pool_max_idle_per_host(config.max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .user_agent(USER_AGENT)
            .gzip(true)
            .build()
            .map_err(|e| ProviderError::NetworkError {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            max_response_size: MAX_RESPONSE_SIZE,
        })
    }

    fn validate_content_type(response: &Response) -> ProviderResult<()> {
        if let Some(content_type) = response.headers().get("content-type") {
            let content_type = content_type.to_str().unwrap_or("").to_lowercase();
            if !content_type.contains("json") {
                return Err(ProviderError::ParseError(format!(
                    "Expected application/json, got: {}",
                    content_type
                )));
            }
        }
        Ok(())
    }

    fn check_content_length(&self, response: &Response) -> ProviderResult<()> {
        match response.content_length() {
            Some(length) if length as usize > self.max_response_size => {
                Err(ProviderError::ParseError(format!(
                    "Response size {} exceeds maximum {}",
                    length, self.max_response_size
                )))
            }
            _ => Ok(()),
        }
    }

    /// GET `url` and return the status code; used for health probes
    pub async fn get_status(&self, url: &str, timeout: Duration) -> ProviderResult<u16> {
        let response = self.client.get(url).timeout(timeout).send().await?;
        Ok(response.status().as_u16())
    }

    /// Stream `url` into `destination`, replacing it only once complete
    pub async fn download(&self, url: &str, destination: &Path) -> ProviderResult<()> {
        info!("Downloading {} to {}", url, destination.display());

        let mut response = self.client.get(url).timeout(Duration::from_secs(3600)).send().await?;
        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.ok();
            return Err(map_http_error(status, Some(&headers), body, uuid::Uuid::new_v4()));
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        let partial = destination.with_extension("partial");
        let mut file = tokio::fs::File::create(&partial).await.map_err(io_error)?;

        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await.map_err(io_error)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io_error)?;
        drop(file);

        tokio::fs::rename(&partial, destination)
            .await
            .map_err(io_error)?;
        info!("Downloaded {} bytes to {}", written, destination.display());
        Ok(())
    }
}

fn io_error(err: std::io::Error) -> ProviderError {
    ProviderError::LocalProcess(err.to_string())
}

#[async_trait]
impl HttpExecutor for HttpClient {
    async fn post_json(&self, request: &JsonRequest, options: &RequestOptions) -> ProviderResult<Value> {
        let request_id = options.request_id;
        debug!("POST {} [request_id: {}]", request.url, request_id);

        let mut builder = self.client.post(&request.url).json(&request.body);
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        builder = builder.header("X-Request-ID", request_id.to_string());

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                warn!("Request timeout for {} [request_id: {}]", request.url, request_id);
                ProviderError::Timeout
            } else {
                error!("Request error for {} [request_id: {}]: {}", request.url, request_id, e);
                ProviderError::NetworkError {
                    message: format!("{} [request_id: {}]", e, request_id),
                }
            }
        })?;

        let status = response.status();
        debug!("Response status: {} [request_id: {}]", status, request_id);

        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.ok();
            warn!(
                "Request failed with status {} for {} [request_id: {}]",
                status, request.url, request_id
            );
            return Err(map_http_error(status, Some(&headers), body, request_id));
        }

        Self::validate_content_type(&response)?;
        self.check_content_length(&response)?;

        let text = response.text().await.map_err(|e| ProviderError::NetworkError {
            message: format!("Failed to read response body: {} [request_id: {}]", e, request_id),
        })?;

        if text.len() > self.max_response_size {
            return Err(ProviderError::ParseError(format!(
                "Response size {} exceeds maximum {} [request_id: {}]",
                text.len(),
                self.max_response_size,
                request_id
            )));
        }

        serde_json::from_str(&text).map_err(|e| {
            error!("Failed to parse response [request_id: {}]: {}", request_id, e);
            ProviderError::ParseError(format!("{} [request_id: {}]", e, request_id))
        })
    }
}
