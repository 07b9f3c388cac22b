//! HTTP layer shared by every provider adapter
//!
//! Adapters build a [`JsonRequest`] in their own wire format and hand it to an
//! [`HttpExecutor`]. The executor owns connection pooling, request ids, size
//! limits and the mapping of HTTP failures onto [`ProviderError`].

pub mod client;
pub mod error;

pub use client::HttpClient;
pub use error::{map_http_error, parse_retry_after};

use crate::providers::ProviderResult;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

#[cfg(test)]
use crate::providers::ProviderError;

/// A provider request already in its wire format
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl JsonRequest {
    pub fn new(url: impl Into<String>, body: Value) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            body,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds `Authorization: Bearer <token>`
    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {}", token))
    }
}

/// Options for an HTTP request
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Unique request ID for correlation
    pub request_id: Uuid,

    /// Overrides the client-wide request timeout
    pub timeout: Option<Duration>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            timeout: None,
        }
    }
}

impl RequestOptions {
    pub fn new(request_id: Uuid) -> Self {
        Self {
            request_id,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Executes JSON requests against provider endpoints
#[async_trait]
pub trait HttpExecutor: Send + Sync {
    /// POST `request.body` and return the decoded JSON response
    async fn post_json(&self, request: &JsonRequest, options: &RequestOptions) -> ProviderResult<Value>;
}

/// Executor returning canned responses, for adapter unit tests
#[cfg(test)]
pub(crate) struct RecordingExecutor {
    pub requests: std::sync::Mutex<Vec<JsonRequest>>,
    responses: std::sync::Mutex<std::collections::VecDeque<ProviderResult<Value>>>,
}

#[cfg(test)]
impl RecordingExecutor {
    pub fn new(responses: Vec<ProviderResult<Value>>) -> Self {
        Self {
            requests: std::sync::Mutex::new(Vec::new()),
            responses: std::sync::Mutex::new(responses.into()),
        }
    }

    pub fn request(&self, index: usize) -> JsonRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[cfg(test)]
#[async_trait]
impl HttpExecutor for RecordingExecutor {
    async fn post_json(&self, request: &JsonRequest, _options: &RequestOptions) -> ProviderResult<Value> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ProviderError::EmptyResponse))
    }
}
