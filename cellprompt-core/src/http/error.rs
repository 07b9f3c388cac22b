//! HTTP error mapping utilities

use crate::providers::ProviderError;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

/// Map an unsuccessful HTTP response onto a [`ProviderError`]
pub fn map_http_error(
    status: StatusCode,
    headers: Option<&HeaderMap>,
    body: Option<String>,
    request_id: Uuid,
) -> ProviderError {
    let details = body
        .as_deref()
        .and_then(|b| serde_json::from_str::<Value>(b).ok())
        .and_then(|v| extract_error_details(&v));

    let message = details
        .as_ref()
        .map(|d| d.message.clone())
        .or_else(|| body.clone().filter(|b| !b.is_empty()))
        .unwrap_or_else(|| format!("HTTP error {}", status.as_u16()));

    let message_with_id = format!("{} [request_id: {}]", message, request_id);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::AuthenticationError {
            status_code: Some(status.as_u16()),
            message: message_with_id,
        },

        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = headers
                .and_then(|h| h.get(RETRY_AFTER))
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after)
                .or_else(|| {
                    details
                        .and_then(|d| d.retry_after_seconds)
                        .map(Duration::from_secs)
                });

            ProviderError::RateLimit { retry_after }
        }

        StatusCode::NOT_FOUND => ProviderError::ModelNotAvailable {
            model: extract_model_from_error(&message).unwrap_or_else(|| "unknown".to_string()),
            status_code: status.as_u16(),
            message: message_with_id,
        },

        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ProviderError::Timeout,

        status if status.is_server_error() => ProviderError::ServerError {
            status_code: status.as_u16(),
            message: message_with_id,
        },

        status => ProviderError::InvalidRequest {
            status_code: status.as_u16(),
            message: message_with_id,
        },
    }
}

struct ErrorDetails {
    message: String,
    retry_after_seconds: Option<u64>,
}

fn extract_error_details(json: &Value) -> Option<ErrorDetails> {
    // { "error": { "message": "...", "type": "..." } } (OpenAI, Anthropic, Mistral)
    if let Some(error) = json.get("error") {
        if let Some(message) = error.get("message").and_then(Value::as_str) {
            return Some(ErrorDetails {
                message: message.to_string(),
                retry_after_seconds: error.get("retry_after").and_then(Value::as_u64),
            });
        }
        // { "error": "..." } (Ollama)
        if let Some(message) = error.as_str() {
            return Some(ErrorDetails {
                message: message.to_string(),
                retry_after_seconds: None,
            });
        }
    }

    if let Some(message) = json.get("message").and_then(Value::as_str) {
        return Some(ErrorDetails {
            message: message.to_string(),
            retry_after_seconds: json.get("retry_after").and_then(Value::as_u64),
        });
    }

    // Gemini returns a list of error envelopes
    if let Some(first) = json.as_array().and_then(|items| items.first()) {
        return extract_error_details(first);
    }

    None
}

/// Pull a quoted model name out of messages like `model 'x' not found`
fn extract_model_from_error(message: &str) -> Option<String> {
    for (open, close) in [("model '", '\''), ("model \"", '"')] {
        if let Some(start) = message.find(open) {
            let start = start + open.len();
            if let Some(end) = message[start..].find(close) {
                return Some(message[start..start + end].to_string());
            }
        }
    }
    None
}

/// Parse a Retry-After header given in whole or fractional seconds
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let value = header_value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    value
        .parse::<f64>()
        .ok()
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(Duration::from_secs_f64)
}
