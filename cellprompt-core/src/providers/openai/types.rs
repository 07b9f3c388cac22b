//! OpenAI chat completions wire types
//!
//! Shared by every provider speaking the OpenAI protocol (OpenAI, Mistral,
//! DeepSeek, Gemini's compatibility endpoint, self-hosted servers).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// OpenAI chat completion request
#[derive(Debug, Serialize)]
pub struct OpenAIRequest {
    pub model: String,
    pub messages: Vec<OpenAIMessage>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<OpenAITool>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<OpenAIResponseFormat>,

    /// Provider-specific fields passed through verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// OpenAI request message
#[derive(Debug, Clone, Serialize)]
pub struct OpenAIMessage {
    pub role: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAIToolCall>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// OpenAI function call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIFunctionCall {
    pub name: String,

    /// JSON-encoded arguments
    #[serde(default)]
    pub arguments: String,
}

/// OpenAI tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIToolCall {
    #[serde(default)]
    pub id: String,

    #[serde(rename = "type", default = "function_type")]
    pub tool_type: String,

    pub function: OpenAIFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

/// OpenAI tool definition
#[derive(Debug, Clone, Serialize)]
pub struct OpenAITool {
    #[serde(rename = "type")]
    pub tool_type: &'static str,
    pub function: OpenAIFunction,
}

/// OpenAI function definition
#[derive(Debug, Clone, Serialize)]
pub struct OpenAIFunction {
    pub name: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,

    pub parameters: Value,
}

/// OpenAI response format
#[derive(Debug, Clone, Serialize)]
pub struct OpenAIResponseFormat {
    #[serde(rename = "type")]
    pub format_type: &'static str,
    pub json_schema: OpenAIJsonSchema,
}

/// Named JSON schema for `response_format`
#[derive(Debug, Clone, Serialize)]
pub struct OpenAIJsonSchema {
    pub name: &'static str,
    pub schema: Value,
    pub strict: bool,
}

/// OpenAI chat completion response
#[derive(Debug, Deserialize)]
pub struct OpenAIResponse {
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub choices: Vec<OpenAIChoice>,

    #[serde(default)]
    pub usage: Option<OpenAIUsage>,
}

/// OpenAI response choice
#[derive(Debug, Deserialize)]
pub struct OpenAIChoice {
    pub message: OpenAIResponseMessage,

    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Assistant message in a response
///
/// `content` is usually a string; reasoning models may return an array of
/// typed segments instead.
#[derive(Debug, Deserialize)]
pub struct OpenAIResponseMessage {
    #[serde(default)]
    pub content: Option<Value>,

    #[serde(default)]
    pub tool_calls: Option<Vec<OpenAIToolCall>>,

    /// Echoed sampling temperature, when the server reports it
    #[serde(default)]
    pub temperature: Option<f32>,
}

/// OpenAI token usage
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct OpenAIUsage {
    #[serde(default)]
    pub prompt_tokens: u64,

    #[serde(default)]
    pub completion_tokens: u64,
}
