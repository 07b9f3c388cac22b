//! Ollama native chat API wire types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `/api/chat` request
#[derive(Debug, Serialize)]
pub struct OllamaRequest {
    pub model: String,
    pub messages: Vec<OllamaMessage>,
    pub stream: bool,

    /// JSON schema constraining the answer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<Value>,

    /// Sampling options (`temperature`, `num_predict`, ...)
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<OllamaTool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub think: Option<Value>,
}

/// Chat message, used in both directions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OllamaMessage {
    #[serde(default)]
    pub role: String,

    #[serde(default)]
    pub content: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<OllamaToolCall>,

    /// Names the tool a `tool` message answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

/// Tool call; Ollama sends arguments as an object and no id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaToolCall {
    pub function: OllamaFunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaFunctionCall {
    pub name: String,

    #[serde(default)]
    pub arguments: Value,
}

/// Tool declaration
#[derive(Debug, Clone, Serialize)]
pub struct OllamaTool {
    #[serde(rename = "type")]
    pub tool_type: &'static str,
    pub function: OllamaFunction,
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaFunction {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// `/api/chat` response with `stream: false`
#[derive(Debug, Deserialize)]
pub struct OllamaResponse {
    #[serde(default)]
    pub message: Option<OllamaMessage>,

    #[serde(default)]
    pub prompt_eval_count: Option<u64>,

    #[serde(default)]
    pub eval_count: Option<u64>,
}
