//! Anthropic Messages API wire types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Messages API request
#[derive(Debug, Serialize)]
pub struct AnthropicRequest {
    pub model: String,

    /// Required by the API
    pub max_tokens: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    pub messages: Vec<AnthropicMessage>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<AnthropicTool>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Conversation turn; only `user` and `assistant` roles exist
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnthropicMessage {
    pub role: &'static str,
    pub content: Vec<ContentBlock>,
}

/// Typed content block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
    /// Extended thinking and any block type added later
    #[serde(other)]
    Other,
}

/// Tool declaration
#[derive(Debug, Clone, Serialize)]
pub struct AnthropicTool {
    pub name: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,

    pub input_schema: Value,
}

/// Messages API response
#[derive(Debug, Deserialize)]
pub struct AnthropicResponse {
    #[serde(default)]
    pub content: Vec<ContentBlock>,

    #[serde(default)]
    pub stop_reason: Option<String>,

    #[serde(default)]
    pub usage: Option<AnthropicUsage>,
}

/// Token usage
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AnthropicUsage {
    #[serde(default)]
    pub input_tokens: u64,

    #[serde(default)]
    pub output_tokens: u64,
}
