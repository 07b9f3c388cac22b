//! Core protocol types for model interactions
//!
//! A [`Prompt`] is treated as immutable by convention: every pipeline stage
//! that needs to change it builds a new value (usually through
//! [`Prompt::with_message`] or a clone) instead of mutating the caller's copy.
//! All maps use ordered collections so that serializing the same prompt twice
//! yields byte-identical JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Role of a message in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions that guide the model's behavior
    System,
    /// User input message
    User,
    /// Assistant (model) response
    Assistant,
    /// Aggregated tool results fed back to the model
    Tool,
}

/// A model-initiated request to run a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned (or synthesized) call identifier
    pub id: String,

    /// Name of the tool to run
    pub name: String,

    /// Serialized JSON arguments
    pub arguments: String,
}

/// Outcome of a single tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Identifier of the call this result answers
    pub call_id: String,

    /// Name of the tool that ran
    pub name: String,

    /// Serialized result, or an error string when the tool failed
    pub content: String,
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender
    pub role: Role,

    /// Text content of the message
    pub content: String,

    /// Tool calls requested by the assistant
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Tool results carried by a tool message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResult>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create an assistant message that asks for tool calls
    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::new(Role::Assistant, content)
        }
    }

    /// Create a single tool message aggregating every result of one turn.
    ///
    /// The text content is a JSON array of `{"name", "result"}` pairs so that
    /// providers without native tool messages still see every result.
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        let pairs: Vec<Value> = results
            .iter()
            .map(|r| serde_json::json!({ "name": r.name, "result": r.content }))
            .collect();
        Self {
            tool_results: results,
            ..Self::new(Role::Tool, Value::Array(pairs).to_string())
        }
    }

    /// Whether the assistant asked for at least one tool call
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Tool declaration advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,

    /// Human readable description
    pub description: String,

    /// Parameters schema (JSON Schema)
    pub parameters: Value,
}

/// Generation options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Options {
    /// Model identifier; `None` resolves to the provider's default model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Sampling temperature in the normalized range 0.0 to 1.0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum output tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,

    /// Declared tools
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Provider-specific request fields merged into the wire body
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_properties: BTreeMap<String, Value>,
}

/// Desired spreadsheet layout of the answer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputShape {
    /// Plain text in a single cell
    #[default]
    None,
    /// A single row (1×N)
    Row,
    /// A single column (N×1)
    Column,
    /// A two dimensional range
    Range,
}

/// Full conversation state threaded through the pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    /// Ordered conversation
    pub messages: Vec<Message>,

    /// Generation options
    #[serde(default)]
    pub options: Options,

    /// Desired output layout
    #[serde(default)]
    pub output_shape: OutputShape,
}

impl Prompt {
    /// Create a prompt with default options
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    /// Return a new prompt with `message` appended; `self` is consumed
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Return a new prompt with replaced options
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// The system message, if any
    pub fn system_message(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.role == Role::System)
    }

    /// Number of system messages; exactly one is expected before dispatch
    pub fn system_message_count(&self) -> usize {
        self.messages.iter().filter(|m| m.role == Role::System).count()
    }

    /// The last message of the conversation
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Text of the last assistant message
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }

    /// Whether any message carries tool results
    pub fn has_tool_messages(&self) -> bool {
        self.messages.iter().any(|m| m.role == Role::Tool)
    }

    /// Whether the caller asked for a structured answer
    pub fn wants_structured_output(&self) -> bool {
        self.output_shape != OutputShape::None
    }
}

/// Builder for constructing prompts
#[derive(Debug, Default)]
pub struct PromptBuilder {
    system: Option<String>,
    messages: Vec<Message>,
    options: Options,
    output_shape: OutputShape,
}

impl PromptBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the system message; a later call replaces an earlier one
    pub fn system(mut self, content: impl Into<String>) -> Self {
        self.system = Some(content.into());
        self
    }

    /// Append a user message
    pub fn user(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message::user(content));
        self
    }

    /// Append an arbitrary message
    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Set the model
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.options.model = Some(model.into());
        self
    }

    /// Set temperature (normalized 0.0 to 1.0)
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.options.temperature = Some(temperature);
        self
    }

    /// Set max output tokens
    pub fn max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.options.max_output_tokens = Some(max_output_tokens);
        self
    }

    /// Declare tools
    pub fn tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.options.tools = tools;
        self
    }

    /// Add a provider-specific request field
    pub fn additional_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.additional_properties.insert(key.into(), value);
        self
    }

    /// Set the desired output shape
    pub fn output_shape(mut self, shape: OutputShape) -> Self {
        self.output_shape = shape;
        self
    }

    /// Build the prompt; the system message, when set, is always first
    pub fn build(self) -> Prompt {
        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        if let Some(system) = self.system {
            messages.push(Message::system(system));
        }
        messages.extend(self.messages);

        Prompt {
            messages,
            options: self.options,
            output_shape: self.output_shape,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_puts_system_first() {
        let prompt = PromptBuilder::new()
            .user("A1:B2 contents")
            .system("Answer briefly")
            .temperature(0.2)
            .build();

        assert_eq!(prompt.messages[0].role, Role::System);
        assert_eq!(prompt.messages[1].role, Role::User);
        assert_eq!(prompt.system_message_count(), 1);
        assert_eq!(prompt.options.temperature, Some(0.2));
    }

    #[test]
    fn test_with_message_leaves_original_untouched() {
        let original = PromptBuilder::new().system("s").user("u").build();
        let extended = original.clone().with_message(Message::assistant("a"));

        assert_eq!(original.messages.len(), 2);
        assert_eq!(extended.messages.len(), 3);
        assert_eq!(extended.last_assistant_text(), Some("a"));
    }

    #[test]
    fn test_tool_results_message_aggregates_pairs() {
        let message = Message::tool_results(vec![
            ToolResult {
                call_id: "1".into(),
                name: "FileReader".into(),
                content: "hello".into(),
            },
            ToolResult {
                call_id: "2".into(),
                name: "FileSearch".into(),
                content: "[]".into(),
            },
        ]);

        assert_eq!(message.role, Role::Tool);
        let parsed: Value = serde_json::from_str(&message.content).unwrap();
        assert_eq!(parsed[0]["name"], "FileReader");
        assert_eq!(parsed[1]["result"], "[]");
    }

    #[test]
    fn test_serialization_is_stable() {
        let prompt = PromptBuilder::new()
            .system("s")
            .user("u")
            .additional_property("zeta", serde_json::json!(1))
            .additional_property("alpha", serde_json::json!(2))
            .build();

        let first = serde_json::to_string(&prompt).unwrap();
        let second = serde_json::to_string(&prompt.clone()).unwrap();
        assert_eq!(first, second);
        assert!(first.find("alpha").unwrap() < first.find("zeta").unwrap());
    }
}
