//! Conversion between prompts and the Anthropic Messages format

use super::types::*;
use crate::protocol::{Message, Prompt, Role, ToolCall};
use crate::providers::{ProviderCapabilities, Usage};
use serde_json::Value;
use tracing::warn;

/// Output budget used when the caller sets none; the API requires one
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

const RESERVED_FIELDS: &[&str] = &["model", "max_tokens", "system", "messages", "temperature", "tools", "stream"];

/// Convert a prompt into a Messages API request
///
/// System messages move to the top-level `system` field. Tool results travel
/// as `tool_result` blocks inside a user turn, and adjacent turns with the same
/// role are merged because the API requires alternation.
pub fn to_anthropic_request(
    model: String,
    prompt: &Prompt,
    capabilities: &ProviderCapabilities,
) -> AnthropicRequest {
    let options = &prompt.options;

    let system: Vec<&str> = prompt
        .messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();

    let mut messages: Vec<AnthropicMessage> = Vec::new();
    for message in prompt.messages.iter().filter(|m| m.role != Role::System) {
        let converted = to_anthropic_message(message);
        match messages.last_mut() {
            Some(last) if last.role == converted.role => last.content.extend(converted.content),
            _ => messages.push(converted),
        }
    }

    let tools = if capabilities.supports_tools {
        options
            .tools
            .iter()
            .map(|tool| AnthropicTool {
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema: tool.parameters.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    AnthropicRequest {
        model,
        max_tokens: options.max_output_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        system: (!system.is_empty()).then(|| system.join("\n\n")),
        messages,
        temperature: options.temperature,
        tools,
        extra: options
            .additional_properties
            .iter()
            .filter(|(key, _)| !RESERVED_FIELDS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    }
}

fn to_anthropic_message(message: &Message) -> AnthropicMessage {
    let mut content = Vec::new();

    match message.role {
        Role::Tool if !message.tool_results.is_empty() => {
            content.extend(message.tool_results.iter().map(|result| ContentBlock::ToolResult {
                tool_use_id: result.call_id.clone(),
                content: result.content.clone(),
            }));
        }
        _ => {
            if !message.content.is_empty() {
                content.push(ContentBlock::Text {
                    text: message.content.clone(),
                });
            }
            content.extend(message.tool_calls.iter().map(|call| ContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: parse_arguments(call),
            }));
        }
    }

    AnthropicMessage {
        role: if message.role == Role::Assistant { "assistant" } else { "user" },
        content,
    }
}

fn parse_arguments(call: &ToolCall) -> Value {
    if call.arguments.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(&call.arguments).unwrap_or_else(|e| {
        warn!("Tool call {} has invalid JSON arguments: {}", call.name, e);
        Value::Object(Default::default())
    })
}

/// Convert a Messages API response into an assistant message and usage
pub fn from_anthropic_response(response: AnthropicResponse) -> (Message, Option<Usage>) {
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for block in response.content {
        match block {
            ContentBlock::Text { text: segment } => text.push_str(&segment),
            ContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                id,
                name,
                arguments: input.to_string(),
            }),
            ContentBlock::ToolResult { .. } | ContentBlock::Other => {}
        }
    }

    let usage = response.usage.map(|u| Usage {
        input_tokens: u.input_tokens,
        output_tokens: u.output_tokens,
    });

    (Message::assistant_with_tool_calls(text, tool_calls), usage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{PromptBuilder, ToolDefinition, ToolResult};
    use crate::providers::ProviderId;
    use serde_json::json;

    fn capabilities() -> ProviderCapabilities {
        ProviderCapabilities::for_provider(ProviderId::Anthropic)
    }

    #[test]
    fn test_system_moves_to_top_level() {
        let prompt = PromptBuilder::new().system("be brief").user("hi").build();
        let body = serde_json::to_value(to_anthropic_request("claude".into(), &prompt, &capabilities())).unwrap();

        assert_eq!(body["system"], "be brief");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"][0], json!({"type": "text", "text": "hi"}));
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn test_tool_round_trip_blocks() {
        let call = ToolCall {
            id: "toolu_1".into(),
            name: "read_file".into(),
            arguments: r#"{"path":"a.txt"}"#.into(),
        };
        let prompt = PromptBuilder::new()
            .user("read it")
            .tools(vec![ToolDefinition {
                name: "read_file".into(),
                description: "Read a file".into(),
                parameters: json!({"type": "object"}),
            }])
            .build()
            .with_message(Message::assistant_with_tool_calls("Reading.", vec![call]))
            .with_message(Message::tool_results(vec![ToolResult {
                call_id: "toolu_1".into(),
                name: "read_file".into(),
                content: "contents".into(),
            }]));

        let body = serde_json::to_value(to_anthropic_request("claude".into(), &prompt, &capabilities())).unwrap();

        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
        assert_eq!(body["messages"][1]["content"][1]["type"], "tool_use");
        assert_eq!(body["messages"][1]["content"][1]["input"]["path"], "a.txt");
        assert_eq!(body["messages"][2]["role"], "user");
        assert_eq!(body["messages"][2]["content"][0]["type"], "tool_result");
        assert_eq!(body["messages"][2]["content"][0]["tool_use_id"], "toolu_1");
    }

    #[test]
    fn test_adjacent_user_turns_merge() {
        let prompt = PromptBuilder::new().user("one").user("two").build();
        let request = to_anthropic_request("claude".into(), &prompt, &capabilities());
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].content.len(), 2);
    }

    #[test]
    fn test_response_blocks() {
        let response: AnthropicResponse = serde_json::from_value(json!({
            "content": [
                {"type": "thinking", "thinking": "..."},
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "toolu_2", "name": "search", "input": {"q": "x"}}
            ],
            "usage": {"input_tokens": 10, "output_tokens": 4}
        }))
        .unwrap();

        let (message, usage) = from_anthropic_response(response);
        assert_eq!(message.content, "Let me check.");
        assert_eq!(message.tool_calls[0].id, "toolu_2");
        assert_eq!(message.tool_calls[0].arguments, r#"{"q":"x"}"#);
        assert_eq!(usage.unwrap().output_tokens, 4);
    }
}
