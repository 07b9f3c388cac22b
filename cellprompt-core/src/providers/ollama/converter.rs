//! Conversion between prompts and Ollama's chat format

use super::types::*;
use crate::protocol::{Message, Prompt, Role, ToolCall};
use crate::providers::{ProviderCapabilities, Usage};
use crate::structured;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Additional properties that belong at the top level instead of `options`
const TOP_LEVEL_FIELDS: &[&str] = &["keep_alive", "think"];

/// Convert a prompt into an `/api/chat` request
pub fn to_ollama_request(model: String, prompt: &Prompt, capabilities: &ProviderCapabilities) -> OllamaRequest {
    let options = &prompt.options;

    let mut sampling = Map::new();
    for (key, value) in &options.additional_properties {
        if !TOP_LEVEL_FIELDS.contains(&key.as_str()) {
            sampling.insert(key.clone(), value.clone());
        }
    }
    if let Some(temperature) = options.temperature {
        sampling.insert("temperature".into(), Value::from(temperature));
    }
    if let Some(max_tokens) = options.max_output_tokens {
        sampling.insert("num_predict".into(), Value::from(max_tokens));
    }

    let tools = if capabilities.supports_tools {
        options
            .tools
            .iter()
            .map(|tool| OllamaTool {
                tool_type: "function",
                function: OllamaFunction {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.parameters.clone(),
                },
            })
            .collect()
    } else {
        Vec::new()
    };

    OllamaRequest {
        model,
        messages: prompt.messages.iter().flat_map(to_ollama_messages).collect(),
        stream: false,
        format: capabilities
            .supports_json_schema_responses
            .then(|| structured::json_schema(prompt.output_shape))
            .flatten(),
        options: sampling,
        tools,
        keep_alive: options.additional_properties.get("keep_alive").cloned(),
        think: options.additional_properties.get("think").cloned(),
    }
}

fn to_ollama_messages(message: &Message) -> Vec<OllamaMessage> {
    match message.role {
        Role::Tool if !message.tool_results.is_empty() => message
            .tool_results
            .iter()
            .map(|result| OllamaMessage {
                role: "tool".into(),
                content: result.content.clone(),
                tool_name: Some(result.name.clone()),
                ..Default::default()
            })
            .collect(),
        role => vec![OllamaMessage {
            role: match role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            }
            .into(),
            content: message.content.clone(),
            tool_calls: message
                .tool_calls
                .iter()
                .map(|call| OllamaToolCall {
                    function: OllamaFunctionCall {
                        name: call.name.clone(),
                        arguments: serde_json::from_str(&call.arguments)
                            .unwrap_or_else(|_| Value::Object(Map::new())),
                    },
                })
                .collect(),
            tool_name: None,
        }],
    }
}

/// Convert a response into an assistant message and usage
///
/// Ollama omits tool call ids, so each call gets a fresh one.
pub fn from_ollama_response(response: OllamaResponse) -> (Option<Message>, Option<Usage>) {
    let usage = match (response.prompt_eval_count, response.eval_count) {
        (None, None) => None,
        (input, output) => Some(Usage {
            input_tokens: input.unwrap_or(0),
            output_tokens: output.unwrap_or(0),
        }),
    };

    let message = response.message.map(|message| {
        let calls = message
            .tool_calls
            .into_iter()
            .map(|call| ToolCall {
                id: format!("call_{}", Uuid::new_v4().simple()),
                name: call.function.name,
                arguments: match call.function.arguments {
                    Value::String(raw) => raw,
                    Value::Null => "{}".to_string(),
                    other => other.to_string(),
                },
            })
            .collect();
        Message::assistant_with_tool_calls(message.content, calls)
    });

    (message, usage)
}
