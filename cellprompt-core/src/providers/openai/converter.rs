//! Conversion between prompts and the OpenAI chat completions format

use super::types::*;
use crate::protocol::{Message, Prompt, Role, ToolCall, ToolDefinition};
use crate::providers::{ProviderCapabilities, ProviderId, Usage};
use crate::structured;
use serde_json::Value;

/// Request fields that additional properties may not shadow
const RESERVED_FIELDS: &[&str] = &[
    "model",
    "messages",
    "temperature",
    "max_tokens",
    "max_completion_tokens",
    "tools",
    "response_format",
    "stream",
];

/// Convert a prompt into an OpenAI request
pub fn to_openai_request(
    provider: ProviderId,
    model: String,
    prompt: &Prompt,
    capabilities: &ProviderCapabilities,
) -> OpenAIRequest {
    let options = &prompt.options;

    // OpenAI's own API replaced max_tokens; compatible servers still expect it
    let (max_tokens, max_completion_tokens) = match provider {
        ProviderId::OpenAi => (None, options.max_output_tokens),
        _ => (options.max_output_tokens, None),
    };

    let tools = (capabilities.supports_tools && !options.tools.is_empty())
        .then(|| options.tools.iter().map(to_openai_tool).collect());

    let response_format = capabilities
        .supports_json_schema_responses
        .then(|| structured::json_schema(prompt.output_shape))
        .flatten()
        .map(|schema| OpenAIResponseFormat {
            format_type: "json_schema",
            json_schema: OpenAIJsonSchema {
                name: "cell_output",
                schema,
                strict: true,
            },
        });

    let extra = options
        .additional_properties
        .iter()
        .filter(|(key, _)| !RESERVED_FIELDS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    OpenAIRequest {
        model,
        messages: prompt.messages.iter().flat_map(to_openai_messages).collect(),
        temperature: options.temperature,
        max_tokens,
        max_completion_tokens,
        tools,
        response_format,
        extra,
    }
}

/// One prompt message may expand to several wire messages (one per tool result)
fn to_openai_messages(message: &Message) -> Vec<OpenAIMessage> {
    let text = |content: &str| OpenAIMessage {
        role: role_name(message.role),
        content: Some(content.to_string()),
        tool_calls: None,
        tool_call_id: None,
    };

    match message.role {
        Role::Tool if !message.tool_results.is_empty() => message
            .tool_results
            .iter()
            .map(|result| OpenAIMessage {
                role: "tool",
                content: Some(result.content.clone()),
                tool_calls: None,
                tool_call_id: Some(result.call_id.clone()),
            })
            .collect(),
        // Results without call ids cannot be threaded; show them as user input
        Role::Tool => vec![OpenAIMessage {
            role: "user",
            ..text(&message.content)
        }],
        Role::Assistant if message.has_tool_calls() => vec![OpenAIMessage {
            role: "assistant",
            content: (!message.content.is_empty()).then(|| message.content.clone()),
            tool_calls: Some(message.tool_calls.iter().map(to_openai_tool_call).collect()),
            tool_call_id: None,
        }],
        _ => vec![text(&message.content)],
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn to_openai_tool_call(call: &ToolCall) -> OpenAIToolCall {
    OpenAIToolCall {
        id: call.id.clone(),
        tool_type: "function".to_string(),
        function: OpenAIFunctionCall {
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        },
    }
}

fn to_openai_tool(tool: &ToolDefinition) -> OpenAITool {
    OpenAITool {
        tool_type: "function",
        function: OpenAIFunction {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
        },
    }
}

/// Assistant message, echoed temperature and usage of a response
pub struct Converted {
    pub message: Option<Message>,
    pub temperature: Option<f32>,
    pub usage: Option<Usage>,
}

/// Convert an OpenAI response into an assistant message
pub fn from_openai_response(response: OpenAIResponse) -> Converted {
    let usage = response.usage.map(|u| Usage {
        input_tokens: u.prompt_tokens,
        output_tokens: u.completion_tokens,
    });

    let Some(choice) = response.choices.into_iter().next() else {
        return Converted {
            message: None,
            temperature: None,
            usage,
        };
    };

    let content = match choice.message.content {
        Some(Value::String(text)) => text,
        // Segment arrays are kept verbatim for the thinking-strip behavior
        Some(segments @ Value::Array(_)) => segments.to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    let tool_calls: Vec<ToolCall> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| ToolCall {
            id: call.id,
            name: call.function.name,
            arguments: call.function.arguments,
        })
        .collect();

    Converted {
        message: Some(Message::assistant_with_tool_calls(content, tool_calls)),
        temperature: choice.message.temperature,
        usage,
    }
}
