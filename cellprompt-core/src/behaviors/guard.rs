//! Structured output and tools conflict guard

use super::BehaviorContext;
use crate::error::{ClientError, ClientResult};
use crate::protocol::Prompt;

pub(super) fn is_enabled(ctx: &BehaviorContext<'_>) -> bool {
    ctx.capabilities.conflicts_with_tools()
}

pub(super) fn before(ctx: &BehaviorContext<'_>, prompt: Prompt) -> ClientResult<Prompt> {
    if prompt.wants_structured_output() && !prompt.options.tools.is_empty() {
        return Err(ClientError::UnsupportedCombination {
            provider: ctx.provider,
            message: format!(
                "{} cannot combine a {:?} output schema with {} declared tools; \
                 drop the tools or request plain text",
                ctx.provider,
                prompt.output_shape,
                prompt.options.tools.len()
            ),
        });
    }
    Ok(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviors::ProviderBehavior;
    use crate::config::ProviderConfiguration;
    use crate::protocol::{OutputShape, PromptBuilder, ToolDefinition};
    use crate::providers::ProviderId;
    use serde_json::json;

    fn tool() -> ToolDefinition {
        ToolDefinition {
            name: "search".into(),
            description: "Search".into(),
            parameters: json!({"type": "object"}),
        }
    }

    #[test]
    fn test_rejects_structured_with_tools() {
        let configuration = ProviderConfiguration::new(ProviderId::Gemini, "gemini-2.5-flash");
        let capabilities = configuration.capabilities();
        let ctx = BehaviorContext {
            provider: ProviderId::Gemini,
            capabilities: &capabilities,
            configuration: &configuration,
        };
        assert!(ProviderBehavior::StructuredToolsGuard.is_enabled(&ctx));

        let prompt = PromptBuilder::new()
            .user("x")
            .tools(vec![tool()])
            .output_shape(OutputShape::Range)
            .build();
        let err = before(&ctx, prompt).unwrap_err();
        assert!(matches!(err, ClientError::UnsupportedCombination { provider: ProviderId::Gemini, .. }));

        let prompt = PromptBuilder::new().user("x").tools(vec![tool()]).build();
        assert!(before(&ctx, prompt).is_ok());
    }

    #[test]
    fn test_disabled_where_supported() {
        let configuration = ProviderConfiguration::new(ProviderId::Anthropic, "claude");
        let capabilities = configuration.capabilities();
        let ctx = BehaviorContext {
            provider: ProviderId::Anthropic,
            capabilities: &capabilities,
            configuration: &configuration,
        };
        assert!(!ProviderBehavior::StructuredToolsGuard.is_enabled(&ctx));
    }
}
