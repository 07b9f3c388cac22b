//! Configuration validation beyond the structural checks in the schema

use super::error::ValidationError;
use super::schema::CellpromptConfig;
use super::secrets::SafeLogging;
use tracing::{debug, warn};

/// Runs schema validation plus advisory checks that only warn
#[derive(Debug, Default)]
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a configuration with extended rules
    pub fn validate(&self, config: &CellpromptConfig) -> Result<(), ValidationError> {
        config.validate()?;

        self.check_tool_depth(config);
        self.check_capability_overrides(config);

        for provider in &config.providers {
            debug!("Configured provider {}", provider.safe_for_logging());
        }

        Ok(())
    }

    fn check_tool_depth(&self, config: &CellpromptConfig) {
        if config.tools.max_tool_depth == 0
            && (config.tools.file_reader || config.tools.file_search)
        {
            warn!("tools.max_tool_depth is 0, so enabled tools can never be used");
        }
    }

    fn check_capability_overrides(&self, config: &CellpromptConfig) {
        for provider in &config.providers {
            let Some(capabilities) = &provider.capabilities else {
                continue;
            };
            if !capabilities.supports_tools && capabilities.supports_structured_output_with_tools {
                warn!(
                    "{} claims structured output with tools but does not support tools",
                    provider.provider
                );
            }
        }
    }
}
