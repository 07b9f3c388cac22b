//! Additional request properties from provider configuration

use super::BehaviorContext;
use crate::protocol::Prompt;

pub(super) fn is_enabled(ctx: &BehaviorContext<'_>) -> bool {
    !ctx.configuration.additional_properties.is_empty()
}

/// Caller-set keys always win over configured ones
pub(super) fn before(ctx: &BehaviorContext<'_>, mut prompt: Prompt) -> Prompt {
    for (key, value) in &ctx.configuration.additional_properties {
        prompt
            .options
            .additional_properties
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
    prompt
}
