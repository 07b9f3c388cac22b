//! Temperature remapping and pinning

use super::BehaviorContext;
use crate::protocol::Prompt;
use crate::providers::ProviderId;
use tracing::debug;

/// Model families that only accept the default temperature
pub const PINNED_TEMPERATURE_MODEL_PREFIXES: &[&str] = &["gpt-5", "o1", "o3", "o4"];

const PINNED_TEMPERATURE: f32 = 1.0;

pub(super) fn remap_enabled(ctx: &BehaviorContext<'_>) -> bool {
    ctx.capabilities.max_temperature > 1.0
}

/// Caller range [0, 1] to provider range [0, max]
pub(super) fn remap_before(ctx: &BehaviorContext<'_>, mut prompt: Prompt) -> Prompt {
    let max = ctx.capabilities.max_temperature;
    if let Some(t) = prompt.options.temperature {
        prompt.options.temperature = Some((t * max).clamp(0.0, max));
    }
    prompt
}

/// Provider range back to the caller's [0, 1]
pub(super) fn remap_after(ctx: &BehaviorContext<'_>, mut prompt: Prompt) -> Prompt {
    let max = ctx.capabilities.max_temperature;
    if let Some(t) = prompt.options.temperature {
        prompt.options.temperature = Some((t / max).clamp(0.0, 1.0));
    }
    prompt
}

pub(super) fn pin_enabled(ctx: &BehaviorContext<'_>) -> bool {
    matches!(ctx.provider, ProviderId::OpenAi | ProviderId::OpenAiCompatible)
}

pub(super) fn pin_before(mut prompt: Prompt) -> Prompt {
    let pinned = prompt.options.model.as_deref().is_some_and(|model| {
        PINNED_TEMPERATURE_MODEL_PREFIXES
            .iter()
            .any(|prefix| model.starts_with(prefix))
    });
    if pinned {
        debug!(
            "Pinning temperature to {} for {:?}",
            PINNED_TEMPERATURE, prompt.options.model
        );
        prompt.options.temperature = Some(PINNED_TEMPERATURE);
    }
    prompt
}
