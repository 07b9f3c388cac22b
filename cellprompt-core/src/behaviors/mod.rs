//! Provider quirk behaviors
//!
//! Each behavior is a variant of [`ProviderBehavior`] with a fixed order.
//! [`BehaviorTable`] runs the enabled ones in ascending order both before the
//! adapter call and after it.

mod guard;
mod properties;
mod temperature;
mod thinking;

pub use temperature::PINNED_TEMPERATURE_MODEL_PREFIXES;

use crate::config::ProviderConfiguration;
use crate::error::ClientResult;
use crate::protocol::Prompt;
use crate::providers::{ProviderCapabilities, ProviderId};
use tracing::trace;

/// What a behavior may inspect about the target provider
#[derive(Debug, Clone, Copy)]
pub struct BehaviorContext<'a> {
    pub provider: ProviderId,
    pub capabilities: &'a ProviderCapabilities,
    pub configuration: &'a ProviderConfiguration,
}

/// One provider quirk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderBehavior {
    /// Rejects structured output combined with tools where unsupported
    StructuredToolsGuard,
    /// Maps the caller's [0, 1] temperature onto a wider provider range
    TemperatureRemap,
    /// Merges configured extra request fields into the options
    AdditionalProperties,
    /// Keeps only the answer segments of a reasoning model's reply
    ThinkingStrip,
    /// Forces the temperature some model families require
    TemperaturePin,
}

impl ProviderBehavior {
    pub const ALL: [ProviderBehavior; 5] = [
        ProviderBehavior::StructuredToolsGuard,
        ProviderBehavior::TemperatureRemap,
        ProviderBehavior::AdditionalProperties,
        ProviderBehavior::ThinkingStrip,
        ProviderBehavior::TemperaturePin,
    ];

    pub fn order(&self) -> u32 {
        match self {
            ProviderBehavior::StructuredToolsGuard => 0,
            ProviderBehavior::TemperatureRemap => 10,
            ProviderBehavior::AdditionalProperties => 20,
            ProviderBehavior::ThinkingStrip => 30,
            ProviderBehavior::TemperaturePin => 40,
        }
    }

    pub fn is_enabled(&self, ctx: &BehaviorContext<'_>) -> bool {
        match self {
            ProviderBehavior::StructuredToolsGuard => guard::is_enabled(ctx),
            ProviderBehavior::TemperatureRemap => temperature::remap_enabled(ctx),
            ProviderBehavior::AdditionalProperties => properties::is_enabled(ctx),
            ProviderBehavior::ThinkingStrip => thinking::is_enabled(ctx),
            ProviderBehavior::TemperaturePin => temperature::pin_enabled(ctx),
        }
    }

    pub fn before(&self, ctx: &BehaviorContext<'_>, prompt: Prompt) -> ClientResult<Prompt> {
        match self {
            ProviderBehavior::StructuredToolsGuard => guard::before(ctx, prompt),
            ProviderBehavior::TemperatureRemap => Ok(temperature::remap_before(ctx, prompt)),
            ProviderBehavior::AdditionalProperties => Ok(properties::before(ctx, prompt)),
            ProviderBehavior::ThinkingStrip => Ok(prompt),
            ProviderBehavior::TemperaturePin => Ok(temperature::pin_before(prompt)),
        }
    }

    pub fn after(&self, ctx: &BehaviorContext<'_>, prompt: Prompt) -> ClientResult<Prompt> {
        match self {
            ProviderBehavior::TemperatureRemap => Ok(temperature::remap_after(ctx, prompt)),
            ProviderBehavior::ThinkingStrip => Ok(thinking::after(prompt)),
            ProviderBehavior::StructuredToolsGuard
            | ProviderBehavior::AdditionalProperties
            | ProviderBehavior::TemperaturePin => Ok(prompt),
        }
    }
}

/// Ordered set of behaviors applied around every adapter call
#[derive(Debug, Clone)]
pub struct BehaviorTable {
    behaviors: Vec<ProviderBehavior>,
}

impl Default for BehaviorTable {
    fn default() -> Self {
        Self::new(ProviderBehavior::ALL.to_vec())
    }
}

impl BehaviorTable {
    /// Table of `behaviors`, sorted by order
    pub fn new(mut behaviors: Vec<ProviderBehavior>) -> Self {
        behaviors.sort_by_key(ProviderBehavior::order);
        behaviors.dedup();
        Self { behaviors }
    }

    /// Behaviors enabled for `ctx`, in execution order
    pub fn enabled(&self, ctx: &BehaviorContext<'_>) -> Vec<ProviderBehavior> {
        self.behaviors
            .iter()
            .copied()
            .filter(|behavior| behavior.is_enabled(ctx))
            .collect()
    }

    pub fn before(&self, ctx: &BehaviorContext<'_>, mut prompt: Prompt) -> ClientResult<Prompt> {
        for behavior in self.enabled(ctx) {
            trace!("before {:?} for {}", behavior, ctx.provider);
            prompt = behavior.before(ctx, prompt)?;
        }
        Ok(prompt)
    }

    pub fn after(&self, ctx: &BehaviorContext<'_>, mut prompt: Prompt) -> ClientResult<Prompt> {
        for behavior in self.enabled(ctx) {
            trace!("after {:?} for {}", behavior, ctx.provider);
            prompt = behavior.after(ctx, prompt)?;
        }
        Ok(prompt)
    }
}
