//! Anthropic Messages API

mod client;
pub mod converter;
pub mod types;

pub use client::{AnthropicAdapter, ANTHROPIC_VERSION};
pub use types::{AnthropicRequest, AnthropicResponse};
