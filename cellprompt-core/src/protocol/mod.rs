//! Protocol module for the prompt data model
//!
//! This module defines the canonical conversation state threaded through the
//! request pipeline. These structures are designed to be:
//! - Provider-agnostic
//! - Deterministically serializable (they double as cache keys)
//! - Cheap to rebuild between pipeline stages

pub mod types;

pub use types::{
    Message, Options, OutputShape, Prompt, PromptBuilder, Role, ToolCall, ToolDefinition,
    ToolResult,
};
