//! OpenAI protocol family
//!
//! Serves OpenAI itself and every provider exposing a compatible
//! `/chat/completions` endpoint.

mod client;
pub mod converter;
pub mod types;

pub use client::OpenAIAdapter;
pub use types::{OpenAIRequest, OpenAIResponse};
