//! Ollama native API

mod client;
pub mod converter;
pub mod types;

pub use client::OllamaAdapter;
pub use types::{OllamaRequest, OllamaResponse};
