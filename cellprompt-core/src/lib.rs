//! Cellprompt Core Library
//!
//! Model request pipeline behind a spreadsheet LLM function. A [`Prompt`] is
//! dispatched to one of several providers through [`Client::send`], which
//! applies rate limiting, response caching, provider quirk behaviors, the
//! per-provider resilience pipeline and the bounded tool loop. The answer is
//! rendered for a cell with [`CellOutput`].
//!
//! ```no_run
//! use cellprompt_core::{Client, ProviderId, PromptBuilder, OutputShape};
//! use cellprompt_core::config::{CellpromptConfig, ProviderConfiguration};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), cellprompt_core::ClientError> {
//! let config = CellpromptConfig::with_providers(vec![
//!     ProviderConfiguration::new(ProviderId::Ollama, "llama3.2"),
//! ]);
//! let client = Client::from_config(&config)?;
//!
//! let prompt = PromptBuilder::new()
//!     .system("You are a spreadsheet assistant.")
//!     .user("List three fruits")
//!     .output_shape(OutputShape::Column)
//!     .build();
//! let cell = client
//!     .send_to_cell(prompt, ProviderId::Ollama, &CancellationToken::new())
//!     .await;
//! println!("{:?}", cell);
//! # Ok(())
//! # }
//! ```

pub mod behaviors;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod protocol;
pub mod providers;
pub mod resilience;
pub mod structured;
pub mod tools;

pub use client::{Client, ClientBuilder};
pub use error::{ClientError, ClientResult};
pub use protocol::{Message, OutputShape, Prompt, PromptBuilder, Role, ToolCall, ToolDefinition, ToolResult};
pub use providers::{ProviderError, ProviderId};
pub use structured::CellOutput;

/// Returns the version of the Cellprompt Core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
