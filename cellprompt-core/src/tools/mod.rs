//! Tool invocation
//!
//! The model may answer with tool calls. [`ToolInvoker`] runs every call of a
//! turn concurrently and turns each outcome into a [`ToolResult`]; a failing
//! or unknown tool yields an `Error: ...` result instead of failing the turn.

mod file_reader;
mod file_search;

pub use file_reader::FileReader;
pub use file_search::FileSearch;

use crate::config::ToolsConfig;
use crate::protocol::{ToolCall, ToolDefinition, ToolResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A function the model can call
#[async_trait]
pub trait Tool: Send + Sync {
    /// Declaration advertised to the model
    fn definition(&self) -> ToolDefinition;

    /// Run the tool with the model's serialized JSON arguments
    async fn invoke(&self, arguments: &str, cancel: &CancellationToken) -> anyhow::Result<String>;
}

/// Tools available to the dispatcher, by name
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in tools enabled in `config`
    pub fn from_config(config: &ToolsConfig) -> Self {
        let mut registry = Self::new();
        if !config.file_reader && !config.file_search {
            return registry;
        }

        let Some(root) = config.file_root.clone() else {
            warn!("File tools disabled: tools.file_root is not set");
            return registry;
        };

        if config.file_reader {
            registry.register(Arc::new(FileReader::new(root.clone())));
        }
        if config.file_search {
            registry.register(Arc::new(FileSearch::new(root)));
        }
        registry
    }

    /// Add `tool`, replacing any tool with the same name
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name;
        if self.tools.insert(name.clone(), tool).is_some() {
            debug!("Replaced tool {}", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|tool| tool.definition()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Runs the tool calls of one model turn
#[derive(Debug, Clone, Default)]
pub struct ToolInvoker {
    registry: ToolRegistry,
}

impl ToolInvoker {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run every call concurrently and wait for all of them
    ///
    /// Results are returned in call order.
    pub async fn invoke_all(&self, calls: &[ToolCall], cancel: &CancellationToken) -> Vec<ToolResult> {
        let handles: Vec<_> = calls
            .iter()
            .map(|call| {
                let tool = self.registry.get(&call.name);
                let arguments = call.arguments.clone();
                let name = call.name.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    match tool {
                        Some(tool) => tool.invoke(&arguments, &cancel).await,
                        None => Err(anyhow::anyhow!("unknown tool '{}'", name)),
                    }
                })
            })
            .collect();

        let outcomes = futures::future::join_all(handles).await;

        calls
            .iter()
            .zip(outcomes)
            .map(|(call, outcome)| {
                let content = match outcome {
                    Ok(Ok(output)) => {
                        debug!("Tool {} ({}) returned {} bytes", call.name, call.id, output.len());
                        output
                    }
                    Ok(Err(err)) => {
                        warn!("Tool {} ({}) failed: {:#}", call.name, call.id, err);
                        format!("Error: {:#}", err)
                    }
                    Err(join_err) => {
                        warn!("Tool {} ({}) panicked: {}", call.name, call.id, join_err);
                        format!("Error: tool task failed: {}", join_err)
                    }
                };
                ToolResult {
                    call_id: call.id.clone(),
                    name: call.name.clone(),
                    content,
                }
            })
            .collect()
    }
}

/// Resolve `relative` under `root`, refusing paths that escape it
pub(crate) async fn resolve_in_root(root: &Path, relative: &str) -> anyhow::Result<PathBuf> {
    let root = tokio::fs::canonicalize(root)
        .await
        .map_err(|e| anyhow::anyhow!("root {} is not accessible: {}", root.display(), e))?;
    let candidate = tokio::fs::canonicalize(root.join(relative))
        .await
        .map_err(|e| anyhow::anyhow!("{}: {}", relative, e))?;
    if !candidate.starts_with(&root) {
        anyhow::bail!("{} is outside the tool root", relative);
    }
    Ok(candidate)
}
