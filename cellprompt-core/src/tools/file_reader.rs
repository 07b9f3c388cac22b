//! Read a UTF-8 file under the tool root

use super::{resolve_in_root, Tool};
use crate::protocol::ToolDefinition;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

const DEFAULT_MAX_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Deserialize)]
struct Arguments {
    path: String,
}

/// Returns the contents of one file
#[derive(Debug, Clone)]
pub struct FileReader {
    root: PathBuf,
    max_bytes: u64,
}

impl FileReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

#[async_trait]
impl Tool for FileReader {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "read_file".into(),
            description: "Read the text content of a file. Paths are relative to the workspace root.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Relative path of the file" }
                },
                "required": ["path"]
            }),
        }
    }

    async fn invoke(&self, arguments: &str, cancel: &CancellationToken) -> anyhow::Result<String> {
        let args: Arguments = serde_json::from_str(arguments)?;
        let path = resolve_in_root(&self.root, &args.path).await?;

        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            anyhow::bail!("{} is not a file", args.path);
        }
        if metadata.len() > self.max_bytes {
            anyhow::bail!(
                "{} is {} bytes, larger than the {} byte limit",
                args.path,
                metadata.len(),
                self.max_bytes
            );
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => anyhow::bail!("cancelled"),
            content = tokio::fs::read_to_string(&path) => Ok(content?),
        }
    }
}
