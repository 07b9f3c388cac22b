//! Find files under the tool root by name

use super::{resolve_in_root, Tool};
use crate::protocol::ToolDefinition;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

const DEFAULT_MAX_RESULTS: usize = 100;

#[derive(Debug, Deserialize)]
struct Arguments {
    pattern: String,
    #[serde(default)]
    directory: Option<String>,
    #[serde(default)]
    max_results: Option<usize>,
}

/// Lists files whose name matches a regular expression
#[derive(Debug, Clone)]
pub struct FileSearch {
    root: PathBuf,
}

impl FileSearch {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for FileSearch {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "search_files".into(),
            description: "Find files whose name matches a regular expression. \
                          Returns one relative path per line."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "pattern": { "type": "string", "description": "Regular expression matched against file names" },
                    "directory": { "type": "string", "description": "Relative directory to search, defaults to the root" },
                    "max_results": { "type": "integer", "minimum": 1 }
                },
                "required": ["pattern"]
            }),
        }
    }

    async fn invoke(&self, arguments: &str, cancel: &CancellationToken) -> anyhow::Result<String> {
        let args: Arguments = serde_json::from_str(arguments)?;
        let pattern = Regex::new(&args.pattern)?;
        let limit = args.max_results.unwrap_or(DEFAULT_MAX_RESULTS);
        let root = resolve_in_root(&self.root, ".").await?;
        let start = resolve_in_root(&self.root, args.directory.as_deref().unwrap_or(".")).await?;

        let mut matches = Vec::new();
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            if cancel.is_cancelled() {
                anyhow::bail!("cancelled");
            }
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if file_type.is_file()
                    && pattern.is_match(&entry.file_name().to_string_lossy())
                {
                    let path = entry.path();
                    let relative = path.strip_prefix(&root).unwrap_or(&path);
                    matches.push(relative.to_string_lossy().replace('\\', "/"));
                }
            }
        }

        matches.sort();
        matches.truncate(limit);
        if matches.is_empty() {
            return Ok("No files found".to_string());
        }
        Ok(matches.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("data/2024")).unwrap();
        std::fs::write(dir.path().join("data/sales.csv"), "").unwrap();
        std::fs::write(dir.path().join("data/2024/q1.csv"), "").unwrap();
        std::fs::write(dir.path().join("readme.md"), "").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_finds_nested_files() {
        let dir = tree();
        let out = FileSearch::new(dir.path())
            .invoke(r#"{"pattern":"\\.csv$"}"#, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, "data/2024/q1.csv\ndata/sales.csv");
    }

    #[tokio::test]
    async fn test_limit_and_no_match() {
        let dir = tree();
        let tool = FileSearch::new(dir.path());
        let out = tool
            .invoke(r#"{"pattern":"csv","max_results":1}"#, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.lines().count(), 1);

        let out = tool
            .invoke(r#"{"pattern":"\\.xlsx$"}"#, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, "No files found");
    }

    #[tokio::test]
    async fn test_invalid_regex() {
        let dir = tree();
        assert!(FileSearch::new(dir.path())
            .invoke(r#"{"pattern":"("}"#, &CancellationToken::new())
            .await
            .is_err());
    }
}
