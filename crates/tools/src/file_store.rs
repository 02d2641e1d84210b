//! `FileStore` tool: a per-agent scratch directory for larger artifacts.
//!
//! Files live under `<base_dir>/<agent_id>/`. Descriptions given at save
//! time are kept in a `.metadata.json` next to them so `listFiles` can tell
//! the model what each file holds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use stepwise_core::error::ToolError;
use stepwise_core::tool::{Tool, ToolContext, ToolMember};
use tracing::{debug, warn};

const METADATA_FILE: &str = ".metadata.json";

/// What `listFiles` reports for each stored file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub filename: String,
    pub description: String,
    pub size_kb: String,
    pub last_updated: DateTime<Utc>,
}

pub struct FileStoreTool {
    base_dir: PathBuf,
}

impl FileStoreTool {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn agent_dir(&self, agent_id: &str) -> Result<PathBuf, ToolError> {
        let id = Path::new(agent_id);
        if agent_id.is_empty() || id.components().count() != 1 || !is_plain(id) {
            return Err(ToolError::InvalidArguments(format!("Invalid agent id '{agent_id}'")));
        }
        Ok(self.base_dir.join(agent_id))
    }

    /// Resolve a model-supplied filename inside the agent directory.
    fn resolve(&self, agent_id: &str, filename: &str) -> Result<PathBuf, ToolError> {
        let relative = Path::new(filename);
        if filename.trim().is_empty() || !is_plain(relative) {
            return Err(ToolError::InvalidArguments(format!(
                "Filename '{filename}' must be a relative path without '..'"
            )));
        }
        if relative.file_name().is_some_and(|name| name == METADATA_FILE) {
            return Err(ToolError::InvalidArguments(format!("'{METADATA_FILE}' is reserved")));
        }
        Ok(self.agent_dir(agent_id)?.join(relative))
    }

    async fn read_metadata(dir: &Path) -> BTreeMap<String, FileMetadata> {
        match tokio::fs::read_to_string(dir.join(METADATA_FILE)).await {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(dir = %dir.display(), error = %e, "Ignoring unreadable file metadata");
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        }
    }

    async fn save_file(
        &self,
        agent_id: &str,
        filename: &str,
        contents: &str,
        description: &str,
    ) -> Result<Value, ToolError> {
        let path = self.resolve(agent_id, filename)?;
        let dir = self.agent_dir(agent_id)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| io_failed("saveFile", e))?;
        }
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| io_failed("saveFile", e))?;

        let stats = tokio::fs::metadata(&path)
            .await
            .map_err(|e| io_failed("saveFile", e))?;
        let mut metadata = Self::read_metadata(&dir).await;
        metadata.insert(
            filename.to_string(),
            FileMetadata {
                filename: filename.to_string(),
                description: description.to_string(),
                size_kb: format!("{:.2}", stats.len() as f64 / 1024.0),
                last_updated: modified(&stats),
            },
        );
        let json = serde_json::to_string_pretty(&metadata).map_err(|e| io_failed("saveFile", e))?;
        tokio::fs::write(dir.join(METADATA_FILE), json)
            .await
            .map_err(|e| io_failed("saveFile", e))?;

        debug!(agent_id, filename, bytes = stats.len(), "File saved");
        Ok(Value::Null)
    }

    async fn get_file(&self, agent_id: &str, filename: &str) -> Result<Value, ToolError> {
        let path = self.resolve(agent_id, filename)?;
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| io_failed("getFile", format!("{filename}: {e}")))?;
        Ok(Value::String(contents))
    }

    async fn list_files(&self, agent_id: &str) -> Result<Value, ToolError> {
        let dir = self.agent_dir(agent_id)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_failed("listFiles", e))?;
        let metadata = Self::read_metadata(&dir).await;

        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| io_failed("listFiles", e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_failed("listFiles", e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == METADATA_FILE {
                continue;
            }
            let stats = entry.metadata().await.map_err(|e| io_failed("listFiles", e))?;
            if !stats.is_file() {
                continue;
            }
            files.push(FileMetadata {
                description: metadata
                    .get(&name)
                    .map(|m| m.description.clone())
                    .unwrap_or_default(),
                filename: name,
                size_kb: format!("{:.0}", stats.len() as f64 / 1024.0),
                last_updated: modified(&stats),
            });
        }
        files.sort_by(|a, b| a.filename.cmp(&b.filename));

        serde_json::to_value(files).map_err(|e| io_failed("listFiles", e))
    }
}

#[async_trait]
impl Tool for FileStoreTool {
    fn description(&self) -> &str {
        "Stores files for the current agent so large content doesn't need to stay in memory"
    }

    fn members(&self) -> Vec<ToolMember> {
        vec![
            ToolMember::operation("saveFile", "Saves the contents to a file and records its description")
                .param("filename", "string", "The name of the file to save")
                .param("contents", "string", "The contents to save to the file")
                .param(
                    "description",
                    "string",
                    "A description of the contents which can be used to identify it later",
                ),
            ToolMember::operation("getFile", "Retrieves the contents of a file")
                .param("filename", "string", "The name of the file to read"),
            ToolMember::operation("listFiles", "Lists the stored files with their descriptions"),
        ]
    }

    async fn call(
        &self,
        operation: &str,
        args: Vec<Value>,
        ctx: &mut ToolContext<'_>,
    ) -> Result<Value, ToolError> {
        match operation {
            "saveFile" => {
                self.save_file(
                    ctx.agent_id,
                    &string_arg(&args, 0, "filename")?,
                    &string_arg(&args, 1, "contents")?,
                    &optional_string_arg(&args, 2),
                )
                .await
            }
            "getFile" => self.get_file(ctx.agent_id, &string_arg(&args, 0, "filename")?).await,
            "listFiles" => self.list_files(ctx.agent_id).await,
            other => Err(ToolError::ExecutionFailed {
                operation: format!("FileStore.{other}"),
                reason: "unsupported operation".into(),
            }),
        }
    }
}

/// Only plain, relative components (no root, no `..`, no drive prefix).
fn is_plain(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_)))
}

fn string_arg(args: &[Value], index: usize, name: &str) -> Result<String, ToolError> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Null) | None => Err(ToolError::InvalidArguments(format!("{name} is required"))),
        // Typed values (numbers, arrays) are stored as their JSON text
        Some(other) => Ok(other.to_string()),
    }
}

fn optional_string_arg(args: &[Value], index: usize) -> String {
    string_arg(args, index, "").unwrap_or_default()
}

fn modified(stats: &std::fs::Metadata) -> DateTime<Utc> {
    stats.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now())
}

fn io_failed(operation: &str, e: impl std::fmt::Display) -> ToolError {
    ToolError::ExecutionFailed {
        operation: format!("FileStore.{operation}"),
        reason: e.to_string(),
    }
}
