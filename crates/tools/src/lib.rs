//! Reference tools for Stepwise.
//!
//! Tools give the agent the ability to act: exact arithmetic and a
//! per-agent file store. The `Agent` tool (completion, feedback, memory)
//! is part of `stepwise-agent` and always registered by the control loop.

pub mod calculator;
pub mod file_store;

use std::path::PathBuf;
use stepwise_core::tool::ToolRegistry;

pub use calculator::CalcTool;
pub use file_store::{FileMetadata, FileStoreTool};

/// Create a registry with every reference tool.
///
/// `files_dir` is the root under which `FileStore` keeps one directory per agent.
pub fn default_registry(files_dir: impl Into<PathBuf>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register("Calc", Box::new(CalcTool));
    registry.register("FileStore", Box::new(FileStoreTool::new(files_dir)));
    registry
}
