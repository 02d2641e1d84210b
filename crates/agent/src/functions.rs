//! The built-in `Agent` tool: run control and memory.
//!
//! `completed` and `requestFeedback` are recognised by the control loop by
//! name; calling them ends or suspends the run after the call is recorded.

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use stepwise_core::error::ToolError;
use stepwise_core::tool::{Tool, ToolContext, ToolMember};
use tracing::{debug, info};

/// Registration name of the built-in tool.
pub const AGENT_TOOL: &str = "Agent";

/// Calling this ends the run in `completed`.
pub const COMPLETED: &str = "Agent.completed";

/// Calling this suspends the run in `feedback` until a supervisor answers.
pub const REQUEST_FEEDBACK: &str = "Agent.requestFeedback";

// Memory keys become element names in the rendered prompt
static MEMORY_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.-]*$").expect("valid regex"));

pub struct AgentTool;

#[async_trait]
impl Tool for AgentTool {
    fn description(&self) -> &str {
        "Controls the agent itself: memory, feedback requests and completion"
    }

    fn members(&self) -> Vec<ToolMember> {
        vec![
            ToolMember::operation("completed", "Call once the goal has been achieved")
                .param("note", "string", "A summary of the outcome"),
            ToolMember::operation(
                "requestFeedback",
                "Pause and ask the supervisor for a decision or missing information",
            )
            .param("request", "string", "What you need from the supervisor"),
            ToolMember::operation("saveMemory", "Saves content under a key, replacing any previous value")
                .param("key", "string", "Name of the memory entry (letters, digits, _ . -)")
                .param("content", "string", "The content to remember"),
            ToolMember::operation("deleteMemory", "Removes a memory entry")
                .param("key", "string", "Name of the memory entry"),
            ToolMember::operation("getMemory", "Returns the content of a memory entry")
                .param("key", "string", "Name of the memory entry"),
        ]
    }

    async fn call(
        &self,
        operation: &str,
        args: Vec<Value>,
        ctx: &mut ToolContext<'_>,
    ) -> Result<Value, ToolError> {
        match operation {
            "completed" => {
                let note = text_arg(&args, 0).unwrap_or_default();
                info!(agent_id = %ctx.agent_id, note = %note, "Agent reported completion");
                Ok(Value::Null)
            }
            "requestFeedback" => {
                let request = text_arg(&args, 0).unwrap_or_default();
                info!(agent_id = %ctx.agent_id, request = %request, "Agent requested feedback");
                // Replaced by the supervisor's answer on resume
                Ok(Value::String(String::new()))
            }
            "saveMemory" => {
                let key = memory_key(&args)?;
                let content = text_arg(&args, 1)
                    .ok_or_else(|| ToolError::InvalidArguments("content is required".into()))?;
                debug!(agent_id = %ctx.agent_id, key = %key, "Saving memory");
                ctx.memory.insert(key, content);
                Ok(Value::Null)
            }
            "deleteMemory" => {
                let key = memory_key(&args)?;
                ctx.memory.remove(&key);
                Ok(Value::Null)
            }
            "getMemory" => {
                let key = memory_key(&args)?;
                ctx.memory
                    .get(&key)
                    .map(|content| Value::String(content.to_string()))
                    .ok_or_else(|| ToolError::ExecutionFailed {
                        operation: "Agent.getMemory".into(),
                        reason: format!("no memory entry named '{key}'"),
                    })
            }
            other => Err(ToolError::ExecutionFailed {
                operation: format!("{AGENT_TOOL}.{other}"),
                reason: "unsupported operation".into(),
            }),
        }
    }
}

fn text_arg(args: &[Value], index: usize) -> Option<String> {
    match args.get(index)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn memory_key(args: &[Value]) -> Result<String, ToolError> {
    let key = text_arg(args, 0).ok_or_else(|| ToolError::InvalidArguments("key is required".into()))?;
    if !MEMORY_KEY.is_match(&key) {
        return Err(ToolError::InvalidArguments(format!(
            "'{key}' is not a valid memory key (use letters, digits, _ . -)"
        )));
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stepwise_core::run::{Invocation, Memory};
    use stepwise_core::tool::ToolRegistry;

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(AGENT_TOOL, Box::new(AgentTool));
        registry
    }

    #[tokio::test]
    async fn memory_round_trip_through_registry() {
        let registry = registry();
        let mut memory = Memory::new();
        let mut ctx = ToolContext {
            agent_id: "a1",
            memory: &mut memory,
        };

        let save = Invocation::new("Agent.saveMemory")
            .with_param("content", "use sqlite")
            .with_param("key", "decision");
        assert_eq!(registry.invoke(&save, &mut ctx).await.unwrap(), Value::Null);

        let get = Invocation::new("Agent.getMemory").with_param("key", "decision");
        assert_eq!(registry.invoke(&get, &mut ctx).await.unwrap(), json!("use sqlite"));

        let delete = Invocation::new("Agent.deleteMemory").with_param("key", "decision");
        registry.invoke(&delete, &mut ctx).await.unwrap();
        assert!(registry.invoke(&get, &mut ctx).await.is_err());
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn invalid_keys_rejected() {
        let registry = registry();
        let mut memory = Memory::new();
        let mut ctx = ToolContext {
            agent_id: "a1",
            memory: &mut memory,
        };
        for key in ["", "has space", "<tag>", "1st"] {
            let save = Invocation::new("Agent.saveMemory")
                .with_param("key", key)
                .with_param("content", "x");
            let err = registry.invoke(&save, &mut ctx).await.unwrap_err();
            assert!(matches!(err, ToolError::InvalidArguments(_)), "{key:?} accepted");
        }
    }

    #[tokio::test]
    async fn feedback_request_returns_empty_output() {
        let registry = registry();
        let mut memory = Memory::new();
        let mut ctx = ToolContext {
            agent_id: "a1",
            memory: &mut memory,
        };
        let ask = Invocation::new(REQUEST_FEEDBACK).with_param("question", "Which database?");
        assert_eq!(registry.invoke(&ask, &mut ctx).await.unwrap(), json!(""));

        let done = Invocation::new(COMPLETED).with_param("summary", "done");
        assert_eq!(registry.invoke(&done, &mut ctx).await.unwrap(), Value::Null);
    }

    #[test]
    fn designated_operations_are_declared() {
        let names: Vec<String> = registry().definitions().into_iter().map(|d| d.name).collect();
        assert!(names.contains(&COMPLETED.to_string()));
        assert!(names.contains(&REQUEST_FEEDBACK.to_string()));
    }
}
