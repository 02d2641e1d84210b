//! Prompt assembly: everything the model sees on each step.
//!
//! A step's prompt is the call history, then the agent memory, then the
//! current instruction. Tool definitions go into the system prompt, inside
//! its `<tools></tools>` region.

use regex::{NoExpand, Regex};
use serde_json::Value;
use std::fmt::Write as _;
use std::sync::LazyLock;
use stepwise_core::error::PromptError;
use stepwise_core::run::{InvocationOutcome, InvocationRecord, Memory};
use stepwise_core::tool::ToolDefinition;

/// Parameter strings longer than this are truncated in the rendered history.
pub const MAX_PARAM_CHARS: usize = 150;

const INITIAL_PROMPT_OPEN: &str = "<initial_prompt>";
const INITIAL_PROMPT_CLOSE: &str = "</initial_prompt>";

static TOOLS_REGION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<tools>.*?</tools>").expect("valid regex"));

/// Render the call history.
///
/// ```text
/// <function_call_history>
/// <function_call>
///  Calc.add({
///   "a": "2",
///
///   "b": "3",
/// })
///  <output>5</output></function_call>
/// </function_call_history>
/// ```
pub fn render_history(records: &[InvocationRecord]) -> String {
    let mut out = String::from("<function_call_history>\n");
    for record in records {
        let mut params = String::new();
        for (name, value) in &record.invocation.parameters {
            let _ = write!(params, "\n  \"{name}\": \"{}\",\n", render_param(value));
        }
        let output = match &record.outcome {
            InvocationOutcome::Stdout(stdout) => format!("<output>{stdout}</output>"),
            InvocationOutcome::Error(error) => format!("<error>{error}</error>"),
        };
        let _ = write!(
            out,
            "<function_call>\n {}({{{params}}})\n {output}</function_call>\n",
            record.invocation.tool_name
        );
    }
    out.push_str("</function_call_history>\n");
    out
}

fn render_param(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Array(_) => serde_json::to_string_pretty(value).unwrap_or_default(),
        other => other.to_string(),
    };
    truncate_chars(&text, MAX_PARAM_CHARS).replace('"', "\\\"")
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Render the memory, one CDATA-wrapped element per key in insertion order.
pub fn render_memory(memory: &Memory) -> String {
    let mut out = String::from("<memory>\n");
    for (key, content) in memory.iter() {
        // "]]>" would end the section early; split it across two sections
        let content = content.replace("]]>", "]]]]><![CDATA[>");
        let _ = writeln!(out, "<{key}><![CDATA[\n{content}\n]]></{key}>");
    }
    out.push_str("</memory>\n");
    out
}

/// History, memory, then the instruction.
pub fn compose_prompt(history: &[InvocationRecord], memory: &Memory, instruction: &str) -> String {
    let mut prompt = render_history(history);
    prompt.push_str(&render_memory(memory));
    prompt.push_str(instruction);
    prompt
}

/// Render operation definitions for the system prompt.
pub fn serialize_tool_definitions(definitions: &[ToolDefinition]) -> String {
    let mut out = String::from("\n");
    for def in definitions {
        out.push_str("<function_description>\n");
        let _ = writeln!(out, "<function_name>{}</function_name>", def.name);
        let _ = writeln!(out, "<description>{}</description>", def.description);
        if !def.parameters.is_empty() {
            out.push_str("<parameters>\n");
            for param in &def.parameters {
                let _ = writeln!(
                    out,
                    "<parameter>\n<name>{}</name>\n<type>{}</type>\n<description>{}</description>\n</parameter>",
                    param.name, param.kind, param.description
                );
            }
            out.push_str("</parameters>\n");
        }
        out.push_str("</function_description>\n");
    }
    out
}

/// Replace every `<tools>...</tools>` region of `system_prompt` with the
/// serialized definitions.
pub fn inject_tool_definitions(
    system_prompt: &str,
    definitions: &[ToolDefinition],
) -> Result<String, PromptError> {
    if !TOOLS_REGION.is_match(system_prompt) {
        return Err(PromptError::AssemblyFailure(
            "system prompt has no <tools></tools> region".into(),
        ));
    }
    let region = format!("<tools>{}</tools>", serialize_tool_definitions(definitions));
    let updated = TOOLS_REGION
        .replace_all(system_prompt, NoExpand(&region))
        .into_owned();
    if !updated.contains(&region) {
        return Err(PromptError::AssemblyFailure("regex replace failed".into()));
    }
    Ok(updated)
}

/// The block appended to the next instruction after a successful call.
pub fn format_function_result(tool_name: &str, value: &Value) -> String {
    let rendered = match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_default(),
    };
    format!(
        "<function_results>\n<result>\n<tool_name>{tool_name}</tool_name>\n<stdout>\n{rendered}\n</stdout>\n</result>\n</function_results>\n"
    )
}

/// The block appended to the next instruction after a failed call.
pub fn format_function_error(tool_name: &str, error: &str) -> String {
    format!(
        "<function_results>\n<error>\n<tool_name>{tool_name}</tool_name>\n<stderr>\n{error}\n</stderr>\n</error>\n</function_results>\n"
    )
}

/// Prefix `current` with the run's goal once the instruction has moved on
/// from it, so every later step still sees what it is working towards.
pub fn anchor_initial_prompt(initial: &str, current: &str) -> String {
    if current == initial || current.contains(INITIAL_PROMPT_OPEN) {
        current.to_string()
    } else {
        format!("{INITIAL_PROMPT_OPEN}\n{initial}\n{INITIAL_PROMPT_CLOSE}\n{current}")
    }
}

/// Recover the goal from an instruction that already carries an
/// `<initial_prompt>` block (e.g. one pasted from a previous run).
pub fn extract_initial_prompt(text: &str) -> Option<String> {
    let start = text.find(INITIAL_PROMPT_OPEN)? + INITIAL_PROMPT_OPEN.len();
    let end = start + text[start..].find(INITIAL_PROMPT_CLOSE)?;
    let inner = &text[start..end];
    let inner = inner.strip_prefix('\n').unwrap_or(inner);
    Some(inner.strip_suffix('\n').unwrap_or(inner).to_string())
}
