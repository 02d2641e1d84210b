//! Extracts invocations from a model's text response.
//!
//! Models are asked to end their response with a block like:
//!
//! ```text
//! <function_calls>
//! <function_call>
//! <function_name>Calc.add</function_name>
//! <parameters>
//! <a>2</a>
//! <b>3</b>
//! </parameters>
//! </function_call>
//! </function_calls>
//! ```
//!
//! Parameter values that read as JSON numbers, booleans or arrays are typed;
//! anything else is kept as text.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use stepwise_core::error::GenerationError;
use stepwise_core::run::Invocation;

static BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<function_calls>(.*?)</function_calls>").expect("valid regex")
});

static CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<function_call>(.*?)</function_call>").expect("valid regex")
});

static NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<function_name>\s*(.*?)\s*</function_name>").expect("valid regex")
});

static PARAMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<parameters>(.*?)</parameters>").expect("valid regex")
});

static OPEN_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([A-Za-z_][A-Za-z0-9_\-]*)>").expect("valid regex"));

/// Parse every invocation in `response`, in the order written.
///
/// Reasoning inside `<think>` is skipped so calls the model only
/// considered are not dispatched.
pub fn parse(response: &str) -> Result<Vec<Invocation>, GenerationError> {
    let text = match response.rfind("</think>") {
        Some(end) => &response[end + "</think>".len()..],
        None => response,
    };

    let mut invocations = Vec::new();
    for block in BLOCK.captures_iter(text) {
        for call in CALL.captures_iter(&block[1]) {
            let body = &call[1];
            let name = NAME
                .captures(body)
                .map(|c| c[1].to_string())
                .filter(|n| !n.is_empty())
                .ok_or_else(|| {
                    GenerationError::MalformedResponse("function_call without function_name".into())
                })?;

            let mut invocation = Invocation::new(name);
            if let Some(params) = PARAMS.captures(body) {
                for (key, raw) in parameters(&params[1]) {
                    invocation.parameters.insert(key, typed_value(raw));
                }
            }
            invocations.push(invocation);
        }
    }
    Ok(invocations)
}

/// Split a `<parameters>` body into `(name, raw value)` pairs.
///
/// Values may contain markup of their own, so each tag is matched with its
/// own closing tag rather than the next `</...>`.
fn parameters(body: &str) -> Vec<(String, &str)> {
    let mut pairs = Vec::new();
    let mut rest = body;
    while let Some(open) = OPEN_TAG.captures(rest) {
        let (Some(whole), Some(tag)) = (open.get(0), open.get(1)) else {
            break;
        };
        let close = format!("</{}>", tag.as_str());
        let value_start = whole.end();
        match rest[value_start..].find(&close) {
            Some(len) => {
                pairs.push((tag.as_str().to_string(), &rest[value_start..value_start + len]));
                rest = &rest[value_start + len + close.len()..];
            }
            None => rest = &rest[value_start..],
        }
    }
    pairs
}

fn typed_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    match serde_json::from_str::<Value>(trimmed) {
        Ok(v @ (Value::Number(_) | Value::Bool(_) | Value::Array(_))) => v,
        _ => Value::String(strip_outer_newline(raw).to_string()),
    }
}

/// Drop the newline that usually follows the opening tag and the one that
/// precedes the closing tag. Other whitespace is content.
fn strip_outer_newline(raw: &str) -> &str {
    let raw = raw
        .strip_prefix("\r\n")
        .or_else(|| raw.strip_prefix('\n'))
        .unwrap_or(raw);
    raw.strip_suffix("\r\n")
        .or_else(|| raw.strip_suffix('\n'))
        .unwrap_or(raw)
}
