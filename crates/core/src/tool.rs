//! Tool trait and registry: how the agent acts in the world.
//!
//! A tool is a named object exposing independently callable operations.
//! Instead of reflecting over members at runtime, each tool declares its
//! members up front, including the ordered parameter schema used to bind
//! named arguments to positions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::ToolError;
use crate::run::{Invocation, Memory};

/// Whether a declared member can be invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberKind {
    Operation,
    /// A non-invocable attribute (resolving it for a call yields `NotCallable`).
    Property,
}

/// One declared parameter of an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSchema {
    pub name: String,

    /// JSON type name shown to the model ("string", "number", ...).
    #[serde(rename = "type")]
    pub kind: String,

    pub description: String,

    /// Positional slot this parameter binds to.
    pub index: usize,
}

/// A member declared by a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolMember {
    pub name: String,
    pub description: String,
    pub kind: MemberKind,
    #[serde(default)]
    pub parameters: Vec<ParamSchema>,
}

impl ToolMember {
    pub fn operation(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind: MemberKind::Operation,
            parameters: Vec::new(),
        }
    }

    pub fn property(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind: MemberKind::Property,
            parameters: Vec::new(),
        }
    }

    /// Declare the next positional parameter.
    pub fn param(
        mut self,
        name: impl Into<String>,
        kind: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let index = self.parameters.len();
        self.parameters.push(ParamSchema {
            name: name.into(),
            kind: kind.into(),
            description: description.into(),
            index,
        });
        self
    }
}

/// An operation as described to the model in the system prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Qualified name, `"Tool.operation"`.
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParamSchema>,
}

/// The explicit run handle given to a tool for the duration of one call.
pub struct ToolContext<'a> {
    pub agent_id: &'a str,
    pub memory: &'a mut Memory,
}

/// The core Tool trait.
///
/// Operations may do blocking work inside `call`; the control loop awaits
/// each invocation before dispatching the next one.
#[async_trait]
pub trait Tool: Send + Sync {
    /// A description of what this tool is for.
    fn description(&self) -> &str;

    /// Every member this tool exposes, operations and properties alike.
    fn members(&self) -> Vec<ToolMember>;

    /// Run `operation` with positionally bound arguments.
    async fn call(
        &self,
        operation: &str,
        args: Vec<Value>,
        ctx: &mut ToolContext<'_>,
    ) -> Result<Value, ToolError>;
}

/// A qualified name resolved to a tool and one of its operations.
pub struct ResolvedOperation<'a> {
    pub tool_name: &'a str,
    pub tool: &'a dyn Tool,
    pub member: ToolMember,
}

/// A registry of available tools, keyed by registration name.
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register `tool` under `name`, replacing any tool already there.
    pub fn register(&mut self, name: impl Into<String>, tool: Box<dyn Tool>) {
        let name = name.into();
        if self.tools.contains_key(&name) {
            tracing::debug!(tool = %name, "Replacing registered tool");
        }
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Resolve `"Tool.operation"`, splitting on the first `.`.
    pub fn resolve<'a>(&'a self, qualified_name: &str) -> Result<ResolvedOperation<'a>, ToolError> {
        let (tool_name, method) = qualified_name
            .split_once('.')
            .unwrap_or((qualified_name, ""));

        let (tool_name, tool) = self
            .tools
            .get_key_value(tool_name)
            .ok_or_else(|| ToolError::ToolNotFound(tool_name.to_string()))?;

        let member = tool
            .members()
            .into_iter()
            .find(|m| m.name == method)
            .ok_or_else(|| ToolError::MethodNotFound {
                tool: tool_name.clone(),
                method: method.to_string(),
            })?;

        if member.kind != MemberKind::Operation {
            return Err(ToolError::NotCallable {
                tool: tool_name.clone(),
                member: member.name,
            });
        }

        Ok(ResolvedOperation {
            tool_name: tool_name.as_str(),
            tool: tool.as_ref(),
            member,
        })
    }

    /// Resolve, bind and run an invocation.
    pub async fn invoke(
        &self,
        invocation: &Invocation,
        ctx: &mut ToolContext<'_>,
    ) -> Result<Value, ToolError> {
        let resolved = self.resolve(&invocation.tool_name)?;
        let args = bind_arguments(&invocation.tool_name, &resolved.member, &invocation.parameters)?;
        resolved.tool.call(&resolved.member.name, args, ctx).await
    }

    /// Definitions of every invocable operation, ordered by qualified name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .flat_map(|(tool_name, tool)| {
                tool.members()
                    .into_iter()
                    .filter(|m| m.kind == MemberKind::Operation)
                    .map(move |m| ToolDefinition {
                        name: format!("{tool_name}.{}", m.name),
                        description: m.description,
                        parameters: m.parameters,
                    })
            })
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Bind named parameters to positional arguments.
///
/// With a single supplied parameter its name is not checked: the value is
/// passed as the first argument. With several, every name must appear in
/// the operation's schema; declared slots left unsupplied are `null`.
pub fn bind_arguments(
    qualified_name: &str,
    member: &ToolMember,
    parameters: &serde_json::Map<String, Value>,
) -> Result<Vec<Value>, ToolError> {
    match parameters.len() {
        0 => Ok(Vec::new()),
        1 => Ok(parameters.values().cloned().collect()),
        _ => {
            let slots = member
                .parameters
                .iter()
                .map(|p| p.index + 1)
                .max()
                .unwrap_or(0);
            let mut args = vec![Value::Null; slots];
            for (name, value) in parameters {
                let def = member
                    .parameters
                    .iter()
                    .find(|p| p.name == *name)
                    .ok_or_else(|| ToolError::UnknownParameter {
                        operation: qualified_name.to_string(),
                        parameter: name.clone(),
                    })?;
                args[def.index] = value.clone();
            }
            Ok(args)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct CalcTool;

    #[async_trait]
    impl Tool for CalcTool {
        fn description(&self) -> &str {
            "Arithmetic"
        }

        fn members(&self) -> Vec<ToolMember> {
            vec![
                ToolMember::operation("add", "Add two numbers")
                    .param("a", "number", "first")
                    .param("b", "number", "second"),
                ToolMember::operation("negate", "Negate a number").param("x", "number", "value"),
                ToolMember::operation("zero", "Always zero"),
                ToolMember::property("precision", "Digits of precision"),
            ]
        }

        async fn call(
            &self,
            operation: &str,
            args: Vec<Value>,
            _ctx: &mut ToolContext<'_>,
        ) -> Result<Value, ToolError> {
            match operation {
                "add" => {
                    let a = args[0].as_i64().unwrap_or(0);
                    let b = args[1].as_i64().unwrap_or(0);
                    Ok(json!(a + b))
                }
                "negate" => Ok(json!(-args[0].as_i64().unwrap_or(0))),
                "zero" => {
                    assert!(args.is_empty());
                    Ok(json!(0))
                }
                other => Err(ToolError::ExecutionFailed {
                    operation: other.into(),
                    reason: "unknown".into(),
                }),
            }
        }
    }

    /// Echoes its positional arguments back as an array.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn description(&self) -> &str {
            "Echoes back the input"
        }

        fn members(&self) -> Vec<ToolMember> {
            vec![
                ToolMember::operation("three", "three slots")
                    .param("first", "string", "")
                    .param("second", "string", "")
                    .param("third", "string", ""),
            ]
        }

        async fn call(
            &self,
            _operation: &str,
            args: Vec<Value>,
            _ctx: &mut ToolContext<'_>,
        ) -> Result<Value, ToolError> {
            Ok(Value::Array(args))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register("Calc", Box::new(CalcTool));
        registry.register("Echo", Box::new(EchoTool));
        registry
    }

    async fn invoke(registry: &ToolRegistry, invocation: Invocation) -> Result<Value, ToolError> {
        let mut memory = Memory::new();
        let mut ctx = ToolContext {
            agent_id: "test-agent",
            memory: &mut memory,
        };
        registry.invoke(&invocation, &mut ctx).await
    }

    #[tokio::test]
    async fn two_parameters_bind_through_schema() {
        let invocation = Invocation::new("Calc.add").with_param("a", 2).with_param("b", 3);
        let result = invoke(&registry(), invocation).await.unwrap();
        assert_eq!(result.to_string(), "5");
    }

    #[tokio::test]
    async fn named_parameters_bind_regardless_of_supplied_order() {
        let invocation = Invocation::new("Echo.three")
            .with_param("third", "c")
            .with_param("first", "a");
        let result = invoke(&registry(), invocation).await.unwrap();
        assert_eq!(result, json!(["a", null, "c"]));
    }

    #[tokio::test]
    async fn single_parameter_skips_name_matching() {
        let invocation = Invocation::new("Calc.negate").with_param("whatever", 4);
        let result = invoke(&registry(), invocation).await.unwrap();
        assert_eq!(result, json!(-4));
    }

    #[tokio::test]
    async fn zero_parameters_call_without_arguments() {
        let result = invoke(&registry(), Invocation::new("Calc.zero")).await.unwrap();
        assert_eq!(result, json!(0));
    }

    #[tokio::test]
    async fn unknown_parameter_is_rejected() {
        let invocation = Invocation::new("Calc.add").with_param("a", 1).with_param("c", 2);
        let err = invoke(&registry(), invocation).await.unwrap_err();
        match err {
            ToolError::UnknownParameter { parameter, .. } => assert_eq!(parameter, "c"),
            other => panic!("expected UnknownParameter, got {other:?}"),
        }
    }

    #[test]
    fn missing_tool_and_missing_method() {
        let registry = registry();
        assert!(matches!(
            registry.resolve("Foo.bar"),
            Err(ToolError::ToolNotFound(name)) if name == "Foo"
        ));
        assert!(matches!(
            registry.resolve("Calc.bar"),
            Err(ToolError::MethodNotFound { method, .. }) if method == "bar"
        ));
        assert!(matches!(
            registry.resolve("Calc"),
            Err(ToolError::MethodNotFound { .. })
        ));
    }

    #[test]
    fn properties_are_not_callable() {
        assert!(matches!(
            registry().resolve("Calc.precision"),
            Err(ToolError::NotCallable { member, .. }) if member == "precision"
        ));
    }

    #[test]
    fn splits_on_first_separator_only() {
        assert!(matches!(
            registry().resolve("Calc.add.extra"),
            Err(ToolError::MethodNotFound { method, .. }) if method == "add.extra"
        ));
    }

    #[test]
    fn register_replaces_existing_entry() {
        let mut registry = registry();
        registry.register("Calc", Box::new(EchoTool));
        assert!(registry.resolve("Calc.three").is_ok());
        assert!(registry.resolve("Calc.add").is_err());
        assert_eq!(registry.names(), vec!["Calc", "Echo"]);
    }

    #[test]
    fn definitions_cover_operations_only() {
        let defs = registry().definitions();
        let names: Vec<_> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Calc.add", "Calc.negate", "Calc.zero", "Echo.three"]);
        assert_eq!(defs[0].parameters[1].name, "b");
        assert_eq!(defs[0].parameters[1].index, 1);
    }
}
