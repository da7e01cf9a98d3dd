//! Per-provider tool registry
//!
//! Each capability provider registers its named operations once at startup;
//! definitions are immutable afterwards and safe for concurrent reads.

use crate::{Error, Result};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Async handler invoked with the validated call arguments.
pub type ToolHandler =
    Arc<dyn Fn(Map<String, Value>) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Adapt an async closure into a [`ToolHandler`].
pub fn tool_handler<F, Fut>(f: F) -> ToolHandler
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move |args| Box::pin(f(args)))
}

/// A registered operation: name, description, declared input schema, and
/// the handler that services it.
#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    handler: ToolHandler,
}

impl ToolDefinition {
    pub fn handler(&self) -> ToolHandler {
        Arc::clone(&self.handler)
    }
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish_non_exhaustive()
    }
}

/// Serializable view of a tool for `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolDefinition>,
    // Registration order, so tools/list output is stable.
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: ToolHandler,
    ) -> Result<()> {
        let name = name.into();
        if self.tools.contains_key(&name) {
            return Err(Error::DuplicateTool(name));
        }
        self.order.push(name.clone());
        self.tools.insert(
            name.clone(),
            ToolDefinition {
                name,
                description: description.into(),
                input_schema,
                handler,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name)
    }

    pub fn list(&self) -> Vec<ToolSpec> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolSpec {
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema: tool.input_schema.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop() -> ToolHandler {
        tool_handler(|_args| async { Ok(Value::Null) })
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = ToolRegistry::new();
        registry
            .register("validate_syntax", "Check syntax", json!({}), noop())
            .unwrap();
        let err = registry
            .register("validate_syntax", "Again", json!({}), noop())
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateTool(name) if name == "validate_syntax"));
    }

    #[test]
    fn list_preserves_registration_order() {
        let mut registry = ToolRegistry::new();
        for name in ["b_tool", "a_tool", "c_tool"] {
            registry.register(name, "", json!({}), noop()).unwrap();
        }
        let names: Vec<_> = registry.list().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["b_tool", "a_tool", "c_tool"]);
    }
}
