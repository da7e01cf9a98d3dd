//! Capability host: request dispatch for one provider
//!
//! A host owns one registry and services the three envelope methods. A
//! handler fault is always converted into an error envelope; it never
//! escapes to the caller as a panic or a raw error.

use super::{
    RequestParams, ToolRegistry, ToolRequest, ToolResponse, CODE_INVALID_ARGUMENTS,
    CODE_METHOD_NOT_FOUND, CODE_TIMEOUT, CODE_TOOL_ERROR, CODE_TOOL_NOT_FOUND,
    METHOD_INITIALIZE, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST,
};
use crate::context::CorrelationContext;
use crate::Error;
use futures::FutureExt;
use serde_json::{json, Map, Value};
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::{debug, warn};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub struct CapabilityHost {
    name: String,
    version: String,
    registry: ToolRegistry,
}

impl CapabilityHost {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            registry: ToolRegistry::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mutable registry access for startup registration only; hosts are
    /// shared immutably (behind `Arc`) once a cycle starts.
    pub fn registry_mut(&mut self) -> &mut ToolRegistry {
        &mut self.registry
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub async fn handle_request(&self, request: ToolRequest) -> ToolResponse {
        match request.method.as_str() {
            METHOD_INITIALIZE => self.handle_initialize(&request.id),
            METHOD_TOOLS_LIST => self.handle_tools_list(&request.id),
            METHOD_TOOLS_CALL => self.handle_tools_call(&request.id, request.params).await,
            other => ToolResponse::error(
                &request.id,
                CODE_METHOD_NOT_FOUND,
                format!("Unknown method: {other}"),
            ),
        }
    }

    /// Issue a request with a per-operation deadline. A timeout is reported
    /// exactly like a handler fault, as an error envelope.
    pub async fn handle_request_with_timeout(
        &self,
        request: ToolRequest,
        timeout: Duration,
        ctx: &CorrelationContext,
    ) -> ToolResponse {
        let id = request.id.clone();
        let tool = request.params.name.clone();
        debug!(
            correlation_id = %ctx.correlation_id,
            request_id = %id,
            host = %self.name,
            tool = %tool,
            "dispatching capability call"
        );
        let response = match tokio::time::timeout(timeout, self.handle_request(request)).await {
            Ok(response) => response,
            Err(_) => {
                warn!(
                    correlation_id = %ctx.correlation_id,
                    host = %self.name,
                    tool = %tool,
                    "capability call exceeded {timeout:?}"
                );
                ToolResponse::error(
                    &id,
                    CODE_TIMEOUT,
                    Error::Timeout(timeout).to_string(),
                )
            }
        };
        debug!(
            correlation_id = %ctx.correlation_id,
            request_id = %id,
            host = %self.name,
            elapsed_ms = ctx.elapsed().as_millis() as u64,
            success = response.is_success(),
            "capability call finished"
        );
        response
    }

    fn handle_initialize(&self, id: &str) -> ToolResponse {
        ToolResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": { "name": self.name, "version": self.version },
            }),
        )
    }

    fn handle_tools_list(&self, id: &str) -> ToolResponse {
        let tools = self.registry.list();
        ToolResponse::success(id, json!({ "tools": tools }))
    }

    async fn handle_tools_call(&self, id: &str, params: RequestParams) -> ToolResponse {
        let Some(tool) = self.registry.get(&params.name) else {
            return ToolResponse::error(
                id,
                CODE_TOOL_NOT_FOUND,
                format!("Tool not found: {}", params.name),
            );
        };

        if let Err(reason) = validate_arguments(&tool.input_schema, &params.arguments) {
            return ToolResponse::error(
                id,
                CODE_INVALID_ARGUMENTS,
                format!("Invalid arguments for '{}': {reason}", params.name),
            );
        }

        let handler = tool.handler();
        let outcome = AssertUnwindSafe(handler(params.arguments))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(value)) => ToolResponse::content(id, &value),
            Ok(Err(err)) => ToolResponse::error(
                id,
                err.code(),
                format!("Tool execution failed: {err}"),
            ),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<String>()
                    .cloned()
                    .or_else(|| panic.downcast_ref::<&str>().map(|s| s.to_string()))
                    .unwrap_or_else(|| "handler panicked".to_string());
                ToolResponse::error(
                    id,
                    CODE_TOOL_ERROR,
                    format!("Tool execution failed: {message}"),
                )
            }
        }
    }
}

/// Shape-check call arguments against a declared schema: required keys must
/// be present and declared property types must match. No deep semantic
/// validation happens here; that is the handler's business.
fn validate_arguments(
    schema: &Value,
    arguments: &Map<String, Value>,
) -> std::result::Result<(), String> {
    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if !arguments.contains_key(key) {
                return Err(format!("missing required argument '{key}'"));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (key, declared) in properties {
            let Some(value) = arguments.get(key) else {
                continue;
            };
            let Some(expected) = declared.get("type").and_then(Value::as_str) else {
                continue;
            };
            if !type_matches(expected, value) {
                return Err(format!(
                    "argument '{key}' should be of type {expected}"
                ));
            }
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}
