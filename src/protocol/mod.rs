//! Tool invocation protocol
//!
//! A minimal JSON-RPC-style request/response envelope shared by every
//! capability provider. One call is one request/response pair; a response
//! carries either a result or an error, never both.

pub mod host;
pub mod registry;

pub use host::CapabilityHost;
pub use registry::{tool_handler, ToolDefinition, ToolHandler, ToolRegistry, ToolSpec};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_TOOLS_CALL: &str = "tools/call";

pub const CODE_METHOD_NOT_FOUND: &str = "METHOD_NOT_FOUND";
pub const CODE_TOOL_NOT_FOUND: &str = "TOOL_NOT_FOUND";
pub const CODE_INVALID_ARGUMENTS: &str = "INVALID_ARGUMENTS";
pub const CODE_TOOL_ERROR: &str = "TOOL_ERROR";
pub const CODE_TIMEOUT: &str = "TIMEOUT";

/// A single protocol request. Created per call and consumed synchronously
/// by the receiving host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRequest {
    pub method: String,
    #[serde(default)]
    pub params: RequestParams,
    pub id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestParams {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolRequest {
    /// Build a `tools/call` request with a fresh opaque id.
    pub fn call(tool: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            method: METHOD_TOOLS_CALL.to_string(),
            params: RequestParams {
                name: tool.into(),
                arguments,
            },
            id: Uuid::new_v4().to_string(),
        }
    }

    pub fn method(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: RequestParams::default(),
            id: Uuid::new_v4().to_string(),
        }
    }
}

/// One content block of a successful `tools/call` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: String,
    pub message: String,
}

/// A protocol response. Exactly one of `result`/`error` is populated; the
/// constructors below are the only way responses are built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl ToolResponse {
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    /// Wrap a handler's return value as a single `text` content block.
    ///
    /// String results pass through verbatim; structured results serialize
    /// to JSON text. The normalizer on the receiving side absorbs both.
    pub fn content(id: impl Into<String>, value: &Value) -> Self {
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Self::success(
            id,
            json!({ "content": [ContentBlock::text(text)] }),
        )
    }

    pub fn error(
        id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            result: None,
            error: Some(ResponseError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }

    /// The `content` array of a successful `tools/call` response.
    pub fn content_blocks(&self) -> Option<&Value> {
        self.result.as_ref().and_then(|r| r.get("content"))
    }

    /// Text of the first content block, if any.
    pub fn content_text(&self) -> Option<&str> {
        self.content_blocks()
            .and_then(|c| c.get(0))
            .and_then(|b| b.get("text"))
            .and_then(Value::as_str)
    }
}
