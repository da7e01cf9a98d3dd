use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Specification error: {0}")]
    Specification(String),

    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid arguments for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("Tool execution failed: {0}")]
    Tool(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Normalization error: {0}")]
    Normalize(String),

    #[error("Iteration {index} failed: {message}")]
    Iteration { index: u32, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Protocol error code carried in error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Error::ToolNotFound(_) => crate::protocol::CODE_TOOL_NOT_FOUND,
            Error::InvalidArguments { .. } => crate::protocol::CODE_INVALID_ARGUMENTS,
            Error::Timeout(_) => crate::protocol::CODE_TIMEOUT,
            _ => crate::protocol::CODE_TOOL_ERROR,
        }
    }
}
