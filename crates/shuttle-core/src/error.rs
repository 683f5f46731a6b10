//! Error types for the shuttle execution engine.
//!
//! Two channels exist throughout this crate, matching the pipeline's own
//! split between semantic and infrastructural failure: `Error` is the
//! transport-level channel (registry miss, store I/O, serialization,
//! MCP transport breakage); `ErrorInfo` (in [`crate::model`]) is the
//! semantic channel carried inside a [`crate::model::ToolResult`].

use thiserror::Error;

/// Result type alias using the shuttle transport error.
pub type Result<T> = std::result::Result<T, Error>;

/// Transport-level (infrastructural) errors.
///
/// These are returned instead of a `ToolResult` when the failure happened
/// outside the tool's own semantics: the tool could not be found, a store
/// could not be reached, a schema could not be parsed, and so on.
#[derive(Error, Debug)]
pub enum Error {
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("unknown tool source: {0}")]
    UnknownSource(String),

    #[error("resolver error: {0}")]
    Resolver(String),

    #[error("shared memory store error: {0}")]
    SharedMemory(String),

    #[error("sql result store error: {0}")]
    SqlResult(String),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("mcp client error: {0}")]
    Mcp(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Machine-readable error codes carried on `ToolResult.error.code` and in
/// a few transport-error messages. Kept as `&'static str` rather than an
/// enum because the vocabulary is part of the wire contract with callers
/// that may not share this crate's types.
pub mod codes {
    pub const PERMISSION_DENIED: &str = "permission_denied";
    pub const EXECUTION_FAILED: &str = "execution_failed";
    pub const LARGE_PARAM_ERROR: &str = "LARGE_PARAM_ERROR";
    pub const DEREF_ERROR: &str = "DEREF_ERROR";
    pub const INVALID_PARAMS: &str = "INVALID_PARAMS";
    pub const STORE_FAILED: &str = "STORE_FAILED";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const MCP_CLIENT_ERROR: &str = "MCP_CLIENT_ERROR";
    pub const MCP_EXECUTION_FAILED: &str = "MCP_EXECUTION_FAILED";
    pub const SEARCH_FAILED: &str = "SEARCH_FAILED";
    pub const INVALID_QUERY: &str = "INVALID_QUERY";
}
