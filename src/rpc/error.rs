//! Tool-provider RPC error types

use thiserror::Error;

/// Errors from tool-provider connections
#[derive(Debug, Error)]
pub enum RpcError {
    /// No response arrived within the per-request window. Only the one
    /// pending request fails; the connection stays up.
    #[error("RPC request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The provider process exited or the connection was torn down with
    /// requests still pending.
    #[error("Tool provider process exited")]
    ProcessExit,

    /// The provider answered with a JSON-RPC error object.
    #[error("Tool provider error {code}: {message}")]
    Server { code: i64, message: String },

    /// The provider reported a tool-level failure in the call result.
    #[error("{message}")]
    Tool { message: String },

    #[error("Unknown tool provider: {server_id}")]
    UnknownServer { server_id: String },

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
