//! Tool error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during tool execution
///
/// Everything here is caught at the dispatcher boundary and fed back to the
/// model as a textual result, except `RunCancelled` which propagates
/// unmodified and unwinds the whole run.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Path {path} escapes project root {root}")]
    PathEscape { path: PathBuf, root: PathBuf },

    #[error("File too large: {path} is {size} bytes (limit: {limit})")]
    FileTooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("Not a file: {path}")]
    NotAFile { path: PathBuf },

    #[error("old_text not found in file. Make sure it matches exactly including whitespace.")]
    EditNotFound,

    #[error("old_text found {count} times, expected 1. Use replace_all=true or provide more context.")]
    EditAmbiguous { count: usize },

    #[error("Command timed out after {timeout_ms}ms")]
    CommandTimeout { timeout_ms: u64 },

    #[error("Exit code: {code}\n{output}")]
    CommandFailed { code: i32, output: String },

    #[error("Run cancelled")]
    RunCancelled,

    #[error("Tool not found: {name}")]
    UnknownTool { name: String },

    #[error("Invalid arguments for {tool}: {message}")]
    Validation { tool: String, message: String },

    #[error("Skill not found: {name}")]
    SkillNotFound { name: String },

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Invalid regex: {0}")]
    Regex(#[from] grep_regex::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Rpc(#[from] crate::rpc::RpcError),
}
