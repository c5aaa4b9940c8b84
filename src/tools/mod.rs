//! Sandboxed tool layer
//!
//! Tools give agent loops file system access, content search, and command
//! execution. Every operation goes through a `SandboxContext` scoped to the
//! project root - tools cannot escape the sandbox. The `ToolDispatcher`
//! routes calls by scope and converts failures into textual results the
//! model can react to.

mod context;
mod dispatcher;
mod error;
mod params;

pub mod fs;
pub mod search;
pub mod shell;

pub use context::SandboxContext;
pub use dispatcher::{ToolDispatcher, ToolScope, call_detail};
pub use error::ToolError;
pub use params::{
    EditParams, GlobParams, GrepParams, ListParams, ReadParams, RunParams, SkillParams, SpawnTaskParams, TaskKind,
    TaskSpec, ToolParams, WriteParams,
};
