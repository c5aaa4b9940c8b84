//! Typed tool parameters
//!
//! Raw argument maps from the model are validated exactly once, at the
//! dispatcher boundary, into these structs. Tool implementations never see
//! untyped JSON.

use serde::Deserialize;
use tracing::debug;

use super::ToolError;

/// Parameters for one built-in tool invocation
#[derive(Debug)]
pub enum ToolParams {
    List(ListParams),
    Read(ReadParams),
    Write(WriteParams),
    Edit(EditParams),
    Glob(GlobParams),
    Grep(GrepParams),
    Run(RunParams),
    Skill(SkillParams),
    SpawnTask(SpawnTaskParams),
}

impl ToolParams {
    /// Validate an argument map against the named tool's parameter struct
    pub fn parse(name: &str, arguments: &serde_json::Value) -> Result<Self, ToolError> {
        debug!(%name, "ToolParams::parse: called");

        fn typed<T: serde::de::DeserializeOwned>(tool: &str, args: &serde_json::Value) -> Result<T, ToolError> {
            serde_json::from_value(args.clone()).map_err(|e| ToolError::Validation {
                tool: tool.to_string(),
                message: e.to_string(),
            })
        }

        match name {
            "list" => Ok(Self::List(typed(name, arguments)?)),
            "read" => Ok(Self::Read(typed(name, arguments)?)),
            "write" => Ok(Self::Write(typed(name, arguments)?)),
            "edit" => Ok(Self::Edit(typed(name, arguments)?)),
            "glob" => Ok(Self::Glob(typed(name, arguments)?)),
            "grep" => Ok(Self::Grep(typed(name, arguments)?)),
            "run" => Ok(Self::Run(typed(name, arguments)?)),
            "skill" => Ok(Self::Skill(typed(name, arguments)?)),
            "spawn_task" => Ok(Self::SpawnTask(typed(name, arguments)?)),
            other => Err(ToolError::UnknownTool { name: other.to_string() }),
        }
    }
}

/// `list`:non-recursive directory listing
#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// Directory path relative to the project root
    #[serde(default = "default_list_path")]
    pub path: String,
}

fn default_list_path() -> String {
    ".".to_string()
}

/// `read`:return a file's contents
#[derive(Debug, Deserialize)]
pub struct ReadParams {
    pub path: String,
}

/// `write`:create or overwrite a file
#[derive(Debug, Deserialize)]
pub struct WriteParams {
    pub path: String,
    pub content: String,
}

/// `edit`:exact substring replacement
#[derive(Debug, Deserialize)]
pub struct EditParams {
    pub path: String,
    pub old_text: String,
    pub new_text: String,
    #[serde(default)]
    pub replace_all: bool,
}

/// `glob`:pattern match over the project tree
#[derive(Debug, Deserialize)]
pub struct GlobParams {
    pub pattern: String,
}

/// `grep`:regex line search over the project tree
#[derive(Debug, Deserialize)]
pub struct GrepParams {
    pub pattern: String,

    /// Subdirectory to search (defaults to the project root)
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default)]
    pub case_insensitive: bool,
}

/// `run`:shell command execution
#[derive(Debug, Deserialize)]
pub struct RunParams {
    pub command: String,

    /// Override of the configured timeout
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// `skill`:load skill content by name
#[derive(Debug, Deserialize)]
pub struct SkillParams {
    pub name: String,
}

/// `spawn_task`:delegate work to sub-agents
#[derive(Debug, Deserialize)]
pub struct SpawnTaskParams {
    pub tasks: Vec<TaskSpec>,
}

/// One delegated task
#[derive(Debug, Clone, Deserialize)]
pub struct TaskSpec {
    pub kind: TaskKind,
    pub prompt: String,
}

/// What a sub-agent is allowed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Everything except further delegation and skill-loading
    General,
    /// Read-only: list, read, glob, grep
    Explore,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::General => write!(f, "general"),
            Self::Explore => write!(f, "explore"),
        }
    }
}
