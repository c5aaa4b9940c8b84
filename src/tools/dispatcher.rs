//! ToolDispatcher - routes resolved tool calls to their implementations
//!
//! The dispatcher is the error boundary of the tool layer: whatever a tool
//! raises is converted here into a textual "tool error: …" result the model
//! can read and react to. Only cancellation crosses this boundary as an
//! error, unwinding the whole run.

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::llm::{ToolCall, ToolResult, ToolSpec};
use crate::rpc::ToolProviderManager;
use crate::skills::SkillLoader;

use super::context::SandboxContext;
use super::params::{SkillParams, ToolParams};
use super::{ToolError, fs, search, shell};

/// Tool scopes define which tools a loop may call
///
/// The root agent sees everything; sub-agents get restricted catalogues so
/// delegation cannot recurse and exploration stays read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolScope {
    /// Full catalogue plus skill loading and any attached tool providers
    #[default]
    Root,
    /// Everything except delegation and skill loading
    General,
    /// Read-only: list, read, glob, grep
    Explore,
}

impl ToolScope {
    /// Built-in tool names available in this scope
    fn allowed(&self) -> &'static [&'static str] {
        match self {
            ToolScope::Root => &["list", "read", "write", "edit", "glob", "grep", "run", "skill"],
            ToolScope::General => &["list", "read", "write", "edit", "glob", "grep", "run"],
            ToolScope::Explore => &["list", "read", "glob", "grep"],
        }
    }
}

/// Routes tool calls for one loop
pub struct ToolDispatcher {
    scope: ToolScope,
    sandbox: SandboxContext,
    skills: Option<Arc<dyn SkillLoader>>,
    providers: Option<Arc<ToolProviderManager>>,
}

impl ToolDispatcher {
    /// Create a dispatcher over a sandbox with the given scope
    pub fn new(scope: ToolScope, sandbox: SandboxContext) -> Self {
        debug!(?scope, root = ?sandbox.root, "ToolDispatcher::new: called");
        Self {
            scope,
            sandbox,
            skills: None,
            providers: None,
        }
    }

    /// Attach a skill loader (root scope only declares the skill tool)
    pub fn with_skills(mut self, skills: Arc<dyn SkillLoader>) -> Self {
        self.skills = Some(skills);
        self
    }

    /// Attach tool-provider connections (root scope only)
    pub fn with_providers(mut self, providers: Arc<ToolProviderManager>) -> Self {
        self.providers = Some(providers);
        self
    }

    pub fn scope(&self) -> ToolScope {
        self.scope
    }

    pub fn sandbox(&self) -> &SandboxContext {
        &self.sandbox
    }

    /// Tool declarations offered to the model for this scope
    ///
    /// Root scope appends the merged tool-provider catalogue under
    /// namespaced names. Delegation is declared by the engine, not here.
    pub fn catalogue(&self) -> Vec<ToolSpec> {
        debug!(scope = ?self.scope, "ToolDispatcher::catalogue: called");
        let mut specs: Vec<ToolSpec> = self.scope.allowed().iter().map(|name| builtin_spec(name)).collect();

        if self.scope == ToolScope::Root
            && let Some(providers) = &self.providers
        {
            specs.extend(providers.catalogue());
        }

        specs
    }

    /// Whether this scope declares the named built-in tool
    pub fn allows(&self, name: &str) -> bool {
        self.scope.allowed().contains(&name)
    }

    /// Execute one tool call and return its textual result
    ///
    /// Never fails except on cancellation: every other error is stringified
    /// into an error-flagged [`ToolResult`] answering the call.
    pub async fn dispatch(&self, call: &ToolCall, cancel: &CancellationToken) -> Result<ToolResult, ToolError> {
        debug!(tool = %call.name, call_id = %call.id, "ToolDispatcher::dispatch: called");

        // Namespaced provider tools route past the built-in table.
        if self.scope == ToolScope::Root
            && let Some(providers) = &self.providers
            && providers.owns(&call.name)
        {
            debug!(tool = %call.name, "ToolDispatcher::dispatch: routing to tool provider");
            return Ok(match providers.call(&call.name, call.arguments.clone()).await {
                Ok(content) => ToolResult::success(&call.id, content),
                Err(e) => ToolResult::error(&call.id, format!("tool error: {}", e)),
            });
        }

        if !self.allows(&call.name) {
            debug!(tool = %call.name, "ToolDispatcher::dispatch: tool not in scope");
            let err = ToolError::UnknownTool {
                name: call.name.clone(),
            };
            return Ok(ToolResult::error(&call.id, format!("tool error: {}", err)));
        }

        let params = match ToolParams::parse(&call.name, &call.arguments) {
            Ok(p) => p,
            Err(e) => {
                debug!(tool = %call.name, error = %e, "ToolDispatcher::dispatch: argument validation failed");
                return Ok(ToolResult::error(&call.id, format!("tool error: {}", e)));
            }
        };

        let outcome = match params {
            ToolParams::List(p) => fs::list(&self.sandbox, p).await,
            ToolParams::Read(p) => fs::read(&self.sandbox, p).await,
            ToolParams::Write(p) => fs::write(&self.sandbox, p).await,
            ToolParams::Edit(p) => fs::edit(&self.sandbox, p).await,
            ToolParams::Glob(p) => search::glob(&self.sandbox, p).await,
            ToolParams::Grep(p) => search::grep(&self.sandbox, p).await,
            ToolParams::Run(p) => shell::run(&self.sandbox, p, cancel).await,
            ToolParams::Skill(p) => self.load_skill(p),
            ToolParams::SpawnTask(_) => Err(ToolError::Validation {
                tool: "spawn_task".to_string(),
                message: "delegation runs inside the agent loop".to_string(),
            }),
        };

        match outcome {
            Ok(content) => Ok(ToolResult::success(&call.id, content)),
            Err(ToolError::RunCancelled) => {
                debug!(tool = %call.name, "ToolDispatcher::dispatch: cancelled, unwinding");
                Err(ToolError::RunCancelled)
            }
            Err(e) => {
                debug!(tool = %call.name, error = %e, "ToolDispatcher::dispatch: tool failed");
                Ok(ToolResult::error(&call.id, format!("tool error: {}", e)))
            }
        }
    }

    fn load_skill(&self, params: SkillParams) -> Result<String, ToolError> {
        debug!(skill = %params.name, "ToolDispatcher::load_skill: called");
        let loader = self.skills.as_ref().ok_or_else(|| ToolError::SkillNotFound {
            name: params.name.clone(),
        })?;
        let skill = loader.load_by_name(&params.name).ok_or(ToolError::SkillNotFound {
            name: params.name,
        })?;
        Ok(skill.text)
    }
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDispatcher")
            .field("scope", &self.scope)
            .field("root", &self.sandbox.root)
            .field("skills", &self.skills.is_some())
            .field("providers", &self.providers.is_some())
            .finish()
    }
}

/// One-line human summary of a call's arguments, for progress reporting
pub fn call_detail(name: &str, arguments: &serde_json::Value) -> String {
    let field = |key: &str| arguments.get(key).and_then(|v| v.as_str()).unwrap_or("").to_string();

    match name {
        "list" | "read" | "write" | "edit" => field("path"),
        "glob" | "grep" => field("pattern"),
        "run" => field("command"),
        "skill" => field("name"),
        "spawn_task" => {
            let count = arguments.get("tasks").and_then(|t| t.as_array()).map_or(0, |t| t.len());
            format!("{} task(s)", count)
        }
        _ => {
            let compact = arguments.to_string();
            if compact == "{}" || compact == "null" {
                String::new()
            } else if compact.chars().count() > 80 {
                format!("{}…", compact.chars().take(80).collect::<String>())
            } else {
                compact
            }
        }
    }
}

/// Declaration for one built-in tool
fn builtin_spec(name: &str) -> ToolSpec {
    match name {
        "list" => ToolSpec::new(
            "list",
            "List files and directories at a path (non-recursive). Directories end with /.",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Directory path relative to the project root (default: .)"
                    }
                }
            }),
        ),
        "read" => ToolSpec::new(
            "read",
            "Read a file's contents as plain text.",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "File path relative to the project root"
                    }
                },
                "required": ["path"]
            }),
        ),
        "write" => ToolSpec::new(
            "write",
            "Create or overwrite a file, creating parent directories as needed.",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "File path relative to the project root"
                    },
                    "content": {
                        "type": "string",
                        "description": "Full file content to write"
                    }
                },
                "required": ["path", "content"]
            }),
        ),
        "edit" => ToolSpec::new(
            "edit",
            "Replace an exact substring in a file. Fails if old_text is missing or matches more than once without replace_all.",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "File path relative to the project root"
                    },
                    "old_text": {
                        "type": "string",
                        "description": "Exact text to replace, including whitespace"
                    },
                    "new_text": {
                        "type": "string",
                        "description": "Replacement text"
                    },
                    "replace_all": {
                        "type": "boolean",
                        "description": "Replace every occurrence (default: false)"
                    }
                },
                "required": ["path", "old_text", "new_text"]
            }),
        ),
        "glob" => ToolSpec::new(
            "glob",
            "Find files matching a glob pattern (e.g. **/*.rs) under the project root.",
            json!({
                "type": "object",
                "properties": {
                    "pattern": {
                        "type": "string",
                        "description": "Glob pattern matched against root-relative paths"
                    }
                },
                "required": ["pattern"]
            }),
        ),
        "grep" => ToolSpec::new(
            "grep",
            "Search file contents with a regular expression. Returns path:line:text matches.",
            json!({
                "type": "object",
                "properties": {
                    "pattern": {
                        "type": "string",
                        "description": "Regular expression to search for"
                    },
                    "path": {
                        "type": "string",
                        "description": "Subdirectory to search (default: project root)"
                    },
                    "case_insensitive": {
                        "type": "boolean",
                        "description": "Ignore case when matching (default: false)"
                    }
                },
                "required": ["pattern"]
            }),
        ),
        "run" => ToolSpec::new(
            "run",
            "Run a shell command in the project root and return its output. Long commands are killed at the timeout.",
            json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "Shell command to execute"
                    },
                    "timeout_ms": {
                        "type": "integer",
                        "description": "Override of the default timeout in milliseconds"
                    }
                },
                "required": ["command"]
            }),
        ),
        "skill" => ToolSpec::new(
            "skill",
            "Load a named skill's instruction text.",
            json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "description": "Skill name to load"
                    }
                },
                "required": ["name"]
            }),
        ),
        other => unreachable!("no declaration for built-in tool {}", other),
    }
}
