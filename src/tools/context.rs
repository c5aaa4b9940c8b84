//! SandboxContext - execution context for tools

use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::config::SandboxConfig;
use crate::environment::Environment;

use super::ToolError;

/// Execution context for tools - scoped to a single run
///
/// Every file and command operation is confined to the project root. Paths
/// are normalized and canonicalized before the prefix check so traversal
/// sequences and symlinks cannot escape.
#[derive(Debug, Clone)]
pub struct SandboxContext {
    /// Project root - all file ops constrained here
    pub root: PathBuf,

    /// Largest file the read tool will return, in bytes
    pub max_file_bytes: u64,

    /// Default shell command timeout in milliseconds
    pub command_timeout_ms: u64,

    /// Directory names skipped by search walks
    pub denylist: Vec<String>,

    /// Shell used by the run tool
    pub shell_path: String,
}

impl SandboxContext {
    /// Create a context from configuration and the probed environment
    pub fn new(root: PathBuf, config: &SandboxConfig, env: &Environment) -> Self {
        debug!(?root, "SandboxContext::new: called");
        Self {
            root,
            max_file_bytes: config.max_file_bytes,
            command_timeout_ms: config.command_timeout_ms,
            denylist: config.denylist.clone(),
            shell_path: env.shell_path.clone(),
        }
    }

    /// Create a context rooted at a directory with default limits
    pub fn rooted(root: PathBuf) -> Self {
        let config = SandboxConfig::default();
        let env = Environment::probe();
        Self::new(root, &config, &env)
    }

    /// Normalize a path relative to the project root
    ///
    /// `.` and `..` components are resolved lexically here, so dot segments
    /// under directories that do not exist yet cannot survive into the
    /// prefix check.
    fn normalize_path(&self, path: &Path) -> PathBuf {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };

        let mut resolved = PathBuf::new();
        for component in joined.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    resolved.pop();
                }
                other => resolved.push(other),
            }
        }
        resolved
    }

    /// Validate a path resolves under the project root
    ///
    /// Existing paths are canonicalized to resolve symlinks. For paths that
    /// do not exist yet (new files), the nearest existing parent is
    /// canonicalized and the remainder re-joined before the prefix check.
    /// Fails before any I/O happens on the target.
    pub fn validate_path(&self, path: &Path) -> Result<PathBuf, ToolError> {
        debug!(?path, "SandboxContext::validate_path: called");
        let normalized = self.normalize_path(path);

        let canonical = if normalized.exists() {
            normalized.canonicalize().unwrap_or_else(|_| normalized.clone())
        } else if let Some(parent) = normalized.parent() {
            if parent.exists() {
                let canonical_parent = parent.canonicalize().unwrap_or_else(|_| parent.to_path_buf());
                canonical_parent.join(normalized.file_name().unwrap_or_default())
            } else {
                normalized.clone()
            }
        } else {
            normalized.clone()
        };

        let root_canonical = self.root.canonicalize().unwrap_or_else(|_| self.root.clone());

        if canonical.starts_with(&root_canonical) {
            debug!("SandboxContext::validate_path: path is within root");
            Ok(canonical)
        } else {
            debug!("SandboxContext::validate_path: escape detected");
            Err(ToolError::PathEscape {
                path: path.to_path_buf(),
                root: self.root.clone(),
            })
        }
    }

    /// Check whether a directory name is on the search denylist
    pub fn is_denied(&self, name: &str) -> bool {
        self.denylist.iter().any(|d| d == name)
    }
}
