//! Host environment probe
//!
//! Reports the platform, architecture, and default shell the sandbox runs
//! commands through. Probed once at startup and shared read-only.

use std::path::Path;
use tracing::debug;

/// Host environment information
#[derive(Debug, Clone)]
pub struct Environment {
    /// Operating system, e.g. "linux" or "macos"
    pub platform: String,

    /// CPU architecture, e.g. "x86_64" or "aarch64"
    pub architecture: String,

    /// Full path of the default shell, e.g. "/bin/bash"
    pub shell_path: String,

    /// Basename of the default shell, e.g. "bash"
    pub shell_name: String,
}

impl Environment {
    /// Probe the host
    ///
    /// The shell comes from `$SHELL`, falling back to `/bin/sh` when unset
    /// or empty.
    pub fn probe() -> Self {
        let shell_path = std::env::var("SHELL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "/bin/sh".to_string());

        let shell_name = Path::new(&shell_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| shell_path.clone());

        let env = Self {
            platform: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            shell_path,
            shell_name,
        };
        debug!(platform = %env.platform, arch = %env.architecture, shell = %env.shell_path, "Environment::probe: called");
        env
    }
}
