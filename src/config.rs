//! Agentcore configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::llm::ReasoningEffort;

/// Main agentcore configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level for the file subscriber (overridden by CLI --log-level)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Provider configuration
    pub provider: ProviderConfig,

    /// Credential store configuration
    pub credentials: CredentialsConfig,

    /// Sandbox limits for the tool set
    pub sandbox: SandboxConfig,

    /// Agent loop configuration
    pub agent: AgentConfig,

    /// External tool-provider subprocesses, keyed by server id
    #[serde(rename = "tool-providers")]
    pub tool_providers: BTreeMap<String, ToolProviderConfig>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        match self.provider.name.as_str() {
            "anthropic" | "openai" => {}
            other => {
                return Err(eyre::eyre!(
                    "Unknown provider '{}'. Supported providers: anthropic, openai.",
                    other
                ));
            }
        }

        if self.provider.model.is_empty() {
            return Err(eyre::eyre!("Provider model must not be empty."));
        }

        if self.agent.subagent_concurrency == 0 {
            return Err(eyre::eyre!("agent.subagent-concurrency must be at least 1."));
        }

        for (server_id, spec) in &self.tool_providers {
            if server_id.contains(crate::rpc::NAMESPACE_SEPARATOR) {
                return Err(eyre::eyre!(
                    "Tool provider id '{}' must not contain '{}' (reserved for tool namespacing).",
                    server_id,
                    crate::rpc::NAMESPACE_SEPARATOR
                ));
            }
            if spec.command.is_empty() {
                return Err(eyre::eyre!("Tool provider '{}' has an empty command.", server_id));
            }
        }

        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .agentcore.yml
        let local_config = PathBuf::from(".agentcore.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/agentcore/agentcore.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("agentcore").join("agentcore.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Log level from the config file, if any
    ///
    /// Runs before logging is initialized, so it parses quietly and swallows
    /// every failure; the full load reports problems afterwards.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates: Vec<PathBuf> = match config_path {
            Some(path) => vec![path.clone()],
            None => {
                let mut paths = vec![PathBuf::from(".agentcore.yml")];
                if let Some(config_dir) = dirs::config_dir() {
                    paths.push(config_dir.join("agentcore").join("agentcore.yml"));
                }
                paths
            }
        };

        for path in candidates {
            if !path.exists() {
                continue;
            }
            if let Ok(content) = fs::read_to_string(&path)
                && let Ok(config) = serde_yaml::from_str::<Self>(&content)
            {
                return config.log_level;
            }
        }
        None
    }
}

/// Provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider name ("anthropic" or "openai")
    pub name: String,

    /// Model identifier
    pub model: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Environment variable overriding the stored credential, if set
    #[serde(rename = "api-key-env")]
    pub api_key_env: Option<String>,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Reasoning effort applied to every step
    pub reasoning: ReasoningEffort,
}

impl ProviderConfig {
    /// Defaults for the Anthropic messages API
    pub fn anthropic_defaults() -> Self {
        Self {
            name: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            api_key_env: Some("ANTHROPIC_API_KEY".to_string()),
            max_tokens: 16384,
            timeout_ms: 300_000,
            reasoning: ReasoningEffort::Off,
        }
    }

    /// Defaults for the OpenAI chat-completions API
    pub fn openai_defaults() -> Self {
        Self {
            name: "openai".to_string(),
            model: "gpt-4o".to_string(),
            base_url: "https://api.openai.com".to_string(),
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            max_tokens: 16384,
            timeout_ms: 300_000,
            reasoning: ReasoningEffort::Off,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::anthropic_defaults()
    }
}

/// Credential store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Path to the credential store file
    #[serde(rename = "store-path")]
    pub store_path: Option<PathBuf>,
}

impl CredentialsConfig {
    /// Resolve the store path (defaults to ~/.config/agentcore/credentials.json)
    pub fn resolved_store_path(&self) -> PathBuf {
        self.store_path.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .map(|d| d.join("agentcore").join("credentials.json"))
                .unwrap_or_else(|| PathBuf::from(".agentcore-credentials.json"))
        })
    }
}

/// Sandbox limits for the tool set
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Project root all tool paths must resolve under (defaults to cwd)
    pub root: Option<PathBuf>,

    /// Largest file the read tool will return, in bytes
    #[serde(rename = "max-file-bytes")]
    pub max_file_bytes: u64,

    /// Shell command timeout in milliseconds
    #[serde(rename = "command-timeout-ms")]
    pub command_timeout_ms: u64,

    /// Directory names skipped by glob/grep walks and search preprocessing
    pub denylist: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            root: None,
            max_file_bytes: 262_144,
            command_timeout_ms: 90_000,
            denylist: vec![
                ".git".to_string(),
                "node_modules".to_string(),
                "target".to_string(),
                "dist".to_string(),
                "build".to_string(),
                ".venv".to_string(),
                "__pycache__".to_string(),
            ],
        }
    }
}

/// Agent loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Maximum provider round trips per run
    #[serde(rename = "max-steps")]
    pub max_steps: u32,

    /// Maximum sub-agent tasks running at once
    #[serde(rename = "subagent-concurrency")]
    pub subagent_concurrency: usize,

    /// Model for sub-agent runs (falls back to the parent's)
    #[serde(rename = "subagent-model")]
    pub subagent_model: Option<String>,

    /// Step budget for each sub-agent run
    #[serde(rename = "subagent-max-steps")]
    pub subagent_max_steps: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 40,
            subagent_concurrency: 4,
            subagent_model: None,
            subagent_max_steps: 15,
        }
    }
}

/// One external tool-provider subprocess
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolProviderConfig {
    /// Executable to spawn
    pub command: String,

    /// Arguments passed to the executable
    pub args: Vec<String>,

    /// Extra environment variables for the subprocess
    pub env: BTreeMap<String, String>,
}
