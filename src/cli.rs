//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// agentcore - sandboxed agentic execution core
#[derive(Parser)]
#[command(
    name = "ac",
    about = "Sandboxed agentic execution core for local coding assistants",
    version,
    after_help = "Logs are written to: ~/.local/share/agentcore/logs/agentcore.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, help = "Log level (trace, debug, info, warn, error)")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the agent once with a prompt
    Run {
        /// What to do
        prompt: String,

        /// Project root the run is sandboxed to (default: current directory)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Model override
        #[arg(short, long)]
        model: Option<String>,

        /// Provider override (anthropic, openai)
        #[arg(short, long)]
        provider: Option<String>,

        /// Maximum provider steps for this run
        #[arg(long)]
        max_steps: Option<u32>,
    },

    /// Print the tool catalogue, including connected tool providers
    Tools {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the probed host environment
    Env,
}

/// Output format for the tools command
#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
