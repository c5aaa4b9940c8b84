//! Agentcore - sandboxed agentic execution core
//!
//! CLI entry point for one-shot agent runs against a project directory.

use std::fs;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use clap::Parser;
use eyre::{Context, Result};
use tracing::{debug, info, warn};

use agentcore::agent::{AgentEngine, AgentObserver, ProgressEntry, RunOutcome, RunRegistry};
use agentcore::cli::{Cli, Command, OutputFormat};
use agentcore::config::{Config, ProviderConfig};
use agentcore::credentials::{CredentialManager, FileCredentialStore};
use agentcore::environment::Environment;
use agentcore::llm::{MessageMeta, ToolResult, create_adapter};
use agentcore::rpc::ToolProviderManager;
use agentcore::subagent::{SubAgentRunner, spawn_task_spec};
use agentcore::tools::{SandboxContext, ToolDispatcher, ToolScope};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agentcore")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level_str = cli_log_level.or(config_log_level);
    let level = if let Some(s) = level_str {
        match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        }
    } else {
        tracing::Level::INFO
    };

    let log_file = fs::File::create(log_dir.join("agentcore.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    // Load and validate configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate()?;

    info!(
        "Agentcore loaded config: provider={} model={}",
        config.provider.name, config.provider.model
    );

    // Dispatch command
    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Run {
            prompt,
            root,
            model,
            provider,
            max_steps,
        } => {
            debug!(?root, ?model, ?provider, ?max_steps, "main: matched Run command");
            cmd_run(config, &prompt, root, model, provider, max_steps).await
        }
        Command::Tools { format } => {
            debug!(?format, "main: matched Tools command");
            cmd_tools(&config, format).await
        }
        Command::Env => {
            debug!("main: matched Env command");
            cmd_env()
        }
    }
}

/// Run one agentic loop to completion (batch mode)
async fn cmd_run(
    mut config: Config,
    prompt: &str,
    root: Option<PathBuf>,
    model: Option<String>,
    provider: Option<String>,
    max_steps: Option<u32>,
) -> Result<()> {
    debug!("cmd_run: called");

    // Apply CLI overrides; a provider swap resets its defaults first so
    // --model applies on top of the right base URL and key variable.
    if let Some(name) = provider {
        debug!(%name, "cmd_run: overriding provider");
        config.provider = match name.as_str() {
            "anthropic" => ProviderConfig::anthropic_defaults(),
            "openai" => ProviderConfig::openai_defaults(),
            other => {
                return Err(eyre::eyre!(
                    "Unknown provider '{}'. Supported providers: anthropic, openai.",
                    other
                ));
            }
        };
    }
    if let Some(model) = model {
        debug!(%model, "cmd_run: overriding model");
        config.provider.model = model;
    }
    if let Some(max) = max_steps {
        debug!(max, "cmd_run: overriding max-steps");
        config.agent.max_steps = max;
    }

    // Validate the credential early so a missing key fails before any work
    let store = Arc::new(FileCredentialStore::new(config.credentials.resolved_store_path()));
    let credentials = Arc::new(CredentialManager::new(store));
    credentials
        .require(&config.provider.name, config.provider.api_key_env.as_deref())
        .context("No usable credential. Set the provider's API key environment variable or add it to the credential store.")?;
    debug!("cmd_run: credential found");

    let adapter = create_adapter(&config.provider, Arc::clone(&credentials))?;
    debug!(provider = %adapter.name(), "cmd_run: adapter created");

    // Sandbox root priority: --root flag > config > current directory
    let root = match root.or_else(|| config.sandbox.root.clone()) {
        Some(path) => path
            .canonicalize()
            .context(format!("Sandbox root not found: {}", path.display()))?,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    debug!(?root, "cmd_run: sandbox root resolved");

    let env = Environment::probe();
    let sandbox = SandboxContext::new(root.clone(), &config.sandbox, &env);

    // Connect configured tool providers; failures are skipped with a warning
    let providers = Arc::new(ToolProviderManager::connect_all(&config.tool_providers).await);
    if !providers.is_empty() {
        info!("Tool providers connected: {:?}", providers.server_ids());
    }

    let dispatcher = ToolDispatcher::new(ToolScope::Root, sandbox.clone()).with_providers(Arc::clone(&providers));

    // Sub-agents reuse the root adapter unless a dedicated model is configured
    let subagent_adapter = match &config.agent.subagent_model {
        Some(model) => {
            debug!(%model, "cmd_run: creating sub-agent adapter");
            let mut subagent_config = config.provider.clone();
            subagent_config.model = model.clone();
            create_adapter(&subagent_config, Arc::clone(&credentials))?
        }
        None => Arc::clone(&adapter),
    };

    let runner = Arc::new(
        SubAgentRunner::new(Some(subagent_adapter), sandbox.clone())
            .with_concurrency(config.agent.subagent_concurrency)
            .with_max_steps(config.agent.subagent_max_steps)
            .with_max_tokens(config.provider.max_tokens)
            .with_reasoning(config.provider.reasoning),
    );

    let console = Arc::new(ConsoleObserver::new());
    let engine = AgentEngine::new(adapter, dispatcher)
        .with_observer(Arc::clone(&console) as Arc<dyn AgentObserver>)
        .with_subagents(runner)
        .with_max_steps(config.agent.max_steps)
        .with_max_tokens(config.provider.max_tokens)
        .with_reasoning(config.provider.reasoning);

    let registry = Arc::new(RunRegistry::new());
    let run_id = uuid::Uuid::now_v7().to_string();

    // Ctrl+C trips the run's token; the loop stops at its next checkpoint
    {
        let registry = Arc::clone(&registry);
        let run_id = run_id.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!(%run_id, "SIGINT received, cancelling run");
                registry.cancel(&run_id);
            }
        });
    }

    println!("Running agent in {}", root.display());
    println!("  Provider: {} ({})", config.provider.name, config.provider.model);
    println!("  Max steps: {}", config.agent.max_steps);
    println!();

    let outcome = engine.run_with_registry(prompt, &registry, &run_id).await;
    debug!("cmd_run: engine finished");

    providers.shutdown_all().await;

    match outcome {
        RunOutcome::Completed { text, usage, steps } => {
            debug!(steps, "cmd_run: run completed");
            // The step-budget notice is synthesized after the last tool
            // call and never streams; everything else already printed.
            if !console.final_text_was_streamed() && !text.is_empty() {
                println!("{}", text);
            }
            println!();
            println!(
                "✓ Completed after {} step(s) ({} input / {} output tokens)",
                steps, usage.input_tokens, usage.output_tokens
            );
        }
        RunOutcome::Cancelled { .. } => {
            debug!("cmd_run: run cancelled");
            println!();
            println!("⚠ Run cancelled");
        }
        RunOutcome::Error { message, .. } => {
            debug!(%message, "cmd_run: run failed");
            println!();
            println!("✗ Run failed: {}", message);
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Print the tool catalogue a root agent would see
async fn cmd_tools(config: &Config, format: OutputFormat) -> Result<()> {
    debug!(?format, "cmd_tools: called");

    let root = std::env::current_dir().context("Failed to get current directory")?;
    let env = Environment::probe();
    let sandbox = SandboxContext::new(root, &config.sandbox, &env);

    let providers = Arc::new(ToolProviderManager::connect_all(&config.tool_providers).await);
    let dispatcher = ToolDispatcher::new(ToolScope::Root, sandbox).with_providers(Arc::clone(&providers));

    // `run` always attaches a delegation runner, so list spawn_task too
    let mut specs = dispatcher.catalogue();
    specs.push(spawn_task_spec());
    debug!(count = specs.len(), "cmd_tools: catalogue assembled");

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&specs)?);
        }
        OutputFormat::Text => {
            println!("Available tools ({}):", specs.len());
            println!();
            for spec in &specs {
                println!("  {}", spec.name);
                println!("    {}", spec.description);
            }
        }
    }

    providers.shutdown_all().await;
    Ok(())
}

/// Print the probed host environment
fn cmd_env() -> Result<()> {
    debug!("cmd_env: called");
    let env = Environment::probe();

    println!("Host environment");
    println!("----------------");
    println!("Platform:     {}", env.platform);
    println!("Architecture: {}", env.architecture);
    println!("Shell:        {} ({})", env.shell_path, env.shell_name);

    Ok(())
}

/// Streams run activity to the terminal
///
/// Text deltas print as they arrive; tool calls get one arrow line on start
/// and a check or cross on completion; sub-agent progress prints indented
/// under its spawning call.
struct ConsoleObserver {
    next_id: AtomicU64,
    /// Characters streamed since the last tool finished
    tail_chars: AtomicU64,
}

impl ConsoleObserver {
    fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            tail_chars: AtomicU64::new(0),
        }
    }

    /// Whether any final-answer text reached the terminal after the last tool
    fn final_text_was_streamed(&self) -> bool {
        self.tail_chars.load(Ordering::Relaxed) > 0
    }
}

impl AgentObserver for ConsoleObserver {
    fn on_text_chunk(&self, text: &str) {
        self.tail_chars.fetch_add(text.len() as u64, Ordering::Relaxed);
        print!("{}", text);
        let _ = std::io::stdout().flush();
    }

    fn on_tool_start(&self, name: &str, detail: &str, _arguments: &serde_json::Value) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        if detail.is_empty() {
            println!("→ {}", name);
        } else {
            println!("→ {} {}", name, detail);
        }
        id
    }

    fn on_tool_end(&self, _correlation_id: u64, name: &str, _detail: &str, result: &ToolResult, duration_ms: u64) {
        self.tail_chars.store(0, Ordering::Relaxed);
        if result.is_error {
            println!("  ✗ {} failed ({} ms)", name, duration_ms);
        } else {
            println!("  ✓ {} done ({} ms)", name, duration_ms);
        }
    }

    fn on_intermediate_text(&self, _text: &str, _meta: &MessageMeta) {
        // Chunks of this text already streamed; terminate their line.
        println!();
    }

    fn on_sub_agent_progress(&self, correlation_id: u64, entry: &ProgressEntry) {
        println!("    [{}] {}", correlation_id, entry.summary);
    }
}
