//! agentcore - sandboxed agentic execution core
//!
//! agentcore is the execution layer of a local coding assistant: a
//! provider-agnostic streaming tool-call loop, a sandboxed tool set, bounded
//! sub-agent delegation, and JSON-RPC tool-provider subprocesses.
//!
//! # Core Concepts
//!
//! - **One Loop, Many Providers**: every vendor stream is translated into
//!   the same event sequence, so the step loop exists exactly once
//! - **Sandbox First**: file and command tools resolve every path against
//!   the project root before touching I/O
//! - **Errors Are Results**: whatever a tool raises comes back to the model
//!   as readable text; only cancellation unwinds a run
//! - **Bounded Delegation**: sub-agents run concurrently up to a configured
//!   limit, with restricted catalogues and observable progress
//!
//! # Modules
//!
//! - [`llm`] - provider adapters and the step event contract
//! - [`agent`] - the step loop, observers, and the run registry
//! - [`tools`] - sandboxed file, search, and shell tools
//! - [`subagent`] - bounded delegation to nested loops
//! - [`rpc`] - tool-provider subprocess client and manager
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod agent;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod environment;
pub mod llm;
pub mod rpc;
pub mod skills;
pub mod subagent;
pub mod tools;

// Re-export commonly used types
pub use agent::{AgentEngine, AgentObserver, NullObserver, ProgressEntry, ProgressKind, RunOutcome, RunRegistry};
pub use config::{AgentConfig, Config, ProviderConfig, SandboxConfig, ToolProviderConfig};
pub use credentials::{Credential, CredentialError, CredentialManager, CredentialStore, FileCredentialStore};
pub use environment::Environment;
pub use llm::{
    ChatMessage, ProviderAdapter, ProviderError, ReasoningEffort, StepEvent, StepRequest, TokenUsage, ToolCall,
    ToolResult, ToolSpec, create_adapter,
};
pub use rpc::{RpcError, ToolProviderClient, ToolProviderManager};
pub use skills::{PreloadedSkills, Skill, SkillLoader};
pub use subagent::{DelegationRequest, SubAgentRunner, SubAgentTask, TaskStatus};
pub use tools::{SandboxContext, TaskKind, TaskSpec, ToolDispatcher, ToolError, ToolScope};
