//! Provider-facing request/response types
//!
//! These types model one step of the agent loop in a provider-agnostic way.
//! Each vendor adapter converts them to and from its own wire format and
//! reports progress as a uniform sequence of [`StepEvent`]s.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Everything needed for one provider step
#[derive(Debug, Clone)]
pub struct StepRequest {
    /// System prompt for the run
    pub system_prompt: String,

    /// Ordered conversation so far
    pub messages: Vec<ChatMessage>,

    /// Tool catalogue offered for this step
    pub tools: Vec<ToolSpec>,

    /// Max tokens for the response
    pub max_tokens: u32,

    /// Optional reasoning budget (vendor-specific mapping)
    pub reasoning: ReasoningEffort,
}

/// A message in the conversation
///
/// Append-only during a run. Assistant messages may carry the tool calls
/// they issued; a `Tool` message carries the results answering them, in the
/// same order the calls were issued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageAttachment>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<MessageMeta>,
}

impl ChatMessage {
    /// Create a user message with text content
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
            images: Vec::new(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            meta: None,
        }
    }

    /// Create a plain assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
            images: Vec::new(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            meta: None,
        }
    }

    /// Create an assistant message carrying the tool calls of a step
    pub fn assistant_step(text: impl Into<String>, tool_calls: Vec<ToolCall>, meta: Option<MessageMeta>) -> Self {
        debug!(call_count = %tool_calls.len(), "ChatMessage::assistant_step: called");
        Self {
            role: Role::Assistant,
            content: text.into(),
            images: Vec::new(),
            tool_calls,
            tool_results: Vec::new(),
            meta,
        }
    }

    /// Create a tool message carrying results in call-issue order
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        debug!(result_count = %results.len(), "ChatMessage::tool_results: called");
        Self {
            role: Role::Tool,
            content: String::new(),
            images: Vec::new(),
            tool_calls: Vec::new(),
            tool_results: results,
            meta: None,
        }
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// Inline image attachment (base64 payload)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAttachment {
    /// MIME type, e.g. "image/png"
    pub media_type: String,
    /// Base64-encoded image data
    pub data: String,
}

/// Optional per-message metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageMeta {
    /// Token usage of the step that produced this message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,

    /// Marks a placeholder for work that has not finished yet
    #[serde(default)]
    pub pending: bool,

    /// Links this message to a sub-agent task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

/// Tool declaration offered to the model
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,

    /// Set for tools owned by an external tool-provider connection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
}

impl ToolSpec {
    /// Create a built-in tool declaration
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: serde_json::Value) -> Self {
        let name = name.into();
        debug!(%name, "ToolSpec::new: called");
        Self {
            name,
            description: description.into(),
            input_schema,
            server_id: None,
        }
    }

    /// Convert to the Anthropic tools-array entry format
    pub fn to_anthropic_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "input_schema": self.input_schema,
        })
    }

    /// Convert to the OpenAI function-tool entry format
    pub fn to_openai_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.input_schema,
            },
        })
    }
}

/// A tool call issued by the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlation id assigned by the provider
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// The textual answer to one tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Correlation id of the call this answers
    pub call_id: String,
    pub content: String,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    /// Successful result
    pub fn success(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    /// Failed result (already stringified by the dispatcher)
    pub fn error(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}

/// One completed request/response round trip
///
/// Ephemeral: folded into the conversation at the end of each step and then
/// discarded.
#[derive(Debug, Clone, Default)]
pub struct AgentStep {
    /// Accumulated assistant text
    pub text: String,

    /// Accumulated tool calls, in issue order
    pub tool_calls: Vec<ToolCall>,

    /// Token usage summed across partial reports
    pub usage: TokenUsage,

    /// Why the model stopped
    pub stop_reason: Option<StopReason>,
}

impl AgentStep {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Why the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
}

impl StopReason {
    /// Parse from an Anthropic stop_reason string
    pub fn from_anthropic(s: &str) -> Self {
        debug!(%s, "StopReason::from_anthropic: called");
        match s {
            "end_turn" => StopReason::EndTurn,
            "tool_use" => StopReason::ToolUse,
            "max_tokens" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            _ => {
                debug!(%s, "StopReason::from_anthropic: unknown, defaulting to EndTurn");
                StopReason::EndTurn
            }
        }
    }

    /// Parse from an OpenAI finish_reason string
    pub fn from_openai(s: &str) -> Self {
        debug!(%s, "StopReason::from_openai: called");
        match s {
            "stop" => StopReason::EndTurn,
            "tool_calls" => StopReason::ToolUse,
            "length" => StopReason::MaxTokens,
            _ => {
                debug!(%s, "StopReason::from_openai: unknown, defaulting to EndTurn");
                StopReason::EndTurn
            }
        }
    }
}

/// Token usage for cost tracking
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Fold another partial usage report into this one
    ///
    /// Vendors report usage at different points in a stream (start-of-message
    /// input counts, end-of-message output counts). Partial reports are
    /// summed, never overwritten, so neither report clobbers the other.
    pub fn absorb(&mut self, other: TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }
}

/// Reasoning budget for a step
///
/// Maps to a numeric thinking-token budget on Anthropic and a categorical
/// effort parameter on OpenAI. `Off` omits the parameter entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    #[default]
    Off,
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    /// Anthropic thinking-token budget, `None` when off
    pub fn anthropic_budget(&self) -> Option<u32> {
        match self {
            ReasoningEffort::Off => None,
            ReasoningEffort::Low => Some(2048),
            ReasoningEffort::Medium => Some(8192),
            ReasoningEffort::High => Some(16384),
        }
    }

    /// OpenAI reasoning_effort string, `None` when off
    pub fn openai_effort(&self) -> Option<&'static str> {
        match self {
            ReasoningEffort::Off => None,
            ReasoningEffort::Low => Some("low"),
            ReasoningEffort::Medium => Some("medium"),
            ReasoningEffort::High => Some("high"),
        }
    }
}

/// One event in the lazy step stream produced by an adapter
///
/// The sequence is finite and non-restartable: it begins with at most one
/// `StepStart`, ends with exactly one `StepDone` on success, and is closed
/// early on transport failure.
#[derive(Debug, Clone)]
pub enum StepEvent {
    /// Stream opened; carries the input token count when reported up front
    StepStart { input_tokens: u64 },

    /// Assistant text fragment
    TextDelta(String),

    /// A tool call opened
    ToolCallStart { id: String, name: String },

    /// Argument fragment for an open tool call
    ToolCallDelta { id: String, args_delta: String },

    /// A tool call's arguments are complete
    ToolCallEnd { id: String },

    /// Stream finished with final stop reason and usage
    StepDone { stop_reason: StopReason, usage: TokenUsage },
}
