//! AgentObserver - outward-facing progress callbacks
//!
//! The engine reports everything a front end needs to render a live run:
//! streamed text, tool start/end pairs, intermediate assistant messages,
//! and sub-agent progress trails. Observers must be cheap and non-blocking;
//! the loop calls them inline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::{MessageMeta, ToolResult};

/// What a sub-agent progress entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressKind {
    /// A tool call inside the nested loop
    Tool,
    /// Assistant text or a status transition
    Text,
}

/// One entry in a sub-agent's append-only progress trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub kind: ProgressKind,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEntry {
    pub fn tool(summary: impl Into<String>) -> Self {
        Self {
            kind: ProgressKind::Tool,
            summary: summary.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn text(summary: impl Into<String>) -> Self {
        Self {
            kind: ProgressKind::Text,
            summary: summary.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Callbacks surfaced during a run
///
/// All methods default to no-ops so observers implement only what they
/// render. `on_tool_start` returns a correlation id that the matching
/// `on_tool_end` and any sub-agent progress entries carry back.
pub trait AgentObserver: Send + Sync {
    /// A chunk of streamed assistant text
    fn on_text_chunk(&self, _text: &str) {}

    /// A tool call is about to execute; returns a correlation id
    fn on_tool_start(&self, _name: &str, _detail: &str, _arguments: &serde_json::Value) -> u64 {
        0
    }

    /// The tool call identified by `correlation_id` finished
    fn on_tool_end(&self, _correlation_id: u64, _name: &str, _detail: &str, _result: &ToolResult, _duration_ms: u64) {
    }

    /// Assistant text produced alongside tool calls, folded into history
    fn on_intermediate_text(&self, _text: &str, _meta: &MessageMeta) {}

    /// A sub-agent appended to the progress trail of a delegating call
    fn on_sub_agent_progress(&self, _correlation_id: u64, _entry: &ProgressEntry) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl AgentObserver for NullObserver {}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_entry_kinds() {
        let tool = ProgressEntry::tool("read src/lib.rs");
        assert_eq!(tool.kind, ProgressKind::Tool);

        let text = ProgressEntry::text("pending");
        assert_eq!(text.kind, ProgressKind::Text);
    }

    #[test]
    fn test_progress_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ProgressKind::Tool).unwrap(), "\"tool\"");
        assert_eq!(serde_json::to_string(&ProgressKind::Text).unwrap(), "\"text\"");
    }

    #[test]
    fn test_null_observer_correlation_id_is_zero() {
        let observer = NullObserver;
        assert_eq!(observer.on_tool_start("read", "x.txt", &serde_json::json!({})), 0);
    }
}
