//! Integration tests for agentcore
//!
//! These tests verify end-to-end behavior through the public API: the
//! sandboxed tool set behind its dispatcher, shell execution limits, run
//! cancellation, the sub-agent scheduler, configuration loading, and the
//! credential store.

use std::sync::Arc;
use std::time::Duration;

use agentcore::agent::{AgentObserver, NullObserver, RunRegistry};
use agentcore::config::Config;
use agentcore::credentials::{Credential, CredentialManager, CredentialStore, FileCredentialStore};
use agentcore::llm::ToolCall;
use agentcore::subagent::{DelegationRequest, SubAgentRunner};
use agentcore::tools::{SandboxContext, TaskKind, TaskSpec, ToolDispatcher, ToolError, ToolScope};
use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    }
}

// =============================================================================
// Sandboxed Tool Tests
// =============================================================================

#[tokio::test]
async fn test_write_read_edit_roundtrip() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let dispatcher = ToolDispatcher::new(ToolScope::Root, SandboxContext::rooted(temp.path().to_path_buf()));
    let cancel = CancellationToken::new();

    // Write a file through the dispatcher
    let result = dispatcher
        .dispatch(
            &call("c1", "write", json!({"path": "notes.txt", "content": "alpha\nbeta\n"})),
            &cancel,
        )
        .await
        .expect("write should not unwind");
    assert!(!result.is_error, "write should succeed: {}", result.content);
    assert!(result.content.starts_with("Wrote "), "unexpected summary: {}", result.content);

    // Read it back
    let result = dispatcher
        .dispatch(&call("c2", "read", json!({"path": "notes.txt"})), &cancel)
        .await
        .expect("read should not unwind");
    assert_eq!(result.content, "alpha\nbeta\n");

    // Edit one line
    let result = dispatcher
        .dispatch(
            &call("c3", "edit", json!({"path": "notes.txt", "old_text": "beta", "new_text": "gamma"})),
            &cancel,
        )
        .await
        .expect("edit should not unwind");
    assert!(!result.is_error, "edit should succeed: {}", result.content);
    assert_eq!(result.content, "Replaced 1 occurrence(s) in notes.txt");

    // The change is visible on disk
    let on_disk = std::fs::read_to_string(temp.path().join("notes.txt")).expect("Failed to read file");
    assert_eq!(on_disk, "alpha\ngamma\n");

    // The replaced text is gone, so the same edit now fails
    let result = dispatcher
        .dispatch(
            &call("c4", "edit", json!({"path": "notes.txt", "old_text": "beta", "new_text": "gamma"})),
            &cancel,
        )
        .await
        .expect("edit should not unwind");
    assert!(result.is_error, "re-editing vanished text must fail");
    assert!(
        result.content.contains("not found in file"),
        "unexpected message: {}",
        result.content
    );
}

#[tokio::test]
async fn test_path_escape_is_reported_as_tool_error() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let dispatcher = ToolDispatcher::new(ToolScope::Root, SandboxContext::rooted(temp.path().to_path_buf()));

    let result = dispatcher
        .dispatch(
            &call("c1", "read", json!({"path": "../../etc/passwd"})),
            &CancellationToken::new(),
        )
        .await
        .expect("escape should surface as a result, not unwind");

    assert!(result.is_error, "escaping path must fail");
    assert!(result.content.starts_with("tool error:"), "unexpected prefix: {}", result.content);
    assert!(
        result.content.contains("escapes project root"),
        "unexpected message: {}",
        result.content
    );
}

#[tokio::test]
async fn test_explore_scope_rejects_writes() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let dispatcher = ToolDispatcher::new(ToolScope::Explore, SandboxContext::rooted(temp.path().to_path_buf()));

    // The catalogue carries only the read-only set
    let specs = dispatcher.catalogue();
    let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["list", "read", "glob", "grep"]);

    // A write dispatch comes back as a tool error without touching disk
    let result = dispatcher
        .dispatch(
            &call("c1", "write", json!({"path": "f.txt", "content": "x"})),
            &CancellationToken::new(),
        )
        .await
        .expect("out-of-scope tool should surface as a result");
    assert!(result.is_error);
    assert!(
        result.content.contains("Tool not found: write"),
        "unexpected message: {}",
        result.content
    );
    assert!(!temp.path().join("f.txt").exists(), "write must not reach the filesystem");
}

#[tokio::test]
async fn test_glob_lists_only_matching_files() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    std::fs::write(temp.path().join("a.ts"), "export {};\n").expect("Failed to write file");
    std::fs::write(temp.path().join("b.tsx"), "export {};\n").expect("Failed to write file");
    std::fs::write(temp.path().join("c.js"), "module.exports = {};\n").expect("Failed to write file");
    let dispatcher = ToolDispatcher::new(ToolScope::Root, SandboxContext::rooted(temp.path().to_path_buf()));

    let result = dispatcher
        .dispatch(&call("c1", "glob", json!({"pattern": "**/*.ts"})), &CancellationToken::new())
        .await
        .expect("glob should not unwind");

    assert!(!result.is_error);
    assert_eq!(result.content, "a.ts", "only the .ts file should match");
}

// =============================================================================
// Shell Tests
// =============================================================================

#[tokio::test]
async fn test_run_captures_command_output() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let dispatcher = ToolDispatcher::new(ToolScope::Root, SandboxContext::rooted(temp.path().to_path_buf()));

    let result = dispatcher
        .dispatch(&call("c1", "run", json!({"command": "echo hello"})), &CancellationToken::new())
        .await
        .expect("run should not unwind");

    assert!(!result.is_error, "echo should succeed: {}", result.content);
    assert_eq!(result.content.trim(), "hello");
}

#[tokio::test]
async fn test_run_timeout_reports_and_terminates() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let dispatcher = ToolDispatcher::new(ToolScope::Root, SandboxContext::rooted(temp.path().to_path_buf()));

    let result = dispatcher
        .dispatch(
            &call(
                "c1",
                "run",
                json!({"command": "sleep 1 && touch late-marker.txt", "timeout_ms": 100}),
            ),
            &CancellationToken::new(),
        )
        .await
        .expect("timeout should surface as a result");

    assert!(result.is_error, "timed-out command must fail");
    assert!(result.content.contains("timed out"), "unexpected message: {}", result.content);

    // The shell died before the && chain could run
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(
        !temp.path().join("late-marker.txt").exists(),
        "command should be terminated, not left running"
    );
}

// =============================================================================
// Run Registry Tests
// =============================================================================

#[tokio::test]
async fn test_cancel_by_run_id_unwinds_running_tool() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let dispatcher = ToolDispatcher::new(ToolScope::Root, SandboxContext::rooted(temp.path().to_path_buf()));

    let registry = Arc::new(RunRegistry::new());
    let guard = registry.acquire("run-1");
    let token = guard.token().clone();

    let dispatch = tokio::spawn(async move {
        dispatcher
            .dispatch(&call("c1", "run", json!({"command": "sleep 30"})), &token)
            .await
    });

    // Let the command start, then cancel through the registry
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(registry.cancel("run-1"), "active run should be registered");

    let result = tokio::time::timeout(Duration::from_secs(5), dispatch)
        .await
        .expect("dispatch should return promptly after cancellation")
        .expect("dispatch task should not panic");
    assert!(
        matches!(result, Err(ToolError::RunCancelled)),
        "cancellation should unwind past the dispatcher"
    );

    // Dropping the guard releases the slot
    drop(guard);
    assert!(!registry.cancel("run-1"), "released run id should be unknown");
}

// =============================================================================
// Sub-Agent Tests
// =============================================================================

#[tokio::test]
async fn test_delegation_without_provider_reports_every_task() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let runner = SubAgentRunner::new(None, SandboxContext::rooted(temp.path().to_path_buf()));
    let observer: Arc<dyn AgentObserver> = Arc::new(NullObserver);

    let requests = vec![DelegationRequest {
        call_id: "call-1".to_string(),
        correlation_id: 7,
        tasks: vec![
            TaskSpec {
                kind: TaskKind::Explore,
                prompt: "survey the module layout".to_string(),
            },
            TaskSpec {
                kind: TaskKind::General,
                prompt: "rename the helper".to_string(),
            },
        ],
    }];

    let results = runner
        .run_delegations(requests, &observer, &CancellationToken::new())
        .await;

    assert_eq!(results.len(), 1, "one result per spawn_task call");
    let result = &results[0];
    assert_eq!(result.call_id, "call-1");
    assert!(result.is_error, "every task failed, so the result is an error");
    assert!(
        result.content.contains("Task 1 (explore): error"),
        "unexpected content: {}",
        result.content
    );
    assert!(
        result.content.contains("Task 2 (general): error"),
        "unexpected content: {}",
        result.content
    );
    assert!(
        result.content.contains("No provider is available"),
        "unexpected content: {}",
        result.content
    );
}

// =============================================================================
// Config Tests
// =============================================================================

#[test]
fn test_config_loads_from_yaml_file() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let path = temp.path().join("agentcore.yml");
    std::fs::write(
        &path,
        r#"
provider:
  name: openai
  model: gpt-4o-mini
  base-url: https://api.openai.com/v1
  api-key-env: OPENAI_API_KEY

sandbox:
  command-timeout-ms: 10000

agent:
  max-steps: 12
  subagent-concurrency: 3

tool-providers:
  calc:
    command: calc-server
    args: ["--stdio"]
"#,
    )
    .expect("Failed to write config");

    let config = Config::load(Some(&path)).expect("Failed to load config");

    assert_eq!(config.provider.name, "openai");
    assert_eq!(config.provider.model, "gpt-4o-mini");
    assert_eq!(config.sandbox.command_timeout_ms, 10_000);
    assert_eq!(config.agent.max_steps, 12);
    assert_eq!(config.agent.subagent_concurrency, 3);
    assert!(config.tool_providers.contains_key("calc"));
    assert_eq!(config.tool_providers["calc"].command, "calc-server");

    config.validate().expect("loaded config should validate");
}

#[test]
fn test_config_rejects_unknown_provider() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let path = temp.path().join("agentcore.yml");
    std::fs::write(&path, "provider:\n  name: mystery\n  model: anything\n").expect("Failed to write config");

    let config = Config::load(Some(&path)).expect("Failed to load config");
    let err = config.validate().expect_err("unknown provider must not validate");
    assert!(err.to_string().contains("Unknown provider"), "unexpected error: {}", err);
}

// =============================================================================
// Credential Store Tests
// =============================================================================

#[test]
fn test_credential_store_persists_across_instances() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let path = temp.path().join("credentials.json");

    let store = FileCredentialStore::new(&path);
    store
        .set(
            "anthropic",
            Credential::Secret {
                value: "sk-test-123".to_string(),
            },
        )
        .expect("Failed to store credential");

    // A fresh instance over the same file sees the credential
    let reopened = FileCredentialStore::new(&path);
    let credential = reopened
        .get("anthropic")
        .expect("Failed to read store")
        .expect("credential should persist");
    match credential {
        Credential::Secret { value } => assert_eq!(value, "sk-test-123"),
        _ => panic!("expected a secret credential"),
    }
}

#[test]
fn test_credential_manager_reports_missing_credential() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let store = Arc::new(FileCredentialStore::new(temp.path().join("credentials.json")));
    let manager = CredentialManager::new(Arc::clone(&store) as Arc<dyn CredentialStore>);

    let err = manager
        .require("anthropic", Some("AGENTCORE_TEST_KEY_THAT_IS_NOT_SET"))
        .expect_err("empty store and unset env var should fail");
    assert!(err.to_string().contains("No credential found"), "unexpected error: {}", err);

    // A stored secret satisfies the same lookup
    store
        .set(
            "anthropic",
            Credential::Secret {
                value: "sk-test".to_string(),
            },
        )
        .expect("Failed to store credential");
    manager
        .require("anthropic", None)
        .expect("stored secret should satisfy require");
}
