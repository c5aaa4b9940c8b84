//! Sub-agent delegation - nested loops with restricted catalogues
//!
//! A `spawn_task` call creates one task per entry; the runner executes them
//! as full nested agent loops, bounded to a configured number of concurrent
//! instances. Every task in a delegation set is announced as pending before
//! any of them starts, then the set is processed in fixed-size batches: all
//! tasks in a batch run concurrently, and the next batch starts only after
//! the whole batch settles. Sub-agents never delegate further.

use std::fmt;
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::agent::{AgentEngine, AgentObserver, ProgressEntry, RunOutcome};
use crate::llm::{MessageMeta, ProviderAdapter, ReasoningEffort, ToolResult, ToolSpec};
use crate::tools::{SandboxContext, TaskKind, TaskSpec, ToolDispatcher, ToolScope};

const EXPLORE_SYSTEM_PROMPT: &str = "You are a read-only exploration agent. Investigate the project with the \
     available tools and answer the question you were given. You cannot \
     modify files or run commands. Finish with a concise report of your \
     findings, including relevant file paths.";

const GENERAL_SYSTEM_PROMPT: &str = "You are a focused worker agent. Complete the task you were given using \
     the available tools, keeping changes minimal. Finish with a short \
     summary of what you did and anything the caller should know.";

/// Longest prompt excerpt carried in progress summaries
const EXCERPT_CHARS: usize = 60;

/// Lifecycle of a delegated task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Error,
    Cancelled,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One delegated nested-loop task
///
/// Created when a `spawn_task` call is dispatched; lives only for the run.
#[derive(Debug, Clone)]
pub struct SubAgentTask {
    pub id: String,
    pub kind: TaskKind,
    pub prompt: String,
    pub status: TaskStatus,
    /// Append-only trail of what the nested loop did
    pub progress: Vec<ProgressEntry>,
    /// Final answer text once the task settles
    pub result: Option<String>,
}

impl SubAgentTask {
    pub fn new(spec: &TaskSpec) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            kind: spec.kind,
            prompt: spec.prompt.clone(),
            status: TaskStatus::Pending,
            progress: Vec::new(),
            result: None,
        }
    }
}

/// Tool declaration for delegation
///
/// Appended to the root catalogue by the engine when a runner is attached;
/// the dispatcher never declares or executes it.
pub fn spawn_task_spec() -> ToolSpec {
    ToolSpec::new(
        "spawn_task",
        "Delegate work to sub-agents running in parallel. Each task gets its own agent \
         with a restricted tool set: explore tasks are read-only (list, read, glob, grep), \
         general tasks can also write, edit, and run commands. Sub-agents cannot delegate \
         further. Returns the final report of every task.",
        json!({
            "type": "object",
            "properties": {
                "tasks": {
                    "type": "array",
                    "description": "Tasks to run concurrently",
                    "items": {
                        "type": "object",
                        "properties": {
                            "kind": {
                                "type": "string",
                                "enum": ["general", "explore"],
                                "description": "explore for read-only investigation, general for work that changes files"
                            },
                            "prompt": {
                                "type": "string",
                                "description": "Complete, self-contained instructions for the sub-agent"
                            }
                        },
                        "required": ["kind", "prompt"]
                    }
                }
            },
            "required": ["tasks"]
        }),
    )
}

/// One `spawn_task` call awaiting its result
///
/// The correlation id comes from the observer's `on_tool_start` for the
/// delegating call; progress entries for the call's tasks carry it back.
#[derive(Debug)]
pub struct DelegationRequest {
    pub call_id: String,
    pub correlation_id: u64,
    pub tasks: Vec<TaskSpec>,
}

/// Executes delegated tasks as bounded concurrent nested loops
pub struct SubAgentRunner {
    /// Adapter for nested loops; `None` turns every task into an
    /// explanatory error result instead of a failure
    adapter: Option<Arc<dyn ProviderAdapter>>,
    sandbox: SandboxContext,
    concurrency: usize,
    max_steps: u32,
    max_tokens: u32,
    reasoning: ReasoningEffort,
}

impl SubAgentRunner {
    pub fn new(adapter: Option<Arc<dyn ProviderAdapter>>, sandbox: SandboxContext) -> Self {
        debug!(has_adapter = adapter.is_some(), "SubAgentRunner::new: called");
        Self {
            adapter,
            sandbox,
            concurrency: 4,
            max_steps: 15,
            max_tokens: 16384,
            reasoning: ReasoningEffort::Off,
        }
    }

    /// Set the concurrency limit (clamped to at least 1)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the per-task step budget
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_reasoning(mut self, reasoning: ReasoningEffort) -> Self {
        self.reasoning = reasoning;
        self
    }

    /// Run every task of every request, one result per request
    ///
    /// Tasks from all requests are flattened, announced as pending, then
    /// processed in batches of `concurrency`. Results come back in request
    /// order, each grouping its own tasks' reports.
    pub async fn run_delegations(
        &self,
        requests: Vec<DelegationRequest>,
        observer: &Arc<dyn AgentObserver>,
        cancel: &CancellationToken,
    ) -> Vec<ToolResult> {
        let task_count: usize = requests.iter().map(|r| r.tasks.len()).sum();
        debug!(
            request_count = requests.len(),
            task_count,
            concurrency = self.concurrency,
            "SubAgentRunner::run_delegations: called"
        );

        // Flatten to (request index, task slot) and announce everything
        // as pending before any task starts.
        let mut queue: Vec<(usize, usize, SubAgentTask)> = Vec::with_capacity(task_count);
        for (req_idx, request) in requests.iter().enumerate() {
            for (task_idx, spec) in request.tasks.iter().enumerate() {
                let mut task = SubAgentTask::new(spec);
                let entry = ProgressEntry::text(format!("pending ({}): {}", task.kind, excerpt(&task.prompt)));
                task.progress.push(entry.clone());
                observer.on_sub_agent_progress(request.correlation_id, &entry);
                queue.push((req_idx, task_idx, task));
            }
        }

        // Fixed-size batches; the next batch starts only after the whole
        // batch settles.
        let mut settled: Vec<(usize, usize, SubAgentTask)> = Vec::with_capacity(task_count);
        while !queue.is_empty() {
            let tail = queue.split_off(queue.len().min(self.concurrency));
            let batch = std::mem::replace(&mut queue, tail);
            debug!(batch_size = batch.len(), "SubAgentRunner::run_delegations: starting batch");

            let futures = batch.into_iter().map(|(req_idx, task_idx, task)| {
                let correlation_id = requests[req_idx].correlation_id;
                async move {
                    let task = self.run_one(task, correlation_id, observer, cancel).await;
                    (req_idx, task_idx, task)
                }
            });
            settled.extend(join_all(futures).await);
        }

        // Group settled tasks back into one result per request. Batches
        // preserve queue order, so tasks arrive in request/slot order.
        let mut grouped: Vec<Vec<SubAgentTask>> = requests.iter().map(|r| Vec::with_capacity(r.tasks.len())).collect();
        for (req_idx, _, task) in settled {
            grouped[req_idx].push(task);
        }

        requests
            .iter()
            .zip(grouped)
            .map(|(request, tasks)| render_result(&request.call_id, &tasks))
            .collect()
    }

    /// Run one task as a nested loop and settle its status
    async fn run_one(
        &self,
        mut task: SubAgentTask,
        correlation_id: u64,
        observer: &Arc<dyn AgentObserver>,
        cancel: &CancellationToken,
    ) -> SubAgentTask {
        debug!(task_id = %task.id, kind = %task.kind, "SubAgentRunner::run_one: called");

        if cancel.is_cancelled() {
            debug!(task_id = %task.id, "SubAgentRunner::run_one: cancelled before start");
            task.status = TaskStatus::Cancelled;
            let entry = ProgressEntry::text("cancelled before start");
            task.progress.push(entry.clone());
            observer.on_sub_agent_progress(correlation_id, &entry);
            return task;
        }

        let Some(adapter) = &self.adapter else {
            debug!(task_id = %task.id, "SubAgentRunner::run_one: no adapter available");
            task.status = TaskStatus::Error;
            task.result = Some(
                "No provider is available for sub-agent tasks. Configure a sub-agent \
                 model or provider credentials."
                    .to_string(),
            );
            return task;
        };

        task.status = TaskStatus::Running;
        let entry = ProgressEntry::text(format!("running ({}): {}", task.kind, excerpt(&task.prompt)));
        task.progress.push(entry.clone());
        observer.on_sub_agent_progress(correlation_id, &entry);

        let (scope, system_prompt) = match task.kind {
            TaskKind::Explore => (ToolScope::Explore, EXPLORE_SYSTEM_PROMPT),
            TaskKind::General => (ToolScope::General, GENERAL_SYSTEM_PROMPT),
        };

        let trail = Arc::new(TrailObserver::new(Arc::clone(observer), correlation_id));
        let engine = AgentEngine::new(Arc::clone(adapter), ToolDispatcher::new(scope, self.sandbox.clone()))
            .with_observer(Arc::clone(&trail) as Arc<dyn AgentObserver>)
            .with_system_prompt(system_prompt)
            .with_max_steps(self.max_steps)
            .with_max_tokens(self.max_tokens)
            .with_reasoning(self.reasoning);

        match engine.run(&task.prompt, cancel).await {
            RunOutcome::Completed { text, .. } => {
                debug!(task_id = %task.id, "SubAgentRunner::run_one: completed");
                task.status = TaskStatus::Completed;
                task.result = Some(text);
            }
            RunOutcome::Cancelled { partial_text } => {
                debug!(task_id = %task.id, "SubAgentRunner::run_one: cancelled");
                task.status = TaskStatus::Cancelled;
                if !partial_text.is_empty() {
                    task.result = Some(partial_text);
                }
            }
            RunOutcome::Error { message, partial_text } => {
                debug!(task_id = %task.id, %message, "SubAgentRunner::run_one: error");
                task.status = TaskStatus::Error;
                task.result = Some(if partial_text.is_empty() {
                    message
                } else {
                    format!("{}\n{}", message, partial_text)
                });
            }
        }

        task.progress.extend(trail.drain());
        let entry = ProgressEntry::text(task.status.to_string());
        task.progress.push(entry.clone());
        observer.on_sub_agent_progress(correlation_id, &entry);
        task
    }
}

impl fmt::Debug for SubAgentRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubAgentRunner")
            .field("adapter", &self.adapter.as_ref().map(|a| a.name()))
            .field("concurrency", &self.concurrency)
            .field("max_steps", &self.max_steps)
            .finish()
    }
}

/// Observer wrapper streaming a nested loop's activity to the parent
///
/// Records one entry per internal tool call and per intermediate message,
/// forwarding each to the parent's progress callback under the delegating
/// call's correlation id. Streamed text chunks are not forwarded.
struct TrailObserver {
    parent: Arc<dyn AgentObserver>,
    correlation_id: u64,
    trail: Mutex<Vec<ProgressEntry>>,
}

impl TrailObserver {
    fn new(parent: Arc<dyn AgentObserver>, correlation_id: u64) -> Self {
        Self {
            parent,
            correlation_id,
            trail: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, entry: ProgressEntry) {
        self.trail.lock().unwrap().push(entry.clone());
        self.parent.on_sub_agent_progress(self.correlation_id, &entry);
    }

    fn drain(&self) -> Vec<ProgressEntry> {
        std::mem::take(&mut *self.trail.lock().unwrap())
    }
}

impl AgentObserver for TrailObserver {
    fn on_tool_start(&self, name: &str, detail: &str, _arguments: &serde_json::Value) -> u64 {
        let summary = if detail.is_empty() {
            name.to_string()
        } else {
            format!("{} {}", name, detail)
        };
        self.record(ProgressEntry::tool(summary));
        0
    }

    fn on_intermediate_text(&self, text: &str, _meta: &MessageMeta) {
        self.record(ProgressEntry::text(excerpt(text)));
    }
}

/// Whitespace-flattened text, shortened for progress summaries
fn excerpt(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= EXCERPT_CHARS {
        flat
    } else {
        let cut: String = flat.chars().take(EXCERPT_CHARS).collect();
        format!("{}…", cut)
    }
}

/// Render a request's settled tasks into one tool result
///
/// The result is flagged as an error only when every task failed; mixed
/// outcomes read as a success with per-task status lines.
fn render_result(call_id: &str, tasks: &[SubAgentTask]) -> ToolResult {
    let mut sections = Vec::with_capacity(tasks.len());
    for (idx, task) in tasks.iter().enumerate() {
        let header = format!("Task {} ({}): {}", idx + 1, task.kind, task.status);
        match &task.result {
            Some(text) if !text.is_empty() => sections.push(format!("{}\n{}", header, text)),
            _ => sections.push(header),
        }
    }
    let content = sections.join("\n\n");

    let all_failed = !tasks.is_empty() && tasks.iter().all(|t| t.status != TaskStatus::Completed);
    if all_failed {
        ToolResult::error(call_id, content)
    } else {
        ToolResult::success(call_id, content)
    }
}
