//! AgentEngine - the iterative step loop
//!
//! One driver for every provider and every scope: request a step, stream
//! its events into text and tool calls, execute the calls, feed the results
//! back, repeat until a step produces no calls or the budget runs out.
//! Cancellation is checked at every suspension point and always surfaces as
//! a distinct outcome.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::llm::{
    AgentStep, ChatMessage, MessageMeta, ProviderAdapter, ProviderError, ReasoningEffort, StepEvent, StepRequest,
    TokenUsage, ToolCall, ToolResult, ToolSpec,
};
use crate::subagent::{DelegationRequest, SubAgentRunner, spawn_task_spec};
use crate::tools::{SpawnTaskParams, ToolDispatcher, ToolError, call_detail};

use super::observer::{AgentObserver, NullObserver};
use super::registry::RunRegistry;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a coding agent working inside a project directory. Use the \
     available tools to inspect and change the project, then answer the \
     user. Prefer small, verifiable steps. When you are done, reply without \
     calling any tool.";

/// Step events buffer between the adapter task and the loop
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// How a run ended
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The model answered without tool calls, or the step budget ran out
    Completed { text: String, usage: TokenUsage, steps: u32 },
    /// Cancellation observed at a suspension point
    Cancelled { partial_text: String },
    /// Provider transport failure terminated the run
    Error { message: String, partial_text: String },
}

/// Why a step ended before producing an [`AgentStep`]
enum StepAbort {
    Cancelled { partial: String },
    Provider { error: ProviderError, partial: String },
}

/// Iterative tool-call loop over one provider adapter
pub struct AgentEngine {
    adapter: Arc<dyn ProviderAdapter>,
    dispatcher: ToolDispatcher,
    observer: Arc<dyn AgentObserver>,
    /// Delegation runner; `spawn_task` is only declared when present
    subagents: Option<Arc<SubAgentRunner>>,
    system_prompt: String,
    max_steps: u32,
    max_tokens: u32,
    reasoning: ReasoningEffort,
}

impl AgentEngine {
    pub fn new(adapter: Arc<dyn ProviderAdapter>, dispatcher: ToolDispatcher) -> Self {
        debug!(model = %adapter.model(), scope = ?dispatcher.scope(), "AgentEngine::new: called");
        Self {
            adapter,
            dispatcher,
            observer: Arc::new(NullObserver),
            subagents: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_steps: 40,
            max_tokens: 16384,
            reasoning: ReasoningEffort::Off,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn AgentObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Attach a delegation runner, declaring the `spawn_task` tool
    pub fn with_subagents(mut self, runner: Arc<SubAgentRunner>) -> Self {
        self.subagents = Some(runner);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

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

    /// Tool declarations offered on every step of this engine
    pub fn catalogue(&self) -> Vec<ToolSpec> {
        let mut tools = self.dispatcher.catalogue();
        if self.subagents.is_some() {
            tools.push(spawn_task_spec());
        }
        tools
    }

    /// Run to completion under a registry slot, releasing it on return
    pub async fn run_with_registry(&self, prompt: &str, registry: &Arc<RunRegistry>, run_id: &str) -> RunOutcome {
        debug!(%run_id, "AgentEngine::run_with_registry: called");
        let guard = registry.acquire(run_id);
        let outcome = self.run(prompt, guard.token()).await;
        drop(guard);
        outcome
    }

    /// Run the loop until the model answers, the budget runs out, the run
    /// is cancelled, or the provider fails
    pub async fn run(&self, prompt: &str, cancel: &CancellationToken) -> RunOutcome {
        debug!(model = %self.adapter.model(), max_steps = self.max_steps, "AgentEngine::run: called");

        let tools = self.catalogue();
        let mut messages = vec![ChatMessage::user(prompt)];
        let mut usage = TokenUsage::default();
        let mut transcript: Vec<String> = Vec::new();
        let mut steps = 0u32;

        while steps < self.max_steps {
            if cancel.is_cancelled() {
                debug!(step = steps, "AgentEngine::run: cancelled before step");
                return RunOutcome::Cancelled {
                    partial_text: transcript.join("\n\n"),
                };
            }
            steps += 1;
            debug!(step = steps, message_count = messages.len(), "AgentEngine::run: requesting step");

            let request = StepRequest {
                system_prompt: self.system_prompt.clone(),
                messages: messages.clone(),
                tools: tools.clone(),
                max_tokens: self.max_tokens,
                reasoning: self.reasoning,
            };

            let step = match self.stream_one_step(request, cancel).await {
                Ok(step) => step,
                Err(StepAbort::Cancelled { partial }) => {
                    debug!(step = steps, "AgentEngine::run: cancelled mid-stream");
                    if !partial.is_empty() {
                        transcript.push(partial);
                    }
                    return RunOutcome::Cancelled {
                        partial_text: transcript.join("\n\n"),
                    };
                }
                Err(StepAbort::Provider { error, partial }) => {
                    warn!(step = steps, error = %error, "AgentEngine::run: provider error");
                    if !partial.is_empty() {
                        transcript.push(partial);
                    }
                    return RunOutcome::Error {
                        message: error.to_string(),
                        partial_text: transcript.join("\n\n"),
                    };
                }
            };

            usage.absorb(step.usage);

            if !step.has_tool_calls() {
                debug!(step = steps, "AgentEngine::run: final answer");
                return RunOutcome::Completed {
                    text: step.text,
                    usage,
                    steps,
                };
            }

            // Text alongside tool calls is an intermediate message, folded
            // into history and surfaced separately from the final answer.
            let meta = MessageMeta {
                usage: Some(step.usage),
                pending: false,
                task_id: None,
            };
            if !step.text.is_empty() {
                transcript.push(step.text.clone());
                self.observer.on_intermediate_text(&step.text, &meta);
            }
            messages.push(ChatMessage::assistant_step(
                step.text.clone(),
                step.tool_calls.clone(),
                Some(meta),
            ));

            let results = match self.execute_calls(&step.tool_calls, cancel).await {
                Ok(results) => results,
                Err(_) => {
                    debug!(step = steps, "AgentEngine::run: cancelled during tools");
                    return RunOutcome::Cancelled {
                        partial_text: transcript.join("\n\n"),
                    };
                }
            };
            messages.push(ChatMessage::tool_results(results));
        }

        debug!(max_steps = self.max_steps, "AgentEngine::run: step budget exhausted");
        let text = format!(
            "Reached the maximum of {} steps without a final answer. Work so far is reflected in the tool results above.",
            self.max_steps
        );
        RunOutcome::Completed { text, usage, steps }
    }

    /// Stream one provider step into an [`AgentStep`]
    ///
    /// The adapter runs as its own task feeding a bounded channel; this side
    /// accumulates text, assembles fragmented tool-call arguments, and
    /// watches for cancellation between events. Argument buffers that do not
    /// parse become `null`, which the validation boundary rejects uniformly.
    async fn stream_one_step(&self, request: StepRequest, cancel: &CancellationToken) -> Result<AgentStep, StepAbort> {
        let (tx, mut rx) = mpsc::channel::<StepEvent>(EVENT_CHANNEL_CAPACITY);
        let adapter = Arc::clone(&self.adapter);
        let adapter_task = tokio::spawn(async move { adapter.stream_step(request, tx).await });

        let mut step = AgentStep::default();
        let mut fragments: HashMap<String, (String, String)> = HashMap::new();
        let mut issue_order: Vec<String> = Vec::new();

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("AgentEngine::stream_one_step: cancelled, aborting adapter");
                    adapter_task.abort();
                    return Err(StepAbort::Cancelled { partial: step.text });
                }
                event = rx.recv() => event,
            };
            let Some(event) = event else {
                break;
            };

            match event {
                StepEvent::StepStart { input_tokens } => {
                    step.usage.input_tokens = step.usage.input_tokens.saturating_add(input_tokens);
                }
                StepEvent::TextDelta(delta) => {
                    self.observer.on_text_chunk(&delta);
                    step.text.push_str(&delta);
                }
                StepEvent::ToolCallStart { id, name } => {
                    debug!(%id, %name, "AgentEngine::stream_one_step: tool call start");
                    issue_order.push(id.clone());
                    fragments.insert(id, (name, String::new()));
                }
                StepEvent::ToolCallDelta { id, args_delta } => {
                    if let Some((_, buffer)) = fragments.get_mut(&id) {
                        buffer.push_str(&args_delta);
                    }
                }
                StepEvent::ToolCallEnd { .. } => {}
                StepEvent::StepDone { stop_reason, usage } => {
                    step.stop_reason = Some(stop_reason);
                    step.usage.absorb(usage);
                }
            }
        }

        // Channel closed: the adapter finished or failed. Calls assemble in
        // issue order regardless of delta interleaving.
        for id in issue_order {
            if let Some((name, buffer)) = fragments.remove(&id) {
                let arguments = if buffer.trim().is_empty() {
                    serde_json::json!({})
                } else {
                    serde_json::from_str(&buffer).unwrap_or(serde_json::Value::Null)
                };
                step.tool_calls.push(ToolCall { id, name, arguments });
            }
        }

        match adapter_task.await {
            Ok(Ok(())) => Ok(step),
            Ok(Err(error)) => Err(StepAbort::Provider {
                error,
                partial: step.text,
            }),
            Err(join_error) => Err(StepAbort::Provider {
                error: ProviderError::InvalidResponse(format!("provider task failed: {}", join_error)),
                partial: step.text,
            }),
        }
    }

    /// Execute a step's tool calls, results in call-issue order
    ///
    /// Delegation calls run as one batch through the sub-agent runner; all
    /// other calls run strictly sequentially with start/end reported per
    /// call. Only cancellation escapes.
    async fn execute_calls(&self, calls: &[ToolCall], cancel: &CancellationToken) -> Result<Vec<ToolResult>, ToolError> {
        debug!(call_count = calls.len(), "AgentEngine::execute_calls: called");

        let mut indexed: Vec<(usize, ToolResult)> = Vec::with_capacity(calls.len());
        let mut delegation_meta: Vec<(usize, u64, String)> = Vec::new();
        let mut delegations: Vec<DelegationRequest> = Vec::new();
        let mut sequential: Vec<usize> = Vec::new();

        for (idx, call) in calls.iter().enumerate() {
            if self.subagents.is_some() && call.name == "spawn_task" {
                match serde_json::from_value::<SpawnTaskParams>(call.arguments.clone()) {
                    Ok(params) => {
                        let detail = call_detail(&call.name, &call.arguments);
                        let correlation_id = self.observer.on_tool_start(&call.name, &detail, &call.arguments);
                        delegation_meta.push((idx, correlation_id, detail));
                        delegations.push(DelegationRequest {
                            call_id: call.id.clone(),
                            correlation_id,
                            tasks: params.tasks,
                        });
                    }
                    Err(e) => {
                        debug!(call_id = %call.id, error = %e, "AgentEngine::execute_calls: bad delegation arguments");
                        let err = ToolError::Validation {
                            tool: "spawn_task".to_string(),
                            message: e.to_string(),
                        };
                        indexed.push((idx, ToolResult::error(&call.id, format!("tool error: {}", err))));
                    }
                }
            } else {
                sequential.push(idx);
            }
        }

        if let Some(runner) = &self.subagents
            && !delegations.is_empty()
        {
            let started = Instant::now();
            let results = runner.run_delegations(delegations, &self.observer, cancel).await;
            let duration_ms = started.elapsed().as_millis() as u64;
            for ((idx, correlation_id, detail), result) in delegation_meta.into_iter().zip(results) {
                self.observer
                    .on_tool_end(correlation_id, "spawn_task", &detail, &result, duration_ms);
                indexed.push((idx, result));
            }
        }

        for idx in sequential {
            if cancel.is_cancelled() {
                debug!("AgentEngine::execute_calls: cancelled before tool");
                return Err(ToolError::RunCancelled);
            }
            let call = &calls[idx];
            let detail = call_detail(&call.name, &call.arguments);
            let correlation_id = self.observer.on_tool_start(&call.name, &detail, &call.arguments);
            let started = Instant::now();
            let result = self.dispatcher.dispatch(call, cancel).await?;
            let duration_ms = started.elapsed().as_millis() as u64;
            self.observer.on_tool_end(correlation_id, &call.name, &detail, &result, duration_ms);
            indexed.push((idx, result));
        }

        indexed.sort_by_key(|(idx, _)| *idx);
        Ok(indexed.into_iter().map(|(_, result)| result).collect())
    }
}

impl std::fmt::Debug for AgentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentEngine")
            .field("model", &self.adapter.model())
            .field("scope", &self.dispatcher.scope())
            .field("subagents", &self.subagents.is_some())
            .field("max_steps", &self.max_steps)
            .finish()
    }
}
