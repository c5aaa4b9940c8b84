//! OpenAI Chat Completions adapter
//!
//! Translates the chat-completions SSE stream into the uniform step-event
//! sequence. Unlike the Messages API there is no per-call end marker: tool
//! call fragments are keyed by index, the id and name arrive only on the
//! first fragment, and every open call closes when the stream finishes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::debug;

use super::{ProviderAdapter, ProviderError, Role, StepEvent, StepRequest, StopReason, TokenUsage};
use crate::config::ProviderConfig;
use crate::credentials::CredentialManager;

/// OpenAI Chat Completions adapter
pub struct OpenAIAdapter {
    provider_id: String,
    model: String,
    base_url: String,
    api_key_env: Option<String>,
    max_tokens: u32,
    http: Client,
    credentials: Arc<CredentialManager>,
}

impl OpenAIAdapter {
    /// Create an adapter, failing fast when no usable credential resolves
    pub fn new(config: &ProviderConfig, credentials: Arc<CredentialManager>) -> Result<Self, ProviderError> {
        debug!(model = %config.model, "OpenAIAdapter::new: called");
        credentials.require(&config.name, config.api_key_env.as_deref())?;

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(ProviderError::Transport)?;

        Ok(Self {
            provider_id: config.name.clone(),
            model: config.model.clone(),
            base_url: config.base_url.clone(),
            api_key_env: config.api_key_env.clone(),
            max_tokens: config.max_tokens,
            http,
            credentials,
        })
    }

    /// Build the chat-completions request body
    fn build_request_body(&self, request: &StepRequest) -> serde_json::Value {
        debug!(%self.model, %request.max_tokens, "OpenAIAdapter::build_request_body: called");

        let mut messages = vec![serde_json::json!({
            "role": "system",
            "content": request.system_prompt,
        })];
        messages.extend(convert_messages(&request.messages));

        let max_tokens = request.max_tokens.min(self.max_tokens);

        // GPT-5.x and o1/o3 models use max_completion_tokens instead of max_tokens
        let uses_completion_tokens =
            self.model.starts_with("gpt-5") || self.model.starts_with("o1") || self.model.starts_with("o3");

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
            "stream_options": { "include_usage": true },
        });

        if uses_completion_tokens {
            body["max_completion_tokens"] = serde_json::json!(max_tokens);
        } else {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(request.tools.iter().map(|t| t.to_openai_schema()).collect::<Vec<_>>());
            body["tool_choice"] = serde_json::json!("auto");
        }

        if let Some(effort) = request.reasoning.openai_effort() {
            debug!(%effort, "OpenAIAdapter::build_request_body: reasoning enabled");
            body["reasoning_effort"] = serde_json::json!(effort);
        }

        body
    }
}

/// Convert conversation messages to the chat-completions format
///
/// This wire requires one message per tool result, so a single tool-role
/// message with multiple results becomes multiple `role: "tool"` messages.
fn convert_messages(messages: &[crate::llm::ChatMessage]) -> Vec<serde_json::Value> {
    debug!(message_count = %messages.len(), "convert_messages: called");
    let mut result = Vec::new();

    for msg in messages {
        match msg.role {
            Role::User => {
                if msg.images.is_empty() {
                    result.push(serde_json::json!({ "role": "user", "content": msg.content }));
                } else {
                    let mut parts: Vec<serde_json::Value> = msg
                        .images
                        .iter()
                        .map(|img| {
                            serde_json::json!({
                                "type": "image_url",
                                "image_url": {
                                    "url": format!("data:{};base64,{}", img.media_type, img.data),
                                },
                            })
                        })
                        .collect();
                    parts.push(serde_json::json!({ "type": "text", "text": msg.content }));
                    result.push(serde_json::json!({ "role": "user", "content": parts }));
                }
            }
            Role::Assistant => {
                if msg.tool_calls.is_empty() {
                    result.push(serde_json::json!({ "role": "assistant", "content": msg.content }));
                } else {
                    let tool_calls: Vec<serde_json::Value> = msg
                        .tool_calls
                        .iter()
                        .map(|call| {
                            serde_json::json!({
                                "id": call.id,
                                "type": "function",
                                "function": {
                                    "name": call.name,
                                    "arguments": call.arguments.to_string(),
                                },
                            })
                        })
                        .collect();

                    let mut entry = serde_json::json!({
                        "role": "assistant",
                        "tool_calls": tool_calls,
                    });
                    if !msg.content.is_empty() {
                        entry["content"] = serde_json::json!(msg.content);
                    }
                    result.push(entry);
                }
            }
            Role::Tool => {
                for r in &msg.tool_results {
                    result.push(serde_json::json!({
                        "role": "tool",
                        "tool_call_id": r.call_id,
                        "content": r.content,
                    }));
                }
            }
        }
    }

    result
}

/// Translate one stream chunk into step events
///
/// `open_calls` maps fragment index to call id so later fragments, which
/// omit the id, still attach to the right call. Returns the finish reason
/// when the chunk carries one.
fn translate_chunk(
    chunk: &OpenAIStreamChunk,
    open_calls: &mut BTreeMap<usize, String>,
) -> (Vec<StepEvent>, Option<StopReason>) {
    let mut events = Vec::new();
    let mut stop_reason = None;

    if let Some(choice) = chunk.choices.first() {
        if let Some(content) = &choice.delta.content
            && !content.is_empty()
        {
            events.push(StepEvent::TextDelta(content.clone()));
        }

        if let Some(fragments) = &choice.delta.tool_calls {
            for frag in fragments {
                if let Some(id) = &frag.id {
                    open_calls.insert(frag.index, id.clone());
                }
                let Some(id) = open_calls.get(&frag.index).cloned() else {
                    continue;
                };

                if let Some(func) = &frag.function {
                    if let Some(name) = &func.name {
                        events.push(StepEvent::ToolCallStart {
                            id: id.clone(),
                            name: name.clone(),
                        });
                    }
                    if let Some(args) = &func.arguments
                        && !args.is_empty()
                    {
                        events.push(StepEvent::ToolCallDelta {
                            id,
                            args_delta: args.clone(),
                        });
                    }
                }
            }
        }

        if let Some(reason) = &choice.finish_reason {
            stop_reason = Some(StopReason::from_openai(reason));
        }
    }

    (events, stop_reason)
}

#[async_trait]
impl ProviderAdapter for OpenAIAdapter {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn stream_step(&self, request: StepRequest, events: mpsc::Sender<StepEvent>) -> Result<(), ProviderError> {
        debug!(%self.model, "OpenAIAdapter::stream_step: called");
        let bearer = self.credentials.bearer(&self.provider_id, self.api_key_env.as_deref()).await?;

        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.build_request_body(&request);

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {bearer}"))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::Transport)?;

        let status = response.status().as_u16();
        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            debug!(retry_after, "OpenAIAdapter::stream_step: rate limited");
            return Err(ProviderError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            });
        }
        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            debug!(%status, "OpenAIAdapter::stream_step: API error");
            return Err(ProviderError::Api { status, message });
        }

        // Prompt token counts arrive only in the final usage chunk on this
        // wire, so the step opens with zero and the total rides on StepDone.
        if events.send(StepEvent::StepStart { input_tokens: 0 }).await.is_err() {
            return Ok(());
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut open_calls: BTreeMap<usize, String> = BTreeMap::new();
        let mut stop_reason = StopReason::EndTurn;
        let mut usage = TokenUsage::default();

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(ProviderError::Transport)?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            // Process complete SSE lines
            while let Some(line_end) = buffer.find('\n') {
                let line = buffer[..line_end].trim().to_string();
                buffer = buffer[line_end + 1..].to_string();

                if line.is_empty() || line == "data: [DONE]" {
                    continue;
                }

                if let Some(data) = line.strip_prefix("data: ")
                    && let Ok(chunk_data) = serde_json::from_str::<OpenAIStreamChunk>(data)
                {
                    let (chunk_events, finish) = translate_chunk(&chunk_data, &mut open_calls);
                    for ev in chunk_events {
                        if events.send(ev).await.is_err() {
                            debug!("OpenAIAdapter::stream_step: receiver dropped");
                            return Ok(());
                        }
                    }
                    if let Some(reason) = finish {
                        debug!(?reason, "OpenAIAdapter::stream_step: finish_reason");
                        stop_reason = reason;
                    }
                    if let Some(u) = chunk_data.usage {
                        usage.input_tokens = u.prompt_tokens;
                        usage.output_tokens = u.completion_tokens;
                    }
                }
            }
        }

        // No per-call stop marker on this wire; close everything still open
        // in index order so downstream sees calls in issue order.
        for (_, id) in open_calls {
            if events.send(StepEvent::ToolCallEnd { id }).await.is_err() {
                return Ok(());
            }
        }

        let _ = events.send(StepEvent::StepDone { stop_reason, usage }).await;
        Ok(())
    }
}

// Streaming wire types

#[derive(Debug, Deserialize)]
struct OpenAIStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAIStreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamToolCall {
    index: usize,
    id: Option<String>,
    function: Option<OpenAIStreamFunction>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
