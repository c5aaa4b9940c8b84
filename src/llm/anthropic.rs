//! Anthropic Messages API adapter
//!
//! Translates the streaming Messages API into the uniform step-event
//! sequence. Tool arguments arrive as `partial_json` fragments on an open
//! content block and are committed when the block stops.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource};
use tokio::sync::mpsc;
use tracing::debug;

use super::{ProviderAdapter, ProviderError, Role, StepEvent, StepRequest, StopReason, TokenUsage};
use crate::config::ProviderConfig;
use crate::credentials::CredentialManager;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API adapter
pub struct AnthropicAdapter {
    provider_id: String,
    model: String,
    base_url: String,
    api_key_env: Option<String>,
    max_tokens: u32,
    http: Client,
    credentials: Arc<CredentialManager>,
}

impl AnthropicAdapter {
    /// Create an adapter, failing fast when no usable credential resolves
    pub fn new(config: &ProviderConfig, credentials: Arc<CredentialManager>) -> Result<Self, ProviderError> {
        debug!(model = %config.model, "AnthropicAdapter::new: called");
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

    /// Build the Messages API request body
    fn build_request_body(&self, request: &StepRequest) -> serde_json::Value {
        debug!(%self.model, %request.max_tokens, "AnthropicAdapter::build_request_body: called");
        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": request.max_tokens.min(self.max_tokens),
            "system": request.system_prompt,
            "messages": convert_messages(&request.messages),
            "stream": true,
        });

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(
                request
                    .tools
                    .iter()
                    .map(|t| t.to_anthropic_schema())
                    .collect::<Vec<_>>()
            );
        }

        if let Some(budget) = request.reasoning.anthropic_budget() {
            debug!(budget, "AnthropicAdapter::build_request_body: thinking enabled");
            body["thinking"] = serde_json::json!({
                "type": "enabled",
                "budget_tokens": budget,
            });
        }

        body
    }
}

/// Convert conversation messages to the Messages API format
///
/// Tool-role messages become user messages carrying `tool_result` blocks;
/// assistant messages that issued tool calls carry `tool_use` blocks.
fn convert_messages(messages: &[crate::llm::ChatMessage]) -> Vec<serde_json::Value> {
    debug!(message_count = %messages.len(), "convert_messages: called");
    messages
        .iter()
        .map(|msg| match msg.role {
            Role::User => {
                if msg.images.is_empty() {
                    serde_json::json!({ "role": "user", "content": msg.content })
                } else {
                    let mut blocks: Vec<serde_json::Value> = msg
                        .images
                        .iter()
                        .map(|img| {
                            serde_json::json!({
                                "type": "image",
                                "source": {
                                    "type": "base64",
                                    "media_type": img.media_type,
                                    "data": img.data,
                                },
                            })
                        })
                        .collect();
                    blocks.push(serde_json::json!({ "type": "text", "text": msg.content }));
                    serde_json::json!({ "role": "user", "content": blocks })
                }
            }
            Role::Assistant => {
                if msg.tool_calls.is_empty() {
                    serde_json::json!({ "role": "assistant", "content": msg.content })
                } else {
                    let mut blocks = Vec::new();
                    if !msg.content.is_empty() {
                        blocks.push(serde_json::json!({ "type": "text", "text": msg.content }));
                    }
                    for call in &msg.tool_calls {
                        blocks.push(serde_json::json!({
                            "type": "tool_use",
                            "id": call.id,
                            "name": call.name,
                            "input": call.arguments,
                        }));
                    }
                    serde_json::json!({ "role": "assistant", "content": blocks })
                }
            }
            Role::Tool => {
                let blocks: Vec<serde_json::Value> = msg
                    .tool_results
                    .iter()
                    .map(|r| {
                        serde_json::json!({
                            "type": "tool_result",
                            "tool_use_id": r.call_id,
                            "content": r.content,
                            "is_error": r.is_error,
                        })
                    })
                    .collect();
                serde_json::json!({ "role": "user", "content": blocks })
            }
        })
        .collect()
}

/// Translate one SSE payload into step events
///
/// `open_tool` tracks the currently open tool-use block (id), since delta
/// and stop events do not repeat it.
fn translate_event(data: &serde_json::Value, open_tool: &mut Option<String>) -> Vec<StepEvent> {
    let mut events = Vec::new();

    match data["type"].as_str() {
        Some("message_start") => {
            if let Some(u) = data["message"].get("usage") {
                events.push(StepEvent::StepStart {
                    input_tokens: u["input_tokens"].as_u64().unwrap_or(0),
                });
            }
        }
        Some("content_block_start") => {
            if let Some(block) = data.get("content_block")
                && block["type"] == "tool_use"
            {
                let id = block["id"].as_str().unwrap_or("").to_string();
                let name = block["name"].as_str().unwrap_or("").to_string();
                *open_tool = Some(id.clone());
                events.push(StepEvent::ToolCallStart { id, name });
            }
        }
        Some("content_block_delta") => {
            if let Some(delta) = data.get("delta") {
                if let Some(text) = delta["text"].as_str() {
                    events.push(StepEvent::TextDelta(text.to_string()));
                }
                if let Some(json) = delta["partial_json"].as_str()
                    && let Some(id) = open_tool.as_ref()
                {
                    events.push(StepEvent::ToolCallDelta {
                        id: id.clone(),
                        args_delta: json.to_string(),
                    });
                }
            }
        }
        Some("content_block_stop") => {
            if let Some(id) = open_tool.take() {
                events.push(StepEvent::ToolCallEnd { id });
            }
        }
        _ => {}
    }

    events
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn stream_step(&self, request: StepRequest, events: mpsc::Sender<StepEvent>) -> Result<(), ProviderError> {
        debug!(%self.model, "AnthropicAdapter::stream_step: called");
        let bearer = self.credentials.bearer(&self.provider_id, self.api_key_env.as_deref()).await?;

        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_request_body(&request);

        let http_request = self
            .http
            .post(url)
            .header("x-api-key", bearer)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body);

        let mut es = EventSource::new(http_request).map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let mut open_tool: Option<String> = None;
        let mut stop_reason = StopReason::EndTurn;
        let mut usage = TokenUsage::default();

        while let Some(event) = es.next().await {
            match event {
                Ok(Event::Open) => {
                    debug!("AnthropicAdapter::stream_step: connection open");
                }
                Ok(Event::Message(msg)) => {
                    let data: serde_json::Value = serde_json::from_str(&msg.data).map_err(ProviderError::Json)?;

                    match data["type"].as_str() {
                        Some("message_delta") => {
                            if let Some(sr) = data["delta"]["stop_reason"].as_str() {
                                debug!(%sr, "AnthropicAdapter::stream_step: stop_reason");
                                stop_reason = StopReason::from_anthropic(sr);
                            }
                            if let Some(u) = data.get("usage") {
                                usage.output_tokens = u["output_tokens"].as_u64().unwrap_or(0);
                            }
                        }
                        Some("message_stop") => {
                            debug!("AnthropicAdapter::stream_step: message_stop");
                            break;
                        }
                        Some("error") => {
                            let message = data["error"]["message"].as_str().unwrap_or("unknown stream error");
                            debug!(%message, "AnthropicAdapter::stream_step: error event");
                            return Err(ProviderError::InvalidResponse(message.to_string()));
                        }
                        _ => {
                            for ev in translate_event(&data, &mut open_tool) {
                                if events.send(ev).await.is_err() {
                                    debug!("AnthropicAdapter::stream_step: receiver dropped");
                                    return Ok(());
                                }
                            }
                        }
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => {
                    debug!("AnthropicAdapter::stream_step: stream ended");
                    break;
                }
                Err(e) => {
                    debug!(error = %e, "AnthropicAdapter::stream_step: transport error");
                    return Err(ProviderError::InvalidResponse(e.to_string()));
                }
            }
        }

        let _ = events.send(StepEvent::StepDone { stop_reason, usage }).await;
        Ok(())
    }
}
