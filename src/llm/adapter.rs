//! ProviderAdapter trait definition

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{ProviderError, StepEvent, StepRequest};

/// Vendor seam for the step loop
///
/// The driving loop is written once against [`StepEvent`]; an adapter's only
/// job is to translate its vendor's wire protocol into that sequence. Each
/// call is independent; no conversation state is kept between steps.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Vendor name, used for logging and error messages
    fn name(&self) -> &str;

    /// Model identifier this adapter was constructed for
    fn model(&self) -> &str;

    /// Stream one step, sending events to the channel as they arrive
    ///
    /// The sequence is lazy, finite and non-restartable: at most one
    /// `StepStart`, then deltas, then exactly one `StepDone` on success.
    /// Transport failures return `Err` and close the sequence without a
    /// `StepDone`. A dropped receiver stops the stream early; the adapter
    /// treats that as the caller abandoning the step and returns `Ok`.
    async fn stream_step(&self, request: StepRequest, events: mpsc::Sender<StepEvent>) -> Result<(), ProviderError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::llm::{StopReason, TokenUsage, ToolCall};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::debug;

    /// Scripted adapter for unit tests
    ///
    /// Plays back one pre-built event sequence per call and records every
    /// request it sees so tests can assert on conversation folding.
    pub struct MockAdapter {
        scripts: Vec<Vec<StepEvent>>,
        call_count: AtomicUsize,
        requests: Mutex<Vec<StepRequest>>,
    }

    impl MockAdapter {
        pub fn new(scripts: Vec<Vec<StepEvent>>) -> Self {
            debug!(script_count = %scripts.len(), "MockAdapter::new: called");
            Self {
                scripts,
                call_count: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        /// Requests seen so far, in call order
        pub fn requests(&self) -> Vec<StepRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProviderAdapter for MockAdapter {
        fn name(&self) -> &str {
            "mock"
        }

        fn model(&self) -> &str {
            "mock-model"
        }

        async fn stream_step(
            &self,
            request: StepRequest,
            events: mpsc::Sender<StepEvent>,
        ) -> Result<(), ProviderError> {
            debug!("MockAdapter::stream_step: called");
            self.requests.lock().unwrap().push(request);
            let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
            let script = self.scripts.get(idx).cloned().ok_or_else(|| {
                debug!(%idx, "MockAdapter::stream_step: no more scripted steps");
                ProviderError::InvalidResponse("No more scripted steps".to_string())
            })?;

            for event in script {
                if events.send(event).await.is_err() {
                    debug!("MockAdapter::stream_step: receiver dropped, stopping early");
                    break;
                }
            }
            Ok(())
        }
    }

    /// Script for a plain text answer
    pub fn text_step(text: &str) -> Vec<StepEvent> {
        vec![
            StepEvent::StepStart { input_tokens: 10 },
            StepEvent::TextDelta(text.to_string()),
            StepEvent::StepDone {
                stop_reason: StopReason::EndTurn,
                usage: TokenUsage {
                    input_tokens: 0,
                    output_tokens: 5,
                },
            },
        ]
    }

    /// Script for a step that issues tool calls, with optional leading text
    pub fn tool_step(text: Option<&str>, calls: Vec<ToolCall>) -> Vec<StepEvent> {
        let mut events = vec![StepEvent::StepStart { input_tokens: 10 }];
        if let Some(text) = text {
            events.push(StepEvent::TextDelta(text.to_string()));
        }
        for call in calls {
            let args = call.arguments.to_string();
            events.push(StepEvent::ToolCallStart {
                id: call.id.clone(),
                name: call.name.clone(),
            });
            events.push(StepEvent::ToolCallDelta {
                id: call.id.clone(),
                args_delta: args,
            });
            events.push(StepEvent::ToolCallEnd { id: call.id });
        }
        events.push(StepEvent::StepDone {
            stop_reason: StopReason::ToolUse,
            usage: TokenUsage {
                input_tokens: 0,
                output_tokens: 5,
            },
        });
        events
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_mock_adapter_plays_scripts_in_order() {
            let adapter = MockAdapter::new(vec![text_step("one"), text_step("two")]);
            let (tx, mut rx) = mpsc::channel(16);

            let request = StepRequest {
                system_prompt: "test".to_string(),
                messages: vec![],
                tools: vec![],
                max_tokens: 100,
                reasoning: Default::default(),
            };

            adapter.stream_step(request.clone(), tx.clone()).await.unwrap();
            adapter.stream_step(request, tx).await.unwrap();

            let mut texts = Vec::new();
            while let Some(event) = rx.recv().await {
                if let StepEvent::TextDelta(t) = event {
                    texts.push(t);
                }
            }
            assert_eq!(texts, vec!["one", "two"]);
            assert_eq!(adapter.call_count(), 2);
        }

        #[tokio::test]
        async fn test_mock_adapter_errors_when_exhausted() {
            let adapter = MockAdapter::new(vec![]);
            let (tx, _rx) = mpsc::channel(16);

            let request = StepRequest {
                system_prompt: "test".to_string(),
                messages: vec![],
                tools: vec![],
                max_tokens: 100,
                reasoning: Default::default(),
            };

            assert!(adapter.stream_step(request, tx).await.is_err());
        }
    }
}
