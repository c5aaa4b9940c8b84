//! Provider adapters for the step loop
//!
//! Two wire protocols, one event contract: every adapter translates its
//! vendor stream into the same [`StepEvent`] sequence so the step loop is
//! written exactly once.

use std::sync::Arc;

use tracing::debug;

pub mod adapter;
mod anthropic;
mod error;
mod openai;
mod types;

pub use adapter::ProviderAdapter;
pub use anthropic::AnthropicAdapter;
pub use error::ProviderError;
pub use openai::OpenAIAdapter;
pub use types::{
    AgentStep, ChatMessage, ImageAttachment, MessageMeta, ReasoningEffort, Role, StepEvent, StepRequest, StopReason,
    TokenUsage, ToolCall, ToolResult, ToolSpec,
};

use crate::config::ProviderConfig;
use crate::credentials::CredentialManager;

/// Create a provider adapter based on the provider named in config
///
/// Supports "anthropic" and "openai". The provider name doubles as the
/// credential id, so custom endpoints speaking either protocol only need
/// a different base URL.
pub fn create_adapter(
    config: &ProviderConfig,
    credentials: Arc<CredentialManager>,
) -> Result<Arc<dyn ProviderAdapter>, ProviderError> {
    debug!(provider = %config.name, model = %config.model, "create_adapter: called");
    match config.name.as_str() {
        "anthropic" => {
            debug!("create_adapter: creating Anthropic adapter");
            Ok(Arc::new(AnthropicAdapter::new(config, credentials)?))
        }
        "openai" => {
            debug!("create_adapter: creating OpenAI adapter");
            Ok(Arc::new(OpenAIAdapter::new(config, credentials)?))
        }
        other => {
            debug!(provider = %other, "create_adapter: unknown provider");
            Err(ProviderError::InvalidResponse(format!(
                "Unknown provider: '{}'. Supported: anthropic, openai",
                other
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{Credential, CredentialStore, MemoryCredentialStore};

    #[test]
    fn test_create_adapter_unknown_provider() {
        let credentials = Arc::new(CredentialManager::new(Arc::new(MemoryCredentialStore::new())));
        let mut config = ProviderConfig::anthropic_defaults();
        config.name = "mystery".to_string();

        let err = create_adapter(&config, credentials).err().unwrap();
        assert!(err.to_string().contains("mystery"));
    }

    #[test]
    fn test_create_adapter_anthropic() {
        let store = Arc::new(MemoryCredentialStore::new());
        store
            .set(
                "anthropic",
                Credential::Secret {
                    value: "sk-test".to_string(),
                },
            )
            .unwrap();
        let credentials = Arc::new(CredentialManager::new(store));

        let adapter = create_adapter(&ProviderConfig::anthropic_defaults(), credentials).unwrap();
        assert_eq!(adapter.name(), "anthropic");
    }
}
