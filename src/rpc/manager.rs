//! ToolProviderManager - routes namespaced tool calls to connections
//!
//! Owns zero or more named connections. Each provider's catalogue is merged
//! into the agent's tool set under `serverid__toolname` so the model sees a
//! flat namespace; calls are routed back to the owning connection by
//! splitting on the separator.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ToolProviderConfig;
use crate::llm::ToolSpec;

use super::client::ToolProviderClient;
use super::error::RpcError;

/// Separator between server id and tool name in namespaced tool names
pub const NAMESPACE_SEPARATOR: &str = "__";

/// Aggregates tool-provider connections behind one routing surface
#[derive(Debug, Default)]
pub struct ToolProviderManager {
    clients: BTreeMap<String, ToolProviderClient>,
}

impl ToolProviderManager {
    /// Create a manager with no connections
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect every provider named in config
    ///
    /// A provider that fails to spawn or handshake is skipped with a
    /// warning; the rest stay usable. An empty config yields an empty
    /// manager, which routes nothing and declares nothing.
    pub async fn connect_all(configs: &BTreeMap<String, ToolProviderConfig>) -> Self {
        debug!(provider_count = %configs.len(), "ToolProviderManager::connect_all: called");
        let mut manager = Self::new();

        for (server_id, spec) in configs {
            match ToolProviderClient::connect(server_id, spec).await {
                Ok(client) => {
                    debug!(%server_id, tool_count = %client.tools().len(), "ToolProviderManager::connect_all: connected");
                    manager.attach(client);
                }
                Err(e) => {
                    warn!(%server_id, error = %e, "Tool provider failed to connect, skipping");
                }
            }
        }

        manager
    }

    /// Take ownership of an already-connected client
    pub fn attach(&mut self, client: ToolProviderClient) {
        debug!(server_id = %client.server_id(), "ToolProviderManager::attach: called");
        self.clients.insert(client.server_id().to_string(), client);
    }

    /// Merged catalogue across all connections, namespaced per provider
    ///
    /// Deterministic order: providers by server id, tools in declaration
    /// order within each provider.
    pub fn catalogue(&self) -> Vec<ToolSpec> {
        debug!(connection_count = %self.clients.len(), "ToolProviderManager::catalogue: called");
        let mut specs = Vec::new();
        for (server_id, client) in &self.clients {
            for tool in client.tools() {
                specs.push(ToolSpec {
                    name: format!("{}{}{}", server_id, NAMESPACE_SEPARATOR, tool.name),
                    description: tool.description.clone(),
                    input_schema: tool.input_schema.clone(),
                    server_id: Some(server_id.clone()),
                });
            }
        }
        specs
    }

    /// Whether a namespaced name resolves to an attached connection
    pub fn owns(&self, namespaced: &str) -> bool {
        namespaced
            .split_once(NAMESPACE_SEPARATOR)
            .is_some_and(|(server_id, _)| self.clients.contains_key(server_id))
    }

    /// Route a namespaced tool call to the owning connection
    pub async fn call(&self, namespaced: &str, arguments: Value) -> Result<String, RpcError> {
        debug!(tool = %namespaced, "ToolProviderManager::call: called");

        let (server_id, tool_name) =
            namespaced
                .split_once(NAMESPACE_SEPARATOR)
                .ok_or_else(|| RpcError::UnknownServer {
                    server_id: namespaced.to_string(),
                })?;

        let client = self.clients.get(server_id).ok_or_else(|| RpcError::UnknownServer {
            server_id: server_id.to_string(),
        })?;

        if !client.is_alive() {
            debug!(%server_id, "ToolProviderManager::call: connection is down");
            return Err(RpcError::ProcessExit);
        }

        client.call_tool(tool_name, arguments).await
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Server ids of attached connections, sorted
    pub fn server_ids(&self) -> Vec<String> {
        self.clients.keys().cloned().collect()
    }

    /// Tear down every connection
    pub async fn shutdown_all(&self) {
        debug!(connection_count = %self.clients.len(), "ToolProviderManager::shutdown_all: called");
        for client in self.clients.values() {
            client.shutdown().await;
        }
    }
}
