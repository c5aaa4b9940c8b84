//! Tool-provider RPC - JSON-RPC 2.0 over subprocess standard streams
//!
//! External tool providers are child processes speaking newline-delimited
//! JSON-RPC. A [`ToolProviderClient`] owns one connection end to end: spawn,
//! `initialize` handshake, catalogue fetch, id-correlated calls with
//! per-request timeouts. A [`ToolProviderManager`] aggregates named
//! connections and routes namespaced tool names to the right one.

pub mod client;
mod error;
pub mod manager;
pub mod protocol;

pub use client::{REQUEST_TIMEOUT_MS, ToolProviderClient};
pub use error::RpcError;
pub use manager::{NAMESPACE_SEPARATOR, ToolProviderManager};
pub use protocol::{
    PROTOCOL_VERSION, RpcNotification, RpcRequest, RpcResponse, RpcToolDescriptor, ToolCallResult, ToolsListResult,
};
