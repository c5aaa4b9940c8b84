//! JSON-RPC 2.0 wire types for tool-provider connections
//!
//! Newline-delimited protocol over a subprocess's standard streams. Each
//! message is a single line of JSON followed by `\n`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Protocol revision sent in the initialize handshake
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// A request originated by this client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }

    /// The handshake request opening a connection
    pub fn initialize(id: u64) -> Self {
        Self::new(
            id,
            "initialize",
            Some(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": { "name": "agentcore", "version": env!("CARGO_PKG_VERSION") },
            })),
        )
    }

    /// Fetch the provider's tool catalogue
    pub fn tools_list(id: u64) -> Self {
        Self::new(id, "tools/list", None)
    }

    /// Invoke a provider tool by its unqualified name
    pub fn tools_call(id: u64, name: &str, arguments: Value) -> Self {
        Self::new(id, "tools/call", Some(json!({ "name": name, "arguments": arguments })))
    }
}

/// A notification: no id, no response expected
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcNotification {
    /// Acknowledges a completed initialize handshake
    pub fn initialized() -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: "notifications/initialized".to_string(),
            params: None,
        }
    }
}

/// A response line from the provider
///
/// Lines that do not parse as this shape (server-initiated notifications,
/// garbage) are discarded by the reader.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    pub id: u64,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

/// JSON-RPC error object
#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

/// One tool declared by a provider in `tools/list`
#[derive(Debug, Clone, Deserialize)]
pub struct RpcToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", default = "default_schema")]
    pub input_schema: Value,
}

fn default_schema() -> Value {
    json!({ "type": "object" })
}

/// Result payload of `tools/list`
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsListResult {
    pub tools: Vec<RpcToolDescriptor>,
}

/// Result payload of `tools/call`
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallResult {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Join the text blocks of the result
    pub fn text(&self) -> String {
        let texts: Vec<&str> = self
            .content
            .iter()
            .filter(|b| b.kind == "text")
            .map(|b| b.text.as_str())
            .collect();
        texts.join("\n")
    }
}

/// One content block in a call result; only `text` blocks are consumed
#[derive(Debug, Clone, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialize() {
        let req = RpcRequest::new(7, "tools/list", None);
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"jsonrpc":"2.0","id":7,"method":"tools/list"}"#);
    }

    #[test]
    fn test_tools_call_serialize() {
        let req = RpcRequest::tools_call(3, "add", serde_json::json!({"a": 1, "b": 2}));
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(
            json,
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"arguments":{"a":1,"b":2},"name":"add"}}"#
        );
    }

    #[test]
    fn test_initialize_carries_protocol_version() {
        let req = RpcRequest::initialize(1);
        let params = req.params.unwrap();
        assert_eq!(params["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(params["clientInfo"]["name"], "agentcore");
    }

    #[test]
    fn test_initialized_notification_serialize() {
        let note = RpcNotification::initialized();
        let json = serde_json::to_string(&note).unwrap();
        assert_eq!(json, r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#);
    }

    #[test]
    fn test_response_deserialize_result() {
        let json = r#"{"jsonrpc":"2.0","id":5,"result":{"ok":true}}"#;
        let resp: RpcResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.id, 5);
        assert!(resp.error.is_none());
        assert_eq!(resp.result.unwrap()["ok"], true);
    }

    #[test]
    fn test_response_deserialize_error() {
        let json = r#"{"jsonrpc":"2.0","id":5,"error":{"code":-32601,"message":"method not found"}}"#;
        let resp: RpcResponse = serde_json::from_str(json).unwrap();
        let err = resp.error.unwrap();
        assert_eq!(err.code, -32601);
        assert_eq!(err.message, "method not found");
    }

    #[test]
    fn test_notification_line_fails_response_parse() {
        // Server notifications have no id and must be discarded by the reader.
        let json = r#"{"jsonrpc":"2.0","method":"notifications/progress","params":{}}"#;
        assert!(serde_json::from_str::<RpcResponse>(json).is_err());
    }

    #[test]
    fn test_tools_list_deserialize() {
        let json = r#"{"tools":[{"name":"add","description":"Add numbers","inputSchema":{"type":"object"}}]}"#;
        let result: ToolsListResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.tools.len(), 1);
        assert_eq!(result.tools[0].name, "add");
    }

    #[test]
    fn test_tool_descriptor_defaults_schema() {
        let json = r#"{"name":"bare"}"#;
        let desc: RpcToolDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(desc.input_schema["type"], "object");
    }

    #[test]
    fn test_call_result_joins_text_blocks() {
        let json = r#"{"content":[{"type":"text","text":"one"},{"type":"image","data":"x"},{"type":"text","text":"two"}]}"#;
        let result: ToolCallResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.text(), "one\ntwo");
        assert!(!result.is_error);
    }

    #[test]
    fn test_call_result_is_error_flag() {
        let json = r#"{"content":[{"type":"text","text":"boom"}],"isError":true}"#;
        let result: ToolCallResult = serde_json::from_str(json).unwrap();
        assert!(result.is_error);
        assert_eq!(result.text(), "boom");
    }
}
