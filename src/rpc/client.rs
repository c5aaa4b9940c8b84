//! Tool-provider client - one subprocess connection
//!
//! Spawns the provider, performs the initialize handshake, fetches the tool
//! catalogue, then correlates requests to response lines by id. A reader
//! task owns stdout; unmatched or malformed lines are discarded without
//! crashing it.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tracing::debug;

use crate::config::ToolProviderConfig;

use super::error::RpcError;
use super::protocol::{RpcNotification, RpcRequest, RpcResponse, RpcToolDescriptor, ToolCallResult, ToolsListResult};

/// Default per-request timeout
pub const REQUEST_TIMEOUT_MS: u64 = 30_000;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<RpcResponse>>>>;

/// A live connection to one tool-provider subprocess
pub struct ToolProviderClient {
    server_id: String,
    writer: Arc<tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>>,
    pending: PendingMap,
    next_id: AtomicU64,
    request_timeout_ms: u64,
    tools: Vec<RpcToolDescriptor>,
    alive: Arc<AtomicBool>,
    child: tokio::sync::Mutex<Option<tokio::process::Child>>,
    reader_task: tokio::task::JoinHandle<()>,
}

impl ToolProviderClient {
    /// Spawn the provider process and complete the handshake
    ///
    /// The returned client is connected: the catalogue is fetched and calls
    /// can be routed. Any handshake failure tears the process down.
    pub async fn connect(server_id: &str, config: &ToolProviderConfig) -> Result<Self, RpcError> {
        debug!(%server_id, command = %config.command, "ToolProviderClient::connect: called");

        let mut child = tokio::process::Command::new(&config.command)
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RpcError::Handshake("provider stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RpcError::Handshake("provider stdout unavailable".to_string()))?;

        let mut client = Self::from_streams(server_id, stdin, stdout, REQUEST_TIMEOUT_MS);
        *client.child.get_mut() = Some(child);
        client.handshake().await?;
        Ok(client)
    }

    /// Handshake a client over arbitrary streams
    ///
    /// Same lifecycle as `connect`, minus the subprocess spawn.
    pub async fn connect_streams(
        server_id: &str,
        writer: impl AsyncWrite + Send + Unpin + 'static,
        reader: impl AsyncRead + Send + Unpin + 'static,
        request_timeout_ms: u64,
    ) -> Result<Self, RpcError> {
        let mut client = Self::from_streams(server_id, writer, reader, request_timeout_ms);
        client.handshake().await?;
        Ok(client)
    }

    /// Build a client over arbitrary streams without handshaking
    ///
    /// Used directly by tests; `connect` wraps this around the child's
    /// standard streams.
    pub fn from_streams(
        server_id: &str,
        writer: impl AsyncWrite + Send + Unpin + 'static,
        reader: impl AsyncRead + Send + Unpin + 'static,
        request_timeout_ms: u64,
    ) -> Self {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));

        let reader_pending = Arc::clone(&pending);
        let reader_alive = Arc::clone(&alive);
        let reader_server_id = server_id.to_string();
        let reader_task = tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let response: RpcResponse = match serde_json::from_str(&line) {
                            Ok(r) => r,
                            Err(_) => {
                                debug!(server_id = %reader_server_id, "ToolProviderClient: discarding unparseable line");
                                continue;
                            }
                        };
                        let sender = reader_pending.lock().unwrap().remove(&response.id);
                        match sender {
                            Some(tx) => {
                                let _ = tx.send(response);
                            }
                            None => {
                                debug!(server_id = %reader_server_id, id = %response.id, "ToolProviderClient: discarding unmatched response");
                            }
                        }
                    }
                    Ok(None) | Err(_) => break,
                }
            }
            // Stream closed: reject everything still pending
            debug!(server_id = %reader_server_id, "ToolProviderClient: stream closed, rejecting pending requests");
            reader_alive.store(false, Ordering::SeqCst);
            reader_pending.lock().unwrap().clear();
        });

        Self {
            server_id: server_id.to_string(),
            writer: Arc::new(tokio::sync::Mutex::new(Box::new(writer))),
            pending,
            next_id: AtomicU64::new(1),
            request_timeout_ms,
            tools: Vec::new(),
            alive,
            child: tokio::sync::Mutex::new(None),
            reader_task,
        }
    }

    /// initialize → notifications/initialized → tools/list
    async fn handshake(&mut self) -> Result<(), RpcError> {
        debug!(server_id = %self.server_id, "ToolProviderClient::handshake: called");

        let init = self
            .request_raw(RpcRequest::initialize(self.take_id()))
            .await
            .map_err(|e| RpcError::Handshake(e.to_string()))?;
        debug!(server_id = %self.server_id, server_info = ?init.get("serverInfo"), "ToolProviderClient::handshake: initialized");

        self.notify(RpcNotification::initialized()).await?;

        let listed = self.request_raw(RpcRequest::tools_list(self.take_id())).await?;
        let result: ToolsListResult = serde_json::from_value(listed)?;
        debug!(server_id = %self.server_id, tool_count = %result.tools.len(), "ToolProviderClient::handshake: catalogue fetched");
        self.tools = result.tools;
        Ok(())
    }

    fn take_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Send a request and wait for its correlated response
    ///
    /// On timeout the pending entry is removed so nothing leaks; other
    /// in-flight requests are unaffected.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
        self.request_raw(RpcRequest::new(self.take_id(), method, params)).await
    }

    async fn request_raw(&self, request: RpcRequest) -> Result<Value, RpcError> {
        let id = request.id;
        debug!(server_id = %self.server_id, %id, method = %request.method, "ToolProviderClient::request: called");

        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);

        if let Err(e) = self.write_line(&serde_json::to_string(&request)?).await {
            self.pending.lock().unwrap().remove(&id);
            debug!(server_id = %self.server_id, %id, %e, "ToolProviderClient::request: write failed");
            return Err(RpcError::ProcessExit);
        }

        match tokio::time::timeout(Duration::from_millis(self.request_timeout_ms), rx).await {
            Ok(Ok(response)) => {
                if let Some(err) = response.error {
                    debug!(server_id = %self.server_id, %id, code = %err.code, "ToolProviderClient::request: server error");
                    Err(RpcError::Server {
                        code: err.code,
                        message: err.message,
                    })
                } else {
                    Ok(response.result.unwrap_or(Value::Null))
                }
            }
            // Sender dropped: connection teardown rejected us
            Ok(Err(_)) => Err(RpcError::ProcessExit),
            Err(_) => {
                self.pending.lock().unwrap().remove(&id);
                debug!(server_id = %self.server_id, %id, "ToolProviderClient::request: timed out");
                Err(RpcError::Timeout {
                    timeout_ms: self.request_timeout_ms,
                })
            }
        }
    }

    /// Send a notification; nothing comes back
    pub async fn notify(&self, notification: RpcNotification) -> Result<(), RpcError> {
        self.write_line(&serde_json::to_string(&notification)?).await?;
        Ok(())
    }

    async fn write_line(&self, line: &str) -> Result<(), std::io::Error> {
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await
    }

    /// Invoke a provider tool by its unqualified name
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<String, RpcError> {
        debug!(server_id = %self.server_id, tool = %name, "ToolProviderClient::call_tool: called");
        let result = self
            .request_raw(RpcRequest::tools_call(self.take_id(), name, arguments))
            .await?;
        let parsed: ToolCallResult = serde_json::from_value(result)?;
        let text = parsed.text();
        if parsed.is_error {
            Err(RpcError::Tool { message: text })
        } else {
            Ok(text)
        }
    }

    /// Tools declared by this provider
    pub fn tools(&self) -> &[RpcToolDescriptor] {
        &self.tools
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// False once the provider's stream has closed
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Tear the connection down, rejecting anything still pending
    pub async fn shutdown(&self) {
        debug!(server_id = %self.server_id, "ToolProviderClient::shutdown: called");
        self.reader_task.abort();
        self.alive.store(false, Ordering::SeqCst);
        self.pending.lock().unwrap().clear();
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.kill().await;
        }
    }
}

impl Drop for ToolProviderClient {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

impl std::fmt::Debug for ToolProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolProviderClient")
            .field("server_id", &self.server_id)
            .field("tools", &self.tools.len())
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};

    /// Client over a duplex pipe plus the server-side halves for scripting
    fn test_client(
        timeout_ms: u64,
    ) -> (
        ToolProviderClient,
        tokio::io::ReadHalf<tokio::io::DuplexStream>,
        tokio::io::WriteHalf<tokio::io::DuplexStream>,
    ) {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client_io);
        let (server_read, server_write) = tokio::io::split(server_io);
        let client = ToolProviderClient::from_streams("test", client_write, client_read, timeout_ms);
        (client, server_read, server_write)
    }

    async fn respond(server_write: &mut (impl AsyncWrite + Unpin), line: &str) {
        server_write.write_all(line.as_bytes()).await.unwrap();
        server_write.write_all(b"\n").await.unwrap();
        server_write.flush().await.unwrap();
    }

    #[tokio::test]
    async fn test_request_response_roundtrip() {
        let (client, server_read, mut server_write) = test_client(5_000);

        let server = tokio::spawn(async move {
            let mut lines = BufReader::new(server_read).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            let req: serde_json::Value = serde_json::from_str(&line).unwrap();
            assert_eq!(req["method"], "ping");
            let id = req["id"].as_u64().unwrap();
            respond(&mut server_write, &format!(r#"{{"jsonrpc":"2.0","id":{},"result":{{"pong":true}}}}"#, id)).await;
        });

        let result = client.request("ping", None).await.unwrap();
        assert_eq!(result["pong"], true);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_timeout_fails_only_that_request() {
        let (client, server_read, mut server_write) = test_client(300);
        let client = Arc::new(client);

        // Server answers the second request, never the first.
        let server = tokio::spawn(async move {
            let mut lines = BufReader::new(server_read).lines();
            let first = lines.next_line().await.unwrap().unwrap();
            let first_req: serde_json::Value = serde_json::from_str(&first).unwrap();
            assert_eq!(first_req["method"], "slow");

            let second = lines.next_line().await.unwrap().unwrap();
            let second_req: serde_json::Value = serde_json::from_str(&second).unwrap();
            let id = second_req["id"].as_u64().unwrap();
            respond(&mut server_write, &format!(r#"{{"jsonrpc":"2.0","id":{},"result":"fast"}}"#, id)).await;

            // Keep the stream open past the first request's timeout.
            tokio::time::sleep(Duration::from_millis(600)).await;
        });

        let slow_client = Arc::clone(&client);
        let slow = tokio::spawn(async move { slow_client.request("slow", None).await });

        // Let the slow request hit the wire first.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let fast = client.request("fast", None).await.unwrap();
        assert_eq!(fast, serde_json::json!("fast"));

        let slow_result = slow.await.unwrap();
        assert!(matches!(slow_result, Err(RpcError::Timeout { .. })));

        // The timed-out entry was removed, not leaked.
        assert!(client.pending.lock().unwrap().is_empty());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_and_unmatched_lines_discarded() {
        let (client, server_read, mut server_write) = test_client(5_000);

        let server = tokio::spawn(async move {
            let mut lines = BufReader::new(server_read).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            let req: serde_json::Value = serde_json::from_str(&line).unwrap();
            let id = req["id"].as_u64().unwrap();

            respond(&mut server_write, "this is not json").await;
            respond(&mut server_write, r#"{"jsonrpc":"2.0","id":999999,"result":"stray"}"#).await;
            respond(&mut server_write, r#"{"jsonrpc":"2.0","method":"notifications/progress"}"#).await;
            respond(&mut server_write, &format!(r#"{{"jsonrpc":"2.0","id":{},"result":"real"}}"#, id)).await;
        });

        let result = client.request("ping", None).await.unwrap();
        assert_eq!(result, serde_json::json!("real"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_close_rejects_pending() {
        let (client, server_read, server_write) = test_client(5_000);

        let server = tokio::spawn(async move {
            let mut lines = BufReader::new(server_read).lines();
            let _ = lines.next_line().await;
            drop(server_write); // EOF with the request still pending
        });

        let result = client.request("ping", None).await;
        assert!(matches!(result, Err(RpcError::ProcessExit)));
        assert!(!client.is_alive());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_server_error_object_surfaces() {
        let (client, server_read, mut server_write) = test_client(5_000);

        let server = tokio::spawn(async move {
            let mut lines = BufReader::new(server_read).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            let req: serde_json::Value = serde_json::from_str(&line).unwrap();
            let id = req["id"].as_u64().unwrap();
            respond(
                &mut server_write,
                &format!(r#"{{"jsonrpc":"2.0","id":{},"error":{{"code":-32601,"message":"no such method"}}}}"#, id),
            )
            .await;
        });

        let result = client.request("bogus", None).await;
        match result {
            Err(RpcError::Server { code, message }) => {
                assert_eq!(code, -32601);
                assert_eq!(message, "no such method");
            }
            other => panic!("wrong result: {:?}", other),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_call_tool_extracts_text() {
        let (client, server_read, mut server_write) = test_client(5_000);

        let server = tokio::spawn(async move {
            let mut lines = BufReader::new(server_read).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            let req: serde_json::Value = serde_json::from_str(&line).unwrap();
            assert_eq!(req["method"], "tools/call");
            assert_eq!(req["params"]["name"], "add");
            let id = req["id"].as_u64().unwrap();
            respond(
                &mut server_write,
                &format!(r#"{{"jsonrpc":"2.0","id":{},"result":{{"content":[{{"type":"text","text":"3"}}]}}}}"#, id),
            )
            .await;
        });

        let text = client.call_tool("add", serde_json::json!({"a": 1, "b": 2})).await.unwrap();
        assert_eq!(text, "3");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_call_tool_is_error_result() {
        let (client, server_read, mut server_write) = test_client(5_000);

        let server = tokio::spawn(async move {
            let mut lines = BufReader::new(server_read).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            let req: serde_json::Value = serde_json::from_str(&line).unwrap();
            let id = req["id"].as_u64().unwrap();
            respond(
                &mut server_write,
                &format!(
                    r#"{{"jsonrpc":"2.0","id":{},"result":{{"content":[{{"type":"text","text":"division by zero"}}],"isError":true}}}}"#,
                    id
                ),
            )
            .await;
        });

        let result = client.call_tool("divide", serde_json::json!({"a": 1, "b": 0})).await;
        match result {
            Err(RpcError::Tool { message }) => assert_eq!(message, "division by zero"),
            other => panic!("wrong result: {:?}", other),
        }
        server.await.unwrap();
    }
}
