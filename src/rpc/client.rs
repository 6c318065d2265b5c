//! JSON-RPC client for the spawned MCP server.
//!
//! `RpcClient` owns the pending-request table and the monotonic id counter.
//! One instance is constructed at startup and shared (`Arc`) between the
//! HTTP facade, which issues calls, and the stdout pump, which feeds decoded
//! messages back through [`RpcClient::handle_message`]. Requests go out as
//! single newline-terminated JSON lines through a dedicated writer task, so
//! concurrent calls never interleave bytes on the child's stdin.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::rpc::protocol::{JsonRpcError, JsonRpcRequest, RpcMessage, MCP_PROTOCOL_VERSION};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Errors surfaced to callers of [`RpcClient::call`].
#[derive(Debug, Error)]
pub enum RpcError {
    /// No response arrived within the timeout window.
    #[error("RPC timeout for {method} after {timeout}s")]
    Timeout {
        /// Method of the abandoned call
        method: String,
        /// Timeout that elapsed, in seconds
        timeout: u64,
    },

    /// The server answered with a JSON-RPC error response.
    #[error("{message}")]
    Server {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    /// The connection to the server is gone (writer closed or client
    /// dropped mid-call).
    #[error("MCP server connection closed")]
    ConnectionClosed,

    /// Request could not be serialized.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<JsonRpcError> for RpcError {
    fn from(err: JsonRpcError) -> Self {
        let message = if err.message.is_empty() {
            "MCP error".to_string()
        } else {
            err.message
        };
        RpcError::Server {
            code: err.code,
            message,
            data: err.data,
        }
    }
}

/// A call awaiting its response.
struct Pending {
    method: String,
    tx: oneshot::Sender<Result<Value, RpcError>>,
    sent_at: Instant,
}

/// Client side of the JSON-RPC connection to the MCP server.
pub struct RpcClient {
    /// Monotonically increasing request id counter; ids are never reused.
    next_id: AtomicU64,
    /// In-flight calls keyed by request id.
    pending: Mutex<HashMap<u64, Pending>>,
    /// Outbound lines, consumed by the stdin writer task.
    outbound: mpsc::UnboundedSender<String>,
    /// Per-call timeout.
    timeout: Duration,
}

impl RpcClient {
    /// Create a client writing requests to the given outbound line channel.
    pub fn new(outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            outbound,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Set the per-call timeout. Default is 30 seconds.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Send a request and wait for its matching response.
    ///
    /// Allocates the next id, registers a pending entry, and writes the
    /// request as one line. Resolves with the response's `result`, or fails
    /// on a server error response, on timeout (the pending entry is removed;
    /// a late response is then dropped as unmatched), or when the connection
    /// is gone.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::call(id, method, params);
        let line = serde_json::to_string(&request)
            .map_err(|e| RpcError::Protocol(format!("Failed to serialize request: {}", e)))?;

        let (tx, rx) = oneshot::channel();
        self.pending_table().insert(
            id,
            Pending {
                method: method.to_string(),
                tx,
                sent_at: Instant::now(),
            },
        );

        if self.outbound.send(line).is_err() {
            self.pending_table().remove(&id);
            return Err(RpcError::ConnectionClosed);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(RpcError::ConnectionClosed),
            Err(_) => {
                self.pending_table().remove(&id);
                Err(RpcError::Timeout {
                    method: method.to_string(),
                    timeout: self.timeout.as_secs(),
                })
            }
        }
    }

    /// Send a notification (no id, no response, no pending entry).
    pub fn notify(&self, method: &str, params: Value) -> Result<(), RpcError> {
        let request = JsonRpcRequest::notification(method, params);
        let line = serde_json::to_string(&request)
            .map_err(|e| RpcError::Protocol(format!("Failed to serialize notification: {}", e)))?;
        self.outbound
            .send(line)
            .map_err(|_| RpcError::ConnectionClosed)
    }

    /// Perform the session bootstrap: one `initialize` call, then the
    /// `notifications/initialized` notification.
    pub async fn initialize(&self) -> Result<Value, RpcError> {
        let result = self
            .call(
                "initialize",
                json!({
                    "protocolVersion": MCP_PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
            )
            .await?;
        self.notify("notifications/initialized", json!({}))?;
        Ok(result)
    }

    /// Dispatch one decoded message from the subprocess.
    ///
    /// Responses resolve or reject their pending call; responses with no
    /// matching pending id and server notifications are dropped with a
    /// debug log and no other effect.
    pub fn handle_message(&self, raw: &Value) {
        let Some(message) = RpcMessage::classify(raw) else {
            debug!("Dropping message with no usable shape");
            return;
        };

        match message {
            RpcMessage::Response { id, result } => self.complete(id, Ok(result)),
            RpcMessage::Error { id, error } => self.complete(id, Err(error.into())),
            RpcMessage::Notification { method, .. } => {
                debug!(method = %method, "Ignoring server notification");
            }
        }
    }

    /// Number of in-flight calls.
    pub fn pending_count(&self) -> usize {
        self.pending_table().len()
    }

    /// Resolve or reject the pending call for `id`, if still tracked.
    fn complete(&self, id: u64, outcome: Result<Value, RpcError>) {
        let entry = self.pending_table().remove(&id);
        match entry {
            Some(pending) => {
                debug!(
                    id,
                    method = %pending.method,
                    elapsed_ms = pending.sent_at.elapsed().as_millis() as u64,
                    ok = outcome.is_ok(),
                    "Completed RPC call"
                );
                // The caller may have timed out and dropped the receiver.
                let _ = pending.tx.send(outcome);
            }
            None => debug!(id, "Dropping response with no matching pending request"),
        }
    }

    fn pending_table(&self) -> MutexGuard<'_, HashMap<u64, Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
