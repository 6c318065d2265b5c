//! JSON-RPC 2.0 wire types for the MCP server connection.
//!
//! Outbound messages are built with [`JsonRpcRequest`]; inbound messages are
//! classified into the [`RpcMessage`] union by shape before dispatch, rather
//! than being poked at field-by-field at each call site.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC protocol version carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol revision sent in the `initialize` handshake.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// An outbound JSON-RPC request or notification.
///
/// A request carries an `id` and expects exactly one response; a
/// notification omits the `id` and expects none.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    pub params: Value,
}

impl JsonRpcRequest {
    /// Build a request expecting a response correlated by `id`.
    pub fn call(id: u64, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: Some(id),
            method: method.to_string(),
            params,
        }
    }

    /// Build a fire-and-forget notification (no `id`).
    pub fn notification(method: &str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: None,
            method: method.to_string(),
            params,
        }
    }
}

/// Error object of a JSON-RPC error response.
///
/// All fields default so that a sloppy server cannot break classification;
/// an empty `message` is replaced with a generic one at the failure site.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JsonRpcError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// An inbound message, classified by shape.
///
/// A message carrying `method` is a notification (the bridge never serves
/// requests); one carrying `id` is a response, split on the presence of an
/// `error` field.
#[derive(Debug)]
pub enum RpcMessage {
    Response { id: u64, result: Value },
    Error { id: u64, error: JsonRpcError },
    Notification { method: String, params: Value },
}

impl RpcMessage {
    /// Classify a decoded JSON value, or `None` if it has no usable shape
    /// (not an object, or neither `method` nor a numeric `id`).
    pub fn classify(raw: &Value) -> Option<RpcMessage> {
        let obj = raw.as_object()?;

        if let Some(method) = obj.get("method").and_then(Value::as_str) {
            return Some(RpcMessage::Notification {
                method: method.to_string(),
                params: obj.get("params").cloned().unwrap_or(Value::Null),
            });
        }

        let id = obj.get("id").and_then(Value::as_u64)?;

        if let Some(error) = obj.get("error") {
            let error = serde_json::from_value(error.clone()).unwrap_or_default();
            return Some(RpcMessage::Error { id, error });
        }

        Some(RpcMessage::Response {
            id,
            result: obj.get("result").cloned().unwrap_or(Value::Null),
        })
    }
}
