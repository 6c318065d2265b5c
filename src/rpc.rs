//! JSON-RPC plumbing for the spawned MCP server.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐    stdin (one JSON line per write)   ┌────────────────┐
//! │  mcp-bridge  │ ────────────────────────────────────►│   MCP server   │
//! │  (RpcClient) │ ◄────────────────────────────────────│  (subprocess)  │
//! └──────────────┘    stdout (dual-framed JSON-RPC)     └────────────────┘
//! ```
//!
//! Outbound requests are newline-delimited. Inbound framing is not
//! guaranteed in advance, so [`framing::FrameDecoder`] accepts both
//! `Content-Length` frames and newline-delimited messages from the same
//! stream.

pub mod client;
pub mod framing;
pub mod protocol;

pub use client::{RpcClient, RpcError};
pub use framing::FrameDecoder;
pub use protocol::{JsonRpcError, JsonRpcRequest, RpcMessage};
