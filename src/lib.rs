//! MCP Bridge Library
//!
//! This library provides the core components of the bridge:
//!
//! - `rpc` - framing, JSON-RPC types, and the pending-request client
//! - `supervisor` - MCP server subprocess lifecycle
//! - `http` - REST facade mapping routes onto RPC calls
//! - `config` - environment-driven settings
//!
//! # Usage
//!
//! ```ignore
//! use mcp_bridge::{config::Config, rpc::RpcClient, supervisor::Supervisor};
//!
//! let config = Config::from_env();
//! let (program, args) = config.spawn_command();
//! let mut supervisor = Supervisor::spawn(&program, &args)?;
//! let client = Arc::new(RpcClient::new(supervisor.start_writer()?));
//! supervisor.start_reader(Arc::clone(&client))?;
//! client.initialize().await?;
//! ```

pub mod config;
pub mod http;
pub mod rpc;
pub mod supervisor;
