//! MCP bridge - HTTP facade over a stdio MCP server.
//!
//! This is the main entry point for the bridge binary. It spawns the MCP
//! server subprocess, performs the JSON-RPC initialize handshake, and then
//! serves the REST surface until the child exits or a termination signal
//! arrives.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mcp_bridge::config::Config;
use mcp_bridge::http;
use mcp_bridge::rpc::RpcClient;
use mcp_bridge::supervisor::{self, Supervisor};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "mcp_bridge=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    tracing::info!("Starting MCP bridge v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env();
    let (program, args) = config.spawn_command();

    let mut supervisor = Supervisor::spawn(&program, &args)?;
    supervisor.forward_stderr()?;
    let outbound = supervisor.start_writer()?;
    let client = Arc::new(RpcClient::new(outbound));
    supervisor.start_reader(Arc::clone(&client))?;
    supervisor::forward_signals(supervisor.id());

    // The handshake is fatal: without a successful initialize the HTTP
    // listener is never bound.
    if let Err(e) = client.initialize().await {
        tracing::error!("Failed to initialize MCP server: {}", e);
        std::process::exit(1);
    }
    tracing::info!("MCP bridge initialized with server");

    let app = http::router(Arc::clone(&client), &config.cors_origin);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!("Bridge on http://localhost:{}", config.port);

    tokio::select! {
        code = supervisor.wait() => {
            tracing::error!("MCP server exited with code {}", code);
            std::process::exit(code);
        }
        result = axum::serve(listener, app) => {
            result.context("HTTP server failed")?;
        }
    }

    Ok(())
}
