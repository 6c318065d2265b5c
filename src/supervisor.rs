//! MCP server subprocess lifecycle.
//!
//! The supervisor owns the child process: it spawns the server with piped
//! stdio and the parent's environment, pumps its stdout through the frame
//! decoder into the RPC client, forwards its stderr line-by-line for
//! traceability, and maps its exit status onto the bridge's own exit code.
//! The child is never restarted; its death is fatal to the bridge.

use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::rpc::client::RpcClient;
use crate::rpc::framing::FrameDecoder;

/// Read size for the stdout pump.
const READ_CHUNK_SIZE: usize = 8192;

/// Prefix applied to forwarded child stderr lines.
const STDERR_PREFIX: &str = "[mcp-server]";

/// Handle to the spawned MCP server process.
pub struct Supervisor {
    child: Child,
}

impl Supervisor {
    /// Spawn the server with all three stdio streams piped and the parent's
    /// environment inherited.
    pub fn spawn(program: &str, args: &[String]) -> Result<Self> {
        info!("Spawning MCP server: {} {}", program, args.join(" "));
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn MCP server '{}'", program))?;
        Ok(Self { child })
    }

    /// OS pid of the child, if it has not been reaped yet.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Take the child's stdin and start the writer task.
    ///
    /// Returns the outbound channel; each queued line is written as one
    /// newline-terminated `write_all`, so concurrent senders never
    /// interleave bytes.
    pub fn start_writer(&mut self) -> Result<mpsc::UnboundedSender<String>> {
        let mut stdin = self
            .child
            .stdin
            .take()
            .context("Failed to get stdin handle for MCP server")?;

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                let mut bytes = line.into_bytes();
                bytes.push(b'\n');
                if let Err(e) = stdin.write_all(&bytes).await {
                    warn!("Failed to write to MCP server stdin: {}", e);
                    break;
                }
                if let Err(e) = stdin.flush().await {
                    warn!("Failed to flush MCP server stdin: {}", e);
                    break;
                }
            }
            debug!("MCP server stdin writer stopped");
        });
        Ok(tx)
    }

    /// Take the child's stdout and start the decode pump.
    ///
    /// Chunks are fed to the frame decoder as they arrive; each decoded
    /// message is dispatched synchronously to the client.
    pub fn start_reader(&mut self, client: Arc<RpcClient>) -> Result<()> {
        let mut stdout = self
            .child
            .stdout
            .take()
            .context("Failed to get stdout handle for MCP server")?;

        tokio::spawn(async move {
            let mut decoder = FrameDecoder::new();
            let mut chunk = [0u8; READ_CHUNK_SIZE];
            loop {
                match stdout.read(&mut chunk).await {
                    Ok(0) => {
                        warn!("MCP server stdout closed");
                        break;
                    }
                    Ok(n) => {
                        for message in decoder.feed(&chunk[..n]) {
                            client.handle_message(&message);
                        }
                    }
                    Err(e) => {
                        error!("Failed to read MCP server stdout: {}", e);
                        break;
                    }
                }
            }
        });
        Ok(())
    }

    /// Take the child's stderr and forward each line to our own stderr,
    /// prefixed for traceability.
    pub fn forward_stderr(&mut self) -> Result<()> {
        let stderr = self
            .child
            .stderr
            .take()
            .context("Failed to get stderr handle for MCP server")?;

        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                eprintln!("{} {}", STDERR_PREFIX, line);
            }
        });
        Ok(())
    }

    /// Wait for the child to exit and return the bridge's exit code: the
    /// child's own code, or 1 when it died without one.
    pub async fn wait(&mut self) -> i32 {
        match self.child.wait().await {
            Ok(status) => exit_code(status),
            Err(e) => {
                error!("Failed to wait for MCP server: {}", e);
                1
            }
        }
    }
}

/// Map a child exit status onto the bridge exit code.
fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

/// Forward termination signals to the child, then exit.
///
/// SIGINT and SIGTERM are delivered best-effort by pid; delivery failures
/// are swallowed and the bridge exits 0 either way.
#[cfg(unix)]
pub fn forward_signals(pid: Option<u32>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut interrupt = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to install SIGINT handler: {}", e);
                return;
            }
        };
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                return;
            }
        };

        let signo = tokio::select! {
            _ = interrupt.recv() => libc::SIGINT,
            _ = terminate.recv() => libc::SIGTERM,
        };

        if let Some(pid) = pid {
            info!("Forwarding signal {} to MCP server (pid {})", signo, pid);
            // The child may already be gone; nothing to do about a failure.
            unsafe {
                libc::kill(pid as libc::pid_t, signo);
            }
        }
        std::process::exit(0);
    });
}

#[cfg(not(unix))]
pub fn forward_signals(_pid: Option<u32>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(0);
        }
    });
}
