//! Runtime configuration, read once from the environment at startup.
//!
//! The bridge is configured entirely through environment variables (with
//! `.env` support in the binary):
//!
//! - `PORT` - HTTP listen port (default 8787)
//! - `CORS_ORIGIN` - allowed cross-origin origin, or `*` (default
//!   `http://localhost:5173`, the Vite dev server)
//! - `SERVER_PATH` - path of the MCP server program (default
//!   `./mcp-server.py`)
//! - `SERVER_ARGS` - extra whitespace-separated arguments for the server
//! - `PYTHON` - launcher for the server program (default `uv`)

/// Default HTTP listen port.
const DEFAULT_PORT: u16 = 8787;
/// Default allowed CORS origin.
const DEFAULT_ORIGIN: &str = "http://localhost:5173";
/// Default MCP server program path.
const DEFAULT_SERVER_PATH: &str = "./mcp-server.py";
/// Default launcher.
const DEFAULT_LAUNCHER: &str = "uv";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub cors_origin: String,
    pub server_path: String,
    pub server_args: Vec<String>,
    pub launcher: String,
}

impl Config {
    /// Read settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through a lookup function (injection point for tests).
    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = lookup("PORT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let cors_origin = lookup("CORS_ORIGIN").unwrap_or_else(|| DEFAULT_ORIGIN.to_string());
        let server_path = lookup("SERVER_PATH").unwrap_or_else(|| DEFAULT_SERVER_PATH.to_string());
        let server_args = lookup("SERVER_ARGS")
            .map(|v| v.split_whitespace().map(String::from).collect())
            .unwrap_or_default();
        let launcher = lookup("PYTHON").unwrap_or_else(|| DEFAULT_LAUNCHER.to_string());

        Self {
            port,
            cors_origin,
            server_path,
            server_args,
            launcher,
        }
    }

    /// Resolve the command used to spawn the MCP server.
    ///
    /// The default launcher `uv` runs the server through `uv run python`;
    /// any other launcher is invoked with the server path directly.
    pub fn spawn_command(&self) -> (String, Vec<String>) {
        let mut args = if self.launcher == "uv" {
            vec![
                "run".to_string(),
                "python".to_string(),
                self.server_path.clone(),
            ]
        } else {
            vec![self.server_path.clone()]
        };
        args.extend(self.server_args.iter().cloned());
        (self.launcher.clone(), args)
    }
}
