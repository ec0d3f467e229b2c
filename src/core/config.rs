//! Tool host configuration.
//!
//! Every setting is a command-line flag with an environment variable
//! fallback; the defaults reproduce the fixed values the host used to bind.
//!
//! Environment Variables:
//! - SERVER_NAME: Name of the server (default: "Simple Calculator Container")
//! - SERVER_VERSION: Version string (default: crate version)
//! - MCP_TRANSPORT_MODE: "http", "stdio", or "both" (default: "http")
//! - HOST: Bind address for HTTP mode (default: "0.0.0.0")
//! - PORT: Port number for HTTP mode (default: 8000)
//! - WORKER_THREADS: HTTP worker count (default: CPU count, capped at 16)
//! - MCP_JSON_RESPONSE: answer with plain JSON instead of SSE (default: false)
//! - MCP_SESSION_IDLE_SECS: drop HTTP sessions idle this long (default: 1800)

use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::core::server::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportMode {
    /// Streamable HTTP on HOST:PORT
    Http,
    /// Line-delimited JSON-RPC on stdin/stdout
    Stdio,
    /// STDIO and HTTP at the same time
    Both,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "mcp-adder", version, about = "MCP tool host exposing add_numbers")]
pub struct ServerConfig {
    /// Server name reported to clients
    #[arg(long, env = "SERVER_NAME", default_value = "Simple Calculator Container")]
    pub name: String,

    /// Server version reported to clients
    #[arg(long = "server-version", env = "SERVER_VERSION", default_value = env!("CARGO_PKG_VERSION"))]
    pub server_version: String,

    #[arg(long, env = "MCP_TRANSPORT_MODE", value_enum, default_value_t = TransportMode::Http)]
    pub transport: TransportMode,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// HTTP worker threads
    #[arg(long, env = "WORKER_THREADS")]
    pub workers: Option<usize>,

    /// Reply to POSTs with application/json even when the client accepts SSE
    #[arg(long, env = "MCP_JSON_RESPONSE")]
    pub json_response: bool,

    /// Seconds an HTTP session may stay idle before it is dropped
    #[arg(long, env = "MCP_SESSION_IDLE_SECS", default_value_t = 1800)]
    pub session_idle_secs: u64,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Explicit worker count, or the CPU count capped at 16.
    pub fn worker_count(&self) -> usize {
        self.workers
            .filter(|n| *n > 0)
            .unwrap_or_else(|| num_cpus::get().clamp(1, 16))
    }

    /// Idle timeout for HTTP sessions; zero is raised to one second.
    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs.max(1))
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            server_name: self.name.clone(),
            server_version: self.server_version.clone(),
            instructions: Some("Call add_numbers with numeric arguments a and b to get their sum.".to_string()),
        }
    }
}
