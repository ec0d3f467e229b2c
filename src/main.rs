//! MCP Tool Host Entry Point
//!
//! Parses configuration (flags with environment fallbacks, see
//! `core::config`), then serves the registered tools over the selected
//! transport until the process is terminated.

use clap::Parser;
use mcp_adder::core::config::{ServerConfig, TransportMode};
use mcp_adder::core::{http, stdio};
use mcp_adder::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init("info");
    let config = ServerConfig::parse();

    match config.transport {
        TransportMode::Http => http::run_server_http(&config).await?,
        TransportMode::Stdio => stdio::run_server_stdio(config.app_state()).await?,
        TransportMode::Both => {
            // STDIO runs in a background task while HTTP serves in the foreground
            let app = config.app_state();
            let stdio_handle = tokio::spawn(async move {
                if let Err(e) = stdio::run_server_stdio(app).await {
                    tracing::error!(error = %e, "STDIO server error");
                }
            });

            let http_result = http::run_server_http(&config).await;

            // If HTTP server exits, abort STDIO task
            stdio_handle.abort();
            http_result?;
        }
    }
    Ok(())
}
