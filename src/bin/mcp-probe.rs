//! MCP Probe Entry Point
//!
//! Connects to a tool host, lists its tools and invokes one, printing a
//! human-readable report on stdout. Failures are reported, never raised: the
//! process exits normally either way.

use clap::Parser;
use mcp_adder::client::{Probe, ProbeConfig};
use mcp_adder::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init("warn");
    let config = ProbeConfig::parse();

    let report = Probe::new(config, std::io::stdout()).run().await;
    tracing::debug!(state = ?report.state(), history = ?report.history, "probe finished");
    Ok(())
}
