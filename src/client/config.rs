//! Probe client configuration.
//!
//! Environment Variables:
//! - MCP_SERVER_URL: tool host endpoint (default: "http://localhost:8000/mcp/")
//! - MCP_PROBE_TOOL: tool to invoke (default: "add_numbers")
//! - MCP_PROBE_A / MCP_PROBE_B: operands (default: 15.5 and 24.3)

use clap::Parser;
use serde_json::{Value, json};

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000/mcp/";

#[derive(Debug, Clone, Parser)]
#[command(name = "mcp-probe", version, about = "Smoke-test an MCP tool host end to end")]
pub struct ProbeConfig {
    /// Streamable HTTP endpoint of the tool host
    #[arg(long, env = "MCP_SERVER_URL", default_value = DEFAULT_SERVER_URL)]
    pub url: String,

    /// Tool to invoke after discovery
    #[arg(long, env = "MCP_PROBE_TOOL", default_value = "add_numbers")]
    pub tool: String,

    /// First operand
    #[arg(short = 'a', env = "MCP_PROBE_A", default_value_t = 15.5, allow_negative_numbers = true)]
    pub a: f64,

    /// Second operand
    #[arg(short = 'b', env = "MCP_PROBE_B", default_value_t = 24.3, allow_negative_numbers = true)]
    pub b: f64,
}

impl ProbeConfig {
    pub fn new(url: impl Into<String>, a: f64, b: f64) -> Self {
        Self {
            url: url.into(),
            tool: "add_numbers".to_string(),
            a,
            b,
        }
    }

    pub fn arguments(&self) -> Value {
        json!({ "a": self.a, "b": self.b })
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER_URL, 15.5, 24.3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_operands_including_negatives() {
        let config = ProbeConfig::try_parse_from([
            "mcp-probe",
            "--url",
            "http://10.0.0.5:8000/mcp/",
            "-a",
            "-5",
            "-b",
            "5",
        ])
        .unwrap();
        assert_eq!(config.url, "http://10.0.0.5:8000/mcp/");
        assert_eq!(config.arguments(), json!({ "a": -5.0, "b": 5.0 }));
    }

    #[test]
    fn default_matches_sample_pair() {
        let config = ProbeConfig::default();
        assert_eq!(config.tool, "add_numbers");
        assert_eq!(config.arguments(), json!({ "a": 15.5, "b": 24.3 }));
    }
}
