//! MCP tool host exposing `add_numbers`, and a probe client that exercises it.
//!
//! - `core`: tool registry, JSON-RPC dispatch, streamable HTTP and STDIO transports
//! - `tools`: tool implementations registered at startup
//! - `client`: streamable HTTP client and the smoke-test probe
//! - `logging`: tracing subscriber setup shared by both binaries

pub mod client;
pub mod core;
pub mod logging;
pub mod tools;
