//! Core Server Framework Module
//!
//! This module contains the MCP tool-serving runtime:
//! - server.rs: JSON-RPC types, tool registry and method dispatch
//! - schema.rs: input-schema validation for tool arguments
//! - session.rs: streamable HTTP session table
//! - http.rs: streamable HTTP transport (Actix Web)
//! - stdio.rs: line-based STDIO transport
//! - config.rs: command-line / environment configuration

pub mod config;
pub mod http;
pub mod schema;
pub mod server;
pub mod session;
pub mod stdio;
