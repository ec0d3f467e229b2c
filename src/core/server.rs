//! MCP Server Implementation
//!
//! This module contains the transport-independent half of the MCP runtime:
//! - JSON-RPC 2.0 request/response structures
//! - Tool registry for managing available tools
//! - Protocol version negotiation
//! - Method dispatch shared by the HTTP and STDIO transports

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::core::schema;
use crate::tools;

/// JSON-RPC version identifier used on every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Most recent MCP protocol revision understood by this server.
pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";

/// Protocol revisions accepted during negotiation, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &[LATEST_PROTOCOL_VERSION, "2025-03-26", "2024-11-05"];

/// JSON-RPC 2.0 error codes used by the dispatcher.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
}

/// Server metadata reported in MCP initialize responses.
///
/// Cloned into every HTTP worker; STDIO mode holds a single copy.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server name as reported in `serverInfo.name`
    pub server_name: String,
    /// Server version string as reported in `serverInfo.version`
    pub server_version: String,
    /// Optional usage hint for clients, sent as `instructions`
    pub instructions: Option<String>,
}

/// JSON-RPC 2.0 request or notification.
///
/// A missing (or `null`) id marks the message as a notification, which never
/// receives a response.
#[derive(Deserialize, Debug, Clone)]
pub struct MCPRequest {
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

impl MCPRequest {
    /// Whether the message expects a response.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// JSON-RPC 2.0 response structure.
///
/// Exactly one of `result` and `error` is present.
#[derive(Serialize, Debug, Clone)]
pub struct MCPResponse {
    jsonrpc: &'static str,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<MCPError>,
}

impl MCPResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<Value>, error: MCPError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Serialize, Debug, Clone)]
pub struct MCPError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl MCPError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// A decoded inbound JSON-RPC message.
#[derive(Debug)]
pub enum Incoming {
    /// Has an id; must be answered.
    Request(MCPRequest),
    /// No id; never answered.
    Notification(MCPRequest),
    /// A response sent by the client to a server-initiated request.
    Response(Value),
}

/// Decode a single JSON-RPC message.
///
/// On failure the returned response carries a `null` id, as JSON-RPC requires
/// when the request id cannot be determined.
pub fn parse_message(body: &[u8]) -> Result<Incoming, MCPResponse> {
    let value: Value = serde_json::from_slice(body).map_err(|e| {
        MCPResponse::failure(
            None,
            MCPError::new(error_codes::PARSE_ERROR, format!("Parse error: {}", e)),
        )
    })?;

    let Some(object) = value.as_object() else {
        return Err(MCPResponse::failure(
            None,
            MCPError::new(error_codes::INVALID_REQUEST, "Invalid Request: expected a JSON object"),
        ));
    };

    if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err(MCPResponse::failure(
            object.get("id").cloned(),
            MCPError::new(error_codes::INVALID_REQUEST, "Invalid Request: jsonrpc must be \"2.0\""),
        ));
    }

    if !object.contains_key("method") {
        if object.contains_key("result") || object.contains_key("error") {
            return Ok(Incoming::Response(value));
        }
        return Err(MCPResponse::failure(
            object.get("id").cloned(),
            MCPError::new(error_codes::INVALID_REQUEST, "Invalid Request: missing method"),
        ));
    }

    let id = object.get("id").cloned();
    let request: MCPRequest = serde_json::from_value(value).map_err(|e| {
        MCPResponse::failure(
            id,
            MCPError::new(error_codes::INVALID_REQUEST, format!("Invalid Request: {}", e)),
        )
    })?;

    if request.is_notification() {
        Ok(Incoming::Notification(request))
    } else {
        Ok(Incoming::Request(request))
    }
}

/// MCP tool definition structure.
///
/// Serialized as-is in `tools/list` responses, so the schema fields use the
/// protocol's camelCase names.
#[derive(Serialize, Debug, Clone)]
pub struct MCPTool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
    #[serde(rename = "outputSchema", skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
}

/// Tool handler function type definition.
///
/// Handlers receive arguments that already passed schema validation and
/// return either a JSON result or an error message. They must be
/// Send + Sync to be shared by the HTTP worker threads.
pub type ToolHandler = Box<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;

/// Why a tool call did not produce a result.
#[derive(Debug, Error, PartialEq)]
pub enum ToolCallError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("{0}")]
    Failed(String),
}

/// Registry of available MCP tools.
///
/// Keeps tool definitions in registration order for discovery and maps tool
/// names to their handlers for execution.
pub struct ToolRegistry {
    tools: Vec<MCPTool>,
    handlers: HashMap<String, ToolHandler>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            handlers: HashMap::new(),
        }
    }

    /// Register a tool. A later registration under the same name replaces
    /// the earlier one.
    pub fn register(&mut self, tool: MCPTool, handler: ToolHandler) {
        let name = tool.name.clone();
        self.tools.retain(|existing| existing.name != name);
        self.tools.push(tool);
        self.handlers.insert(name, handler);
    }

    pub fn tools(&self) -> &[MCPTool] {
        &self.tools
    }

    pub fn get(&self, name: &str) -> Option<&MCPTool> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    /// Validate `arguments` against the tool's input schema, then run it.
    pub fn call(&self, name: &str, arguments: Value) -> Result<Value, ToolCallError> {
        let (Some(tool), Some(handler)) = (self.get(name), self.handlers.get(name)) else {
            return Err(ToolCallError::UnknownTool(name.to_string()));
        };
        schema::validate(&tool.input_schema, &arguments).map_err(ToolCallError::InvalidArguments)?;
        handler(arguments).map_err(ToolCallError::Failed)
    }
}

/// Initialize and register all tools.
///
/// Add new tool registrations here when implementing additional tools.
pub fn initialize_tools() -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    tools::calc::register(&mut registry);
    Arc::new(registry)
}

/// Pick the protocol revision for a session.
///
/// The client's requested revision is echoed when supported; otherwise the
/// server answers with its latest and leaves the decision to the client.
pub fn negotiate_protocol_version(requested: Option<&str>) -> &'static str {
    requested
        .and_then(|version| SUPPORTED_PROTOCOL_VERSIONS.iter().find(|v| **v == version))
        .copied()
        .unwrap_or(LATEST_PROTOCOL_VERSION)
}

/// Route a request to its method handler.
///
/// Returns `None` for notifications. `notifications/initialized` is the only
/// one the protocol defines for this server and it needs no action.
pub fn dispatch(state: &AppState, registry: &ToolRegistry, request: &MCPRequest) -> Option<MCPResponse> {
    if request.is_notification() {
        tracing::debug!(method = %request.method, "notification received");
        return None;
    }

    let id = request.id.clone();
    let response = match request.method.as_str() {
        "initialize" => handle_initialize(state, id, request.params.as_ref()),
        "ping" => MCPResponse::success(id, json!({})),
        "tools/list" => handle_tools_list(registry, id),
        "tools/call" => handle_tools_call(registry, id, request.params.as_ref()),
        other => MCPResponse::failure(
            id,
            MCPError::new(error_codes::METHOD_NOT_FOUND, format!("Method not found: {}", other)),
        ),
    };
    Some(response)
}

fn handle_initialize(state: &AppState, id: Option<Value>, params: Option<&Value>) -> MCPResponse {
    let requested = params
        .and_then(|p| p.get("protocolVersion"))
        .and_then(Value::as_str);
    let version = negotiate_protocol_version(requested);

    let mut result = json!({
        "protocolVersion": version,
        "capabilities": {
            "tools": { "listChanged": false }
        },
        "serverInfo": {
            "name": state.server_name,
            "version": state.server_version
        }
    });
    if let Some(instructions) = &state.instructions {
        result["instructions"] = json!(instructions);
    }
    MCPResponse::success(id, result)
}

fn handle_tools_list(registry: &ToolRegistry, id: Option<Value>) -> MCPResponse {
    MCPResponse::success(id, json!({ "tools": registry.tools() }))
}

/// Handle MCP tools/call.
///
/// Unknown tools and missing params are protocol errors. Anything that goes
/// wrong once the tool is found, including argument validation, is reported
/// inside the result with `isError: true` so the caller can read it.
fn handle_tools_call(registry: &ToolRegistry, id: Option<Value>, params: Option<&Value>) -> MCPResponse {
    let Some(params) = params else {
        return MCPResponse::failure(id, MCPError::new(error_codes::INVALID_PARAMS, "Invalid params"));
    };

    let Some(tool_name) = params.get("name").and_then(Value::as_str) else {
        return MCPResponse::failure(
            id,
            MCPError::new(error_codes::INVALID_PARAMS, "Invalid params: missing tool name"),
        );
    };

    let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

    match registry.call(tool_name, arguments) {
        Ok(value) => {
            tracing::debug!(tool = tool_name, result = %value, "tool call succeeded");
            MCPResponse::success(id, tool_result(value))
        }
        Err(ToolCallError::UnknownTool(name)) => MCPResponse::failure(
            id,
            MCPError::new(error_codes::INVALID_PARAMS, format!("Unknown tool: {}", name)),
        ),
        Err(e) => {
            tracing::warn!(tool = tool_name, error = %e, "tool call failed");
            MCPResponse::success(
                id,
                json!({
                    "content": [
                        { "type": "text", "text": format!("Error executing tool {}: {}", tool_name, e) }
                    ],
                    "isError": true
                }),
            )
        }
    }
}

/// Wrap a handler's value in a tools/call result.
///
/// Scalars are rendered as text and mirrored in `structuredContent` under
/// `result`; objects are used as the structured content directly.
fn tool_result(value: Value) -> Value {
    let text = match &value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let structured = if value.is_object() {
        value
    } else {
        json!({ "result": value })
    };
    json!({
        "content": [ { "type": "text", "text": text } ],
        "structuredContent": structured,
        "isError": false
    })
}
