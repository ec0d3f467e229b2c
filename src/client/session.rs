//! Typed MCP client session on top of a [`Transport`].

use serde_json::{Value, json};

use crate::client::error::ProbeError;
use crate::client::transport::Transport;
use crate::client::types::{CallToolResult, Implementation, InitializeResult, ListToolsResult, ToolInfo};

/// Protocol revision requested during the handshake.
pub const CLIENT_PROTOCOL_VERSION: &str = "2025-06-18";

/// Revisions this client can work with if the server picks another.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &[CLIENT_PROTOCOL_VERSION, "2025-03-26", "2024-11-05"];

pub struct ClientSession<T: Transport> {
    transport: T,
    client_info: Implementation,
    server: Option<InitializeResult>,
}

impl<T: Transport> ClientSession<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            client_info: Implementation {
                name: "mcp-probe".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            server: None,
        }
    }

    /// Perform the initialize handshake and send `notifications/initialized`.
    pub async fn initialize(&mut self) -> Result<&InitializeResult, ProbeError> {
        let params = json!({
            "protocolVersion": CLIENT_PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": self.client_info,
        });
        let result: InitializeResult = serde_json::from_value(self.transport.request("initialize", params).await?)?;

        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&result.protocol_version.as_str()) {
            return Err(ProbeError::ProtocolVersion(result.protocol_version));
        }
        self.transport.set_protocol_version(&result.protocol_version);
        self.transport.notify("notifications/initialized", json!({})).await?;

        tracing::debug!(
            server = %result.server_info.name,
            version = %result.server_info.version,
            protocol = %result.protocol_version,
            "session initialized"
        );
        Ok(&*self.server.insert(result))
    }

    pub fn session_id(&self) -> Option<&str> {
        self.transport.session_id()
    }

    /// All tools, following `nextCursor` pages until the server stops.
    pub async fn list_tools(&mut self) -> Result<Vec<ToolInfo>, ProbeError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = match &cursor {
                Some(cursor) => json!({ "cursor": cursor }),
                None => json!({}),
            };
            let page: ListToolsResult = serde_json::from_value(self.transport.request("tools/list", params).await?)?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if cursor.as_ref() != Some(&next) => cursor = Some(next),
                _ => break,
            }
        }
        Ok(tools)
    }

    /// Invoke a tool. A result flagged `isError` is returned as-is; the
    /// caller decides how to treat it.
    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<CallToolResult, ProbeError> {
        let params = json!({ "name": name, "arguments": arguments });
        let result = self.transport.request("tools/call", params).await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn ping(&mut self) -> Result<(), ProbeError> {
        self.transport.request("ping", json!({})).await?;
        Ok(())
    }

    /// Terminate the session on the server.
    pub async fn close(&mut self) -> Result<(), ProbeError> {
        self.transport.close().await
    }
}
