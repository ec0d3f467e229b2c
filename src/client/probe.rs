//! End-to-end smoke test of a tool host.
//!
//! The run is a fixed sequence of states:
//!
//! ```text
//! Disconnected -> Connected -> Initialized -> Listed -> Invoked -> Done
//!       \              \             \           \
//!        +--------------+-------------+-----------+--> Failed
//! ```
//!
//! Connection-level errors (connect, handshake, listing) and an empty tool
//! list end the run in `Failed`. A failed invocation is reported and the run
//! still finishes in `Done`. Nothing is retried. All reporting is plain text
//! written to the supplied sink.

use std::fmt::Display;
use std::io::Write;

use crate::client::config::ProbeConfig;
use crate::client::error::ProbeError;
use crate::client::session::ClientSession;
use crate::client::transport::{StreamableHttpTransport, Transport};
use crate::client::types::{CallToolResult, ContentBlock, ToolInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Disconnected,
    Connected,
    Initialized,
    Listed,
    Invoked,
    Done,
    Failed,
}

/// What happened during a run.
#[derive(Debug)]
pub struct ProbeReport {
    /// Every state entered, starting with `Disconnected`.
    pub history: Vec<ProbeState>,
    pub session_id: Option<String>,
    pub tools: Vec<ToolInfo>,
    /// Tool result when the invocation succeeded.
    pub result: Option<CallToolResult>,
    /// Invocation error, reported without failing the run.
    pub call_error: Option<String>,
    /// Reason the run ended in `Failed`.
    pub failure: Option<String>,
}

impl ProbeReport {
    fn new() -> Self {
        Self {
            history: vec![ProbeState::Disconnected],
            session_id: None,
            tools: Vec::new(),
            result: None,
            call_error: None,
            failure: None,
        }
    }

    pub fn state(&self) -> ProbeState {
        self.history.last().copied().unwrap_or(ProbeState::Disconnected)
    }

    /// Whether the run got as far as `state`.
    pub fn reached(&self, state: ProbeState) -> bool {
        self.history.contains(&state)
    }
}

const LIKELY_CAUSES: [&str; 4] = [
    "Network connectivity issues",
    "MCP server not responding",
    "Session management problems",
    "Protocol version mismatch",
];

pub struct Probe<W: Write> {
    config: ProbeConfig,
    out: W,
    report: ProbeReport,
}

impl<W: Write> Probe<W> {
    pub fn new(config: ProbeConfig, out: W) -> Self {
        Self {
            config,
            out,
            report: ProbeReport::new(),
        }
    }

    /// Console output is best effort; a closed stdout must not abort the run.
    fn say(&mut self, line: impl Display) {
        let _ = writeln!(self.out, "{}", line);
    }

    fn enter(&mut self, next: ProbeState) {
        tracing::debug!(from = ?self.report.state(), to = ?next, "probe state change");
        self.report.history.push(next);
    }

    /// Connect to the configured URL over streamable HTTP and run.
    pub async fn run(self) -> ProbeReport {
        match StreamableHttpTransport::connect(&self.config.url) {
            Ok(transport) => self.run_with(transport).await,
            Err(e) => {
                let mut probe = self;
                probe.banner();
                probe.connection_failed(&e);
                probe.finish()
            }
        }
    }

    /// Run over an already constructed transport.
    pub async fn run_with<T: Transport>(mut self, transport: T) -> ProbeReport {
        self.banner();
        self.enter(ProbeState::Connected);

        let mut session = ClientSession::new(transport);
        if let Err(e) = self.drive(&mut session).await {
            self.connection_failed(&e);
        }

        if let Err(e) = session.close().await {
            tracing::debug!(error = %e, "session close failed");
        }
        self.finish()
    }

    fn banner(&mut self) {
        self.say("Testing Remote MCP Server");
        self.say("=".repeat(50));
        let url = self.config.url.clone();
        self.say(format!("Connecting to: {}", url));
    }

    fn finish(mut self) -> ProbeReport {
        let _ = self.out.flush();
        self.report
    }

    async fn drive<T: Transport>(&mut self, session: &mut ClientSession<T>) -> Result<(), ProbeError> {
        self.say("Connected to remote MCP server");
        self.say("Initializing session...");

        let server = session.initialize().await?;
        let server_line = format!(
            "Session initialized successfully ({} {}, protocol {})",
            server.server_info.name, server.server_info.version, server.protocol_version
        );
        let instructions = server.instructions.clone();
        let advertises_tools = server.capabilities.get("tools").is_some();
        self.report.session_id = session.session_id().map(str::to_string);
        self.say(server_line);
        if let Some(instructions) = instructions {
            self.say(format!("Server instructions: {}", instructions));
        }
        if !advertises_tools {
            tracing::warn!("server did not advertise the tools capability");
            self.say("   Server does not advertise the tools capability");
        }
        let session_line = format!(
            "Session ID: {}",
            self.report.session_id.as_deref().unwrap_or("<none>")
        );
        self.say(session_line);
        self.enter(ProbeState::Initialized);

        self.say("");
        self.say("Listing available tools...");
        let tools = session.list_tools().await?;
        if tools.is_empty() {
            self.say("No tools found");
            self.report.failure = Some("no tools found".to_string());
            self.enter(ProbeState::Failed);
            return Ok(());
        }
        self.say(format!("Found {} tool(s):", tools.len()));
        for tool in &tools {
            let line = format!(
                "   - {}: {}",
                tool.name,
                tool.description.as_deref().unwrap_or("")
            );
            self.say(line);
            let params = tool.parameter_names();
            if !params.is_empty() {
                self.say(format!("     Parameters: {}", params.join(", ")));
            }
        }
        self.report.tools = tools;
        self.enter(ProbeState::Listed);

        self.invoke(session).await;
        self.enter(ProbeState::Invoked);

        self.say("");
        self.say("Remote MCP testing completed!");
        self.enter(ProbeState::Done);
        Ok(())
    }

    /// The single tool call. Errors are reported here and never propagate.
    async fn invoke<T: Transport>(&mut self, session: &mut ClientSession<T>) {
        let tool = self.config.tool.clone();
        self.say("");
        self.say(format!("Testing {} tool...", tool));
        self.say(format!("   Testing: {} + {}", self.config.a, self.config.b));

        let outcome = session
            .call_tool(&tool, self.config.arguments())
            .await
            .and_then(|result| {
                if result.is_error {
                    Err(ProbeError::Tool(result.texts().join(" ")))
                } else {
                    Ok(result)
                }
            });

        match outcome {
            Ok(result) => {
                if result.content.is_empty() {
                    self.say(format!("   No content in result: {:?}", result));
                }
                for block in &result.content {
                    match block {
                        ContentBlock::Text { text } => self.say(format!("   Result: {}", text)),
                        other => self.say(format!("   Result: {:?}", other)),
                    }
                }
                self.report.result = Some(result);
            }
            Err(e) => {
                tracing::warn!(tool = %tool, error = %e, "tool call failed");
                self.say(format!("   Tool call failed: {}", e));
                self.report.call_error = Some(e.to_string());
            }
        }
    }

    fn connection_failed(&mut self, error: &ProbeError) {
        tracing::error!(error = %error, kind = error.kind(), "connection failed");
        self.say(format!("Connection failed: {}", error));
        self.say(format!("   Error type: {}", error.kind()));
        self.say("   Full trace:");
        for (depth, cause) in error.chain().iter().enumerate() {
            self.say(format!("     {}: {}", depth, cause));
        }
        self.say(format!("     debug: {:?}", error));
        self.say("");
        self.say("   This could be due to:");
        for cause in LIKELY_CAUSES {
            self.say(format!("   - {}", cause));
        }
        self.report.failure = Some(error.to_string());
        self.enter(ProbeState::Failed);
    }
}
