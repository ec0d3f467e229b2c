//! STDIO transport.
//!
//! Reads one JSON-RPC message per line from stdin and writes one response
//! per line to stdout. Logging goes to stderr so it never mixes with the
//! protocol stream. Sessions do not apply: the process is the session.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};

use crate::core::server::{self, AppState, Incoming, MCPResponse, ToolRegistry};

/// Run the MCP server over the process's stdin/stdout until EOF.
pub async fn run_server_stdio(app: AppState) -> std::io::Result<()> {
    tracing::info!(name = %app.server_name, version = %app.server_version, "MCP server starting (STDIO mode)");

    let registry = server::initialize_tools();
    // 8KB buffers balance memory usage with I/O efficiency
    let stdin = BufReader::with_capacity(8192, tokio::io::stdin());
    let stdout = BufWriter::with_capacity(8192, tokio::io::stdout());
    serve_lines(&app, &registry, stdin, stdout).await
}

/// Serve line-delimited JSON-RPC from `input` to `output`.
pub async fn serve_lines<R, W>(
    app: &AppState,
    registry: &Arc<ToolRegistry>,
    input: R,
    mut output: W,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    // Raw byte lines: invalid UTF-8 must reach the parser and get a parse error.
    let mut lines = input.split(b'\n');

    while let Some(mut line) = lines.next_segment().await? {
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let response: Option<MCPResponse> = match server::parse_message(&line) {
            Ok(Incoming::Request(request)) => server::dispatch(app, registry, &request),
            Ok(Incoming::Notification(notification)) => {
                tracing::debug!(method = %notification.method, "notification received");
                None
            }
            Ok(Incoming::Response(_)) => None,
            Err(error_response) => {
                tracing::warn!(error = ?error_response.error, "rejecting malformed line");
                Some(error_response)
            }
        };

        let Some(response) = response else {
            continue;
        };

        let json = match serde_json::to_string(&response) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize response");
                continue;
            }
        };

        // Each response is one line; flush so the client sees it immediately.
        output.write_all(json.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }

    tracing::info!("stdin closed, STDIO server stopping");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn app() -> AppState {
        AppState {
            server_name: "stdio-test".to_string(),
            server_version: "0.0.0".to_string(),
            instructions: None,
        }
    }

    async fn run(input: &str) -> Vec<Value> {
        run_bytes(input.as_bytes()).await
    }

    async fn run_bytes(input: &[u8]) -> Vec<Value> {
        let registry = server::initialize_tools();
        let mut output = Vec::new();
        serve_lines(&app(), &registry, input, &mut output)
            .await
            .unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn answers_requests_and_skips_notifications() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05"}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"add_numbers","arguments":{"a":0,"b":0}}}"#,
            "\n",
        );
        let responses = run(input).await;
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(responses[1]["id"], 2);
        assert_eq!(responses[1]["result"]["content"][0]["text"], "0.0");
    }

    #[tokio::test]
    async fn malformed_line_gets_parse_error() {
        let responses = run("{oops\n").await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["error"]["code"], server::error_codes::PARSE_ERROR);
        assert!(responses[0]["id"].is_null());
    }

    #[tokio::test]
    async fn invalid_utf8_line_does_not_stop_the_loop() {
        let mut input = Vec::new();
        input.extend_from_slice(br#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#);
        input.extend_from_slice(b"\n\xff\xfe\n");
        input.extend_from_slice(br#"{"jsonrpc":"2.0","id":3,"method":"ping"}"#);
        input.extend_from_slice(b"\r\n");

        let responses = run_bytes(&input).await;
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[1]["error"]["code"], server::error_codes::PARSE_ERROR);
        assert!(responses[1]["id"].is_null());
        assert_eq!(responses[2]["id"], 3);
        assert_eq!(responses[2]["result"], serde_json::json!({}));
    }
}
