//! Client-side transports.
//!
//! [`Transport`] is the seam between the probe's protocol logic and the
//! wire. [`StreamableHttpTransport`] speaks MCP streamable HTTP: each message
//! is a POST, replies come back as JSON or as an SSE stream, and the session
//! id handed out on `initialize` is echoed on every later request.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde_json::{Value, json};
use url::Url;

use crate::client::error::ProbeError;
use crate::client::sse::SseDecoder;

pub const SESSION_HEADER: &str = "mcp-session-id";
pub const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

/// A JSON-RPC message channel to one server.
#[async_trait]
pub trait Transport: Send {
    /// Send a request and wait for its result.
    async fn request(&mut self, method: &str, params: Value) -> Result<Value, ProbeError>;

    /// Send a notification; no reply is expected.
    async fn notify(&mut self, method: &str, params: Value) -> Result<(), ProbeError>;

    /// Session id assigned by the server, once known.
    fn session_id(&self) -> Option<&str> {
        None
    }

    /// Remember the negotiated protocol version for later messages.
    fn set_protocol_version(&mut self, _version: &str) {}

    /// End the session. Best effort.
    async fn close(&mut self) -> Result<(), ProbeError> {
        Ok(())
    }
}

/// MCP streamable HTTP transport over reqwest.
pub struct StreamableHttpTransport {
    client: Client,
    endpoint: Url,
    session_id: Option<String>,
    protocol_version: Option<String>,
    next_id: u64,
}

impl StreamableHttpTransport {
    /// Prepare a transport for `url`.
    ///
    /// No bytes are sent yet; an unreachable host shows up on the first
    /// request.
    pub fn connect(url: &str) -> Result<Self, ProbeError> {
        let endpoint = Url::parse(url).map_err(|source| ProbeError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ProbeError::UnsupportedScheme(endpoint.scheme().to_string()));
        }
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            endpoint,
            session_id: None,
            protocol_version: None,
            next_id: 0,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/event-stream"));
        if let Some(id) = self.session_id.as_deref().and_then(|id| id.parse().ok()) {
            headers.insert(SESSION_HEADER, id);
        }
        if let Some(version) = self.protocol_version.as_deref().and_then(|v| v.parse().ok()) {
            headers.insert(PROTOCOL_VERSION_HEADER, version);
        }
        headers
    }

    async fn post(&mut self, message: &Value) -> Result<Response, ProbeError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(self.headers())
            .json(message)
            .send()
            .await?;

        if let Some(id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            if self.session_id.as_deref() != Some(id) {
                tracing::debug!(session = %id, "session id assigned");
                self.session_id = Some(id.to_string());
            }
        }

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProbeError::Status { status, body: error_text(&body) });
        }
        Ok(response)
    }
}

/// Prefer the JSON-RPC error message when the body carries one.
fn error_text(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// Turn a JSON-RPC response object into its result.
fn into_result(message: Value) -> Result<Value, ProbeError> {
    if let Some(error) = message.get("error") {
        return Err(ProbeError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        });
    }
    message
        .get("result")
        .cloned()
        .ok_or_else(|| ProbeError::Malformed("response has neither result nor error".to_string()))
}

fn is_reply_to(message: &Value, id: u64) -> bool {
    message.get("id").and_then(Value::as_u64) == Some(id)
        && (message.get("result").is_some() || message.get("error").is_some())
}

#[async_trait]
impl Transport for StreamableHttpTransport {
    async fn request(&mut self, method: &str, params: Value) -> Result<Value, ProbeError> {
        self.next_id += 1;
        let id = self.next_id;
        let message = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        tracing::debug!(%method, id, "sending request");

        let response = self.post(&message).await?;
        if response.status() == StatusCode::ACCEPTED {
            return Err(ProbeError::Malformed(format!("request {} was accepted without a reply", id)));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("text/event-stream") {
            let mut decoder = SseDecoder::new();
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk: Bytes = chunk?;
                for event in decoder.push(&chunk) {
                    if event.event != "message" {
                        continue;
                    }
                    let payload: Value = serde_json::from_str(&event.data)?;
                    if is_reply_to(&payload, id) {
                        return into_result(payload);
                    }
                    tracing::debug!(message = %payload, "ignoring unrelated server message");
                }
            }
            if let Some(event) = decoder.finish() {
                let payload: Value = serde_json::from_str(&event.data)?;
                if is_reply_to(&payload, id) {
                    return into_result(payload);
                }
            }
            Err(ProbeError::NoResponse(id))
        } else if content_type.starts_with("application/json") {
            let payload: Value = response.json().await?;
            if !is_reply_to(&payload, id) {
                return Err(ProbeError::Malformed(format!("reply does not match request {}", id)));
            }
            into_result(payload)
        } else {
            Err(ProbeError::Malformed(format!("unexpected content type '{}'", content_type)))
        }
    }

    async fn notify(&mut self, method: &str, params: Value) -> Result<(), ProbeError> {
        let message = json!({ "jsonrpc": "2.0", "method": method, "params": params });
        self.post(&message).await?;
        Ok(())
    }

    fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    fn set_protocol_version(&mut self, version: &str) {
        self.protocol_version = Some(version.to_string());
    }

    async fn close(&mut self) -> Result<(), ProbeError> {
        let Some(session_id) = self.session_id.take() else {
            return Ok(());
        };
        let response = self
            .client
            .delete(self.endpoint.clone())
            .header(SESSION_HEADER, &session_id)
            .send()
            .await?;
        // 405 means the server does not let clients end sessions.
        if !response.status().is_success() && response.status() != StatusCode::METHOD_NOT_ALLOWED {
            return Err(ProbeError::Status {
                status: response.status().as_u16(),
                body: error_text(&response.text().await.unwrap_or_default()),
            });
        }
        tracing::debug!(session = %session_id, "session terminated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_validates_url() {
        assert!(matches!(
            StreamableHttpTransport::connect("not a url"),
            Err(ProbeError::InvalidUrl { .. })
        ));
        assert!(matches!(
            StreamableHttpTransport::connect("ftp://example.com/mcp/"),
            Err(ProbeError::UnsupportedScheme(scheme)) if scheme == "ftp"
        ));
        let transport = StreamableHttpTransport::connect("http://localhost:8000/mcp/").unwrap();
        assert_eq!(transport.endpoint().path(), "/mcp/");
        assert!(transport.session_id().is_none());
    }

    #[test]
    fn headers_carry_session_and_version() {
        let mut transport = StreamableHttpTransport::connect("http://localhost:8000/mcp/").unwrap();
        assert!(transport.headers().get(SESSION_HEADER).is_none());

        transport.session_id = Some("abc123".to_string());
        transport.set_protocol_version("2025-06-18");
        let headers = transport.headers();
        assert_eq!(headers.get(SESSION_HEADER).unwrap(), "abc123");
        assert_eq!(headers.get(PROTOCOL_VERSION_HEADER).unwrap(), "2025-06-18");
    }

    #[test]
    fn into_result_maps_errors() {
        let err = into_result(json!({ "id": 1, "error": { "code": -32601, "message": "nope" } })).unwrap_err();
        assert!(matches!(err, ProbeError::Rpc { code: -32601, .. }));
        assert_eq!(into_result(json!({ "id": 1, "result": {} })).unwrap(), json!({}));
        assert!(matches!(into_result(json!({ "id": 1 })), Err(ProbeError::Malformed(_))));
    }

    #[test]
    fn error_text_prefers_rpc_message() {
        assert_eq!(
            error_text(r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32600,"message":"Session not found"}}"#),
            "Session not found"
        );
        assert_eq!(error_text("  plain  "), "plain");
    }

    #[test]
    fn reply_matching_requires_same_id() {
        assert!(is_reply_to(&json!({ "id": 2, "result": {} }), 2));
        assert!(!is_reply_to(&json!({ "id": 3, "result": {} }), 2));
        assert!(!is_reply_to(&json!({ "id": 2, "method": "ping" }), 2));
    }
}
