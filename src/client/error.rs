//! Error types for the probe client.

use thiserror::Error;

/// Everything that can go wrong while talking to a tool host.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid server URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported URL scheme '{0}', expected http or https")]
    UnsupportedScheme(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server answered HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("server returned error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("response stream closed before the reply to request {0}")]
    NoResponse(u64),

    #[error("server selected unsupported protocol version {0}")]
    ProtocolVersion(String),

    #[error("tool reported an error: {0}")]
    Tool(String),
}

impl ProbeError {
    /// Short variant name used in console diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::InvalidUrl { .. } => "InvalidUrl",
            ProbeError::UnsupportedScheme(_) => "UnsupportedScheme",
            ProbeError::Http(e) if e.is_connect() => "ConnectError",
            ProbeError::Http(e) if e.is_timeout() => "Timeout",
            ProbeError::Http(_) => "HttpError",
            ProbeError::Status { .. } => "HttpStatusError",
            ProbeError::Malformed(_) => "MalformedResponse",
            ProbeError::Json(_) => "JsonError",
            ProbeError::Rpc { .. } => "RpcError",
            ProbeError::NoResponse(_) => "NoResponse",
            ProbeError::ProtocolVersion(_) => "ProtocolVersionMismatch",
            ProbeError::Tool(_) => "ToolError",
        }
    }

    /// The error followed by each of its sources, outermost first.
    pub fn chain(&self) -> Vec<String> {
        let mut chain = vec![self.to_string()];
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }
        chain
    }
}
