//! Probe client.
//!
//! - transport.rs: the `Transport` seam and the streamable HTTP transport
//! - sse.rs: incremental SSE decoding for streamed replies
//! - session.rs: typed initialize / tools/list / tools/call
//! - probe.rs: the smoke-test state machine and its console report
//! - config.rs: command-line / environment configuration

pub mod config;
pub mod error;
pub mod probe;
pub mod session;
pub mod sse;
pub mod transport;
pub mod types;

pub use config::ProbeConfig;
pub use error::ProbeError;
pub use probe::{Probe, ProbeReport, ProbeState};
pub use session::ClientSession;
pub use transport::{StreamableHttpTransport, Transport};
