//! Error types for the routing engine.
//!
//! Per the engine's error-handling discipline, almost nothing here ever
//! unwinds out of a task: malformed messages, send failures, and missing
//! routes are all logged and dropped at the point they occur. The one
//! exception is failing to bind the UDP socket at startup, which is fatal
//! and surfaces through [`EngineError`].

use std::net::IpAddr;

use thiserror::Error;

/// Fatal errors that can escape [`crate::engine::Engine::start`].
///
/// Everything else in the engine's error taxonomy (transport send/receive
/// failures, malformed wire messages, route lookup misses) is handled
/// locally with a `tracing` event and never reaches this type.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Binding the UDP socket to `(self_addr, port)` failed. The spec calls
    /// this the only fatal condition in the whole engine.
    #[error("failed to bind routing socket on {addr}:{port}: {source}")]
    BindFailed {
        addr: IpAddr,
        port: u16,
        #[source]
        source: std::io::Error,
    },
}
