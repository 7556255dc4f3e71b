//! Session-layer errors.

use thiserror::Error;

/// Errors surfaced while establishing or holding a session.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    /// The handshake did not reach `ESTABLISHED` before the configured
    /// timeout.
    #[error("handshake timed out after {timeout_ms}ms")]
    HandshakeTimeout {
        /// The timeout that elapsed.
        timeout_ms: u64,
    },
    /// The session was destroyed before the handshake completed.
    #[error("destroyed connection")]
    Destroyed,
}
