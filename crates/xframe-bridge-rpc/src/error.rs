//! RPC-layer errors.

use thiserror::Error;

/// Errors surfaced by an outgoing [`crate::RemoteProxy`] call.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RpcError {
    /// The call exceeded the configured per-call timeout.
    #[error("call to {method_path} timed out after {timeout_ms}ms")]
    CallTimeout {
        /// Dotted method path, for diagnostics.
        method_path: String,
        /// The timeout that elapsed.
        timeout_ms: u64,
    },
    /// The underlying messenger rejected the `CALL` send.
    #[error("failed to send call: {0}")]
    CallSendFailed(String),
    /// The session was destroyed while the call was pending, or the call
    /// was attempted on an already-destroyed session.
    #[error("destroyed connection")]
    Destroyed,
    /// The peer's method implementation threw or rejected.
    #[error("{0}")]
    MethodThrew(String),
}
