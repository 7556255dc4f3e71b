//! The unified error taxonomy surfaced by the facade.

use thiserror::Error;
use xframe_bridge_rpc::RpcError;
use xframe_bridge_session::SessionError;

/// Errors surfaced by [`crate::Bridge`], composing the narrower per-crate
/// errors of the layers it owns.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BridgeError {
    /// `connect()` was called with no peer and no fallback target
    /// available (the `wasm32` facade's "default to the parent frame"
    /// resolution failed).
    #[error("no target window to connect to")]
    NoTarget,
    /// The proxy or observable cell was queried before any session was
    /// ever bound via `connect`.
    #[error("no session is bound")]
    NoSession,
    /// The handshake did not complete in time.
    #[error(transparent)]
    Handshake(#[from] SessionError),
    /// An outgoing call failed.
    #[error(transparent)]
    Call(#[from] RpcError),
}
