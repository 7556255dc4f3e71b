//! Messenger-level errors.

use thiserror::Error;

/// Failures surfaced by [`crate::MessagePort`] or [`crate::Messenger`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PortError {
    /// Send before a concrete peer origin was learned, for a message type
    /// other than `SYN`/`DESTROY`.
    #[error("no concrete origin learned yet; cannot target outbound message precisely")]
    NoConcreteOrigin,
    /// The port was destroyed before the send was attempted.
    #[error("messenger is destroyed")]
    Destroyed,
    /// The underlying port rejected the send (peer window closed, threw,
    /// etc.).
    #[error("send failed: {0}")]
    SendFailed(String),
}
