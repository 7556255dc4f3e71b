//! Protocol-level error type shared by the higher layers.

use thiserror::Error;

/// Errors surfaced by the protocol/codec layer.
///
/// Protocol *violations* (unknown sender, wrong addressee, unrecognized
/// payload) are never raised as errors — they are silently dropped per the
/// propagation policy: this enum only covers failures
/// a caller must act on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtoError {
    /// A `CALL`'s `methodPath` did not resolve to a callable on the
    /// receiving side.
    #[error("Method {0} is not found.")]
    MethodNotFound(String),
    /// The handler registered at the call's `methodPath` returned `Err`.
    /// Carries the handler's own message unmodified, distinct from
    /// [`ProtoError::MethodNotFound`] so a `REPLY`'s `value` never conflates
    /// "no such method" with "the method itself failed".
    #[error("{0}")]
    MethodThrew(String),
}
