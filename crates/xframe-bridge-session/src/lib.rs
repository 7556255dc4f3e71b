//! Handshake state machine, leader election, and RPC channel lifetime for the
//! cross-frame bridge.
//!
//! Wraps an `xframe-bridge-messenger::Messenger`, pairs with exactly one
//! peer through the three-step `SYN`/`ACK1`/`ACK2` handshake, and
//! materializes an `xframe-bridge-rpc::RemoteProxy` once established.

mod error;
mod session;

pub use error::SessionError;
pub use session::{Session, SessionState};
