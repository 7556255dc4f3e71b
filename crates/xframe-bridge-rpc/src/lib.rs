//! Outgoing call proxy and incoming method table for the cross-frame RPC
//! bridge.
//!
//! Built on top of [`xframe_bridge_messenger::Messenger`]: this crate adds
//! call ids, timeouts, and the pending-call bookkeeping a `CALL`/`REPLY`
//! pair needs but a plain message send does not.

mod clock;
mod error;
mod method_table;
mod pending;
mod proxy;

pub use clock::Clock;
#[cfg(not(target_arch = "wasm32"))]
pub use clock::NativeClock;
#[cfg(target_arch = "wasm32")]
pub use clock::WasmClock;
pub use error::RpcError;
pub use method_table::{MethodHandler, MethodTable};
pub use pending::PendingCalls;
pub use proxy::RemoteProxy;
