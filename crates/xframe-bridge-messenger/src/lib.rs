// SPDX-License-Identifier: Apache-2.0
//! Origin-filtering, self-echo-filtering transport adapter.
//!
//! [`Messenger`] wraps a [`MessagePort`], learns the peer's concrete origin
//! from the first valid inbound message, enforces the outbound origin
//! policy, and fans inbound protocol messages out to registered handlers.

mod error;
mod messenger;
mod origin;
mod port;

pub use error::PortError;
pub use messenger::Messenger;
pub use origin::{AllowedOrigin, AllowedOrigins};
#[cfg(not(target_arch = "wasm32"))]
pub use port::LoopbackPort;
#[cfg(target_arch = "wasm32")]
pub use port::WindowPort;
pub use port::MessagePort;
