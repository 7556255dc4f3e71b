// SPDX-License-Identifier: Apache-2.0
//! The embedder-facing facade for the cross-frame RPC bridge.
//!
//! [`Bridge`] binds a [`xframe_bridge_session::Session`] to a peer
//! window-like port and publishes its proxy through an
//! [`xframe_bridge_observable::ObservableCell`]. On `wasm32` this crate also
//! exports [`wasm::XframeBridge`], a `#[wasm_bindgen]` wrapper that is the
//! actual JavaScript-facing API.

mod bridge;
mod config;
mod error;
mod spawn;
#[cfg(target_arch = "wasm32")]
mod wasm;

pub use bridge::{Bridge, PeerKey};
pub use config::BridgeConfig;
pub use error::BridgeError;
pub use spawn::Spawn;
#[cfg(target_arch = "wasm32")]
pub use spawn::WasmSpawner;
#[cfg(not(target_arch = "wasm32"))]
pub use spawn::PoolSpawner;
#[cfg(target_arch = "wasm32")]
pub use wasm::XframeBridge;

pub use xframe_bridge_observable::{Loadable, ObservableCell, SubscriptionId};
pub use xframe_bridge_proto::ParticipantId;
pub use xframe_bridge_rpc::{Clock, RemoteProxy, RpcError};
pub use xframe_bridge_session::SessionError;
