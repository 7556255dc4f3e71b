// SPDX-License-Identifier: Apache-2.0
//! Wire schema for the cross-frame RPC bridge.
//!
//! This crate owns exactly the message taxonomy and codec: the
//! [`Envelope`] type, its JSON encoding, the recognition
//! predicate that classifies arbitrary inbound traffic, and participant
//! identifier generation/ordering. It has no opinion on transport, origin
//! policy, or session lifecycle — those live in `xframe-bridge-messenger`
//! and `xframe-bridge-session`.

mod envelope;
mod error;
mod participant;

pub use envelope::{CallId, Envelope, MessageType, NAMESPACE};
pub use error::ProtoError;
pub use participant::ParticipantId;
