// SPDX-License-Identifier: Apache-2.0
//! A four-state loadable cell with a minimal subscriber list.
//!
//! Converts a slot holding "no promise" / "a pending promise" / "a settled
//! promise" into a reactive [`Loadable`] value, independent of any
//! particular reactive framework — the runtime (`wasm-bindgen-futures` on
//! `wasm32`, an explicit executor in native tests) drives the underlying
//! future and reports its outcome through [`ObservableCell::resolve`].

mod cell;
mod loadable;

pub use cell::{ObservableCell, SubscriptionId};
pub use loadable::Loadable;
