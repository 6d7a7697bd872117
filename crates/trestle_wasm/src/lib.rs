//! Wasmtime-backed guest/host bridge.
//!
//! [`Bridge`] instantiates a guest module against a [`trestle_host::Host`]
//! capability, wires up the `env`/`js` import surface plus a small
//! `wasi_snapshot_preview1` shim, and drives the event loop that delivers
//! fetch, image, and interval callbacks into the guest with tagged 64-bit
//! words.

mod bridge;
mod dispatch;
mod memory;
mod registry;
mod wasi;

pub use bridge::{Bridge, BridgeState};
