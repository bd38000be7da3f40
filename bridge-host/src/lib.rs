//! Host side of the capbridge sandbox boundary.
//!
//! Guests import a small, versioned set of functions from the `env` module
//! ([`abi`]). Every argument arrives as an `(offset, length)` span into the
//! guest's linear memory; [`memory`] turns those spans into owned, bounds
//! checked copies and [`HostBridge`] dispatches them into the shared
//! [`bridge_tools::CapabilityRegistry`]. The [`sandbox`] module wires the bridge
//! into wasmtime.

#![warn(missing_docs, clippy::pedantic)]

pub mod abi;
mod bridge;
pub mod memory;
#[cfg(feature = "wasmtime")]
pub mod sandbox;

pub use abi::{ABI_VERSION, Status};
pub use bridge::{BridgeError, BridgeLimits, BridgeResult, HostBridge};
pub use memory::{GuestMemory, GuestSpan, MemoryError};
#[cfg(feature = "wasmtime")]
pub use sandbox::{GuestOutcome, Sandbox, SandboxConfig, SandboxError};
