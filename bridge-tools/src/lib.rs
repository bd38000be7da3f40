//! Capability registry and the capabilities shipped with capbridge.
//!
//! The [`registry`] module is the single capability surface shared by the
//! sandbox bridge and the tool-call server. The remaining modules provide the
//! built-in capabilities (`log`, `state_get`, `state_set`) and the demo
//! business tools used by the benchmark scenarios.

#![warn(missing_docs, clippy::pedantic)]

pub mod array;
pub mod builtin;
pub mod echo;
pub mod log;
pub mod mailbox;
pub mod registry;
pub mod state;

pub use registry::{
    Capability, CapabilityError, CapabilityHandle, CapabilityRegistry, CapabilityResult,
};
