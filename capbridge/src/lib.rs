//! capbridge: one capability surface, two transports.
//!
//! A [`Runtime`] owns a single [`tools::CapabilityRegistry`]. Sandboxed wasm
//! guests reach it through the host-function bridge ([`host`]); external
//! callers reach it through JSON-RPC `tools/list` and `tools/call` ([`rpc`]).
//! Both paths observe the same state.
//!
//! ```no_run
//! # fn main() -> anyhow::Result<()> {
//! let runtime = capbridge::Runtime::new(&capbridge::config::BridgeConfig::default())?;
//! runtime.call("state_set", serde_json::json!({ "key": "x", "value": "42" }))?;
//! assert_eq!(runtime.state().get("x").as_deref(), Some("42"));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs, clippy::pedantic)]

mod runtime;

pub use runtime::Runtime;

/// Capability names, descriptors and catalog types.
pub use bridge_primitives as primitives;

/// Capability registry and the shipped capabilities.
pub use bridge_tools as tools;

/// Guest memory primitives, the host bridge and the wasmtime sandbox.
pub use bridge_host as host;

/// Configuration schema and loader.
pub use bridge_config as config;

/// JSON-RPC tool-call server and client (enabled by `rpc` feature).
#[cfg(feature = "rpc")]
pub use bridge_rpc as rpc;

/// Tracing setup and call timing (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use bridge_telemetry as telemetry;
