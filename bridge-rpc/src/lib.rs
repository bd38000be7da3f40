//! JSON-RPC 2.0 transport for the capbridge capability registry.
//!
//! Two methods are served: `tools/list` returns the registry's
//! [`bridge_primitives::Catalog`] and `tools/call` dispatches
//! `{ "name", "arguments" }` into the same [`bridge_tools::CapabilityRegistry`]
//! the sandbox bridge uses.

#![warn(missing_docs, clippy::pedantic)]

pub mod client;
pub mod dispatch;
pub mod limiter;
pub mod protocol;
pub mod server;

pub use client::{ClientError, ClientResult, ToolCallClient};
pub use dispatch::ToolCallHandler;
pub use limiter::{ConcurrencyLimit, LimiterError};
pub use protocol::{ErrorCode, ErrorObject, JsonRpcRequest, JsonRpcResponse, RequestId};
pub use server::{PROCESS_TIME_HEADER, ServerConfig, ServerError, ServerHandle, ToolCallServer};
