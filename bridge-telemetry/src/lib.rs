//! Observability utilities for capbridge.

#![warn(missing_docs, clippy::pedantic)]

pub mod timing;
pub mod tracing_support;

pub use timing::CallTimer;
pub use tracing_support::init;
