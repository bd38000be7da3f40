//! Configuration management for capbridge.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `CAPBRIDGE_*` environment variables.

#![warn(missing_docs, clippy::pedantic)]

pub mod loader;
pub mod schema;

pub use loader::{load, load_with_env};
pub use schema::{
    BridgeConfig, LimitsSection, LogFormat, MailboxSection, SandboxSection, ServerSection,
    TelemetrySection,
};
