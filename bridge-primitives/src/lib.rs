//! Core shared types for the capbridge capability surface.
//!
//! Everything a capability exposes to the outside world, whether it is called
//! from inside the sandbox or over the tool-call protocol, is described by the
//! types in this crate.

#![warn(missing_docs, clippy::pedantic)]

mod capability;
mod catalog;
mod error;
mod params;

/// Capability names, descriptors, and supporting builders.
pub use capability::{CapabilityDescriptor, CapabilityDescriptorBuilder, CapabilityName};
/// Discovery catalog advertised by `tools/list`.
pub use catalog::{Catalog, CatalogEntry};
/// Error type and result alias shared across the workspace.
pub use error::{Error, Result};
/// Input-shape descriptors used for discovery and argument validation.
pub use params::{ParamKind, ParamSpec};
