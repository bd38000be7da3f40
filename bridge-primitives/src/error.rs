//! Shared error definitions for capability primitives.

use thiserror::Error;

/// Result alias used throughout the capability primitives.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while describing capabilities.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Capability name failed validation.
    #[error("invalid capability name `{name}`: {reason}")]
    InvalidName {
        /// The offending name.
        name: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Capability descriptor failed validation.
    #[error("invalid capability descriptor: {reason}")]
    InvalidDescriptor {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Parameter definition failed validation.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParam {
        /// Name of the parameter.
        name: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Call arguments did not match the declared input shape.
    #[error("invalid arguments: {reason}")]
    InvalidArguments {
        /// Human-readable reason for rejection.
        reason: String,
    },
}

impl Error {
    pub(crate) fn invalid_arguments(reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            reason: reason.into(),
        }
    }
}
