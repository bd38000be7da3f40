//! Runtime registry for capability descriptors and execution.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bridge_primitives::{Catalog, CapabilityDescriptor, CapabilityName};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Result alias for capability operations.
pub type CapabilityResult<T> = Result<T, CapabilityError>;

/// Trait implemented by capability executors.
///
/// Implementations are shared between every transport and may be invoked
/// from several threads at once.
pub trait Capability: Send + Sync {
    /// Invokes the capability with a JSON object of arguments.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::InvalidArguments`] or
    /// [`CapabilityError::Execution`] when the capability rejects the call.
    fn invoke(&self, arguments: Value) -> CapabilityResult<Value>;
}

impl<F> Capability for F
where
    F: Send + Sync + Fn(Value) -> CapabilityResult<Value>,
{
    fn invoke(&self, arguments: Value) -> CapabilityResult<Value> {
        (self)(arguments)
    }
}

/// Handle returned by the registry for direct invocation.
#[derive(Clone)]
pub struct CapabilityHandle {
    descriptor: CapabilityDescriptor,
    executor: Arc<dyn Capability>,
}

impl std::fmt::Debug for CapabilityHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityHandle")
            .field("name", &self.descriptor.name())
            .finish_non_exhaustive()
    }
}

impl CapabilityHandle {
    /// Returns the associated descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    /// Validates the arguments against the descriptor and executes the
    /// underlying capability.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::InvalidArguments`] when the arguments do not
    /// match the declared input shape, or propagates the error returned by the
    /// implementation unchanged.
    pub fn invoke(&self, arguments: Value) -> CapabilityResult<Value> {
        self.descriptor
            .validate_arguments(&arguments)
            .map_err(|err| match err {
                bridge_primitives::Error::InvalidArguments { reason } => {
                    CapabilityError::InvalidArguments { reason }
                }
                other => CapabilityError::Descriptor(other),
            })?;
        self.executor.invoke(arguments)
    }
}

/// Registry that owns capability implementations keyed by name.
///
/// Listing order is the lexicographic order of the names, so discovery output
/// is deterministic regardless of registration order.
#[derive(Default)]
pub struct CapabilityRegistry {
    inner: RwLock<BTreeMap<CapabilityName, CapabilityHandle>>,
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("registered", &self.names())
            .finish()
    }
}

impl CapabilityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // Writers never leave the map half-updated, so a poisoned lock still
    // guards a consistent map.
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<CapabilityName, CapabilityHandle>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<CapabilityName, CapabilityHandle>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a capability implementation.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Duplicate`] if the name is already present.
    /// The previously registered capability is left untouched.
    pub fn register<C>(&self, descriptor: CapabilityDescriptor, capability: C) -> CapabilityResult<()>
    where
        C: Capability + 'static,
    {
        self.register_shared(descriptor, Arc::new(capability))
    }

    /// Registers a capability that is already shared behind an [`Arc`].
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Duplicate`] if the name is already present.
    pub fn register_shared(
        &self,
        descriptor: CapabilityDescriptor,
        capability: Arc<dyn Capability>,
    ) -> CapabilityResult<()> {
        let mut inner = self.write();
        let name = descriptor.name().clone();
        if inner.contains_key(&name) {
            return Err(CapabilityError::Duplicate {
                name: name.into(),
            });
        }

        debug!(capability = %name, "registered capability");
        inner.insert(
            name,
            CapabilityHandle {
                descriptor,
                executor: capability,
            },
        );

        Ok(())
    }

    /// Returns a handle to the capability matching the supplied name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<CapabilityHandle> {
        self.read().get(name).cloned()
    }

    /// Returns `true` when a capability with the supplied name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Invokes a registered capability.
    ///
    /// The registry lock is released before the capability runs, so a slow
    /// capability never blocks registration or other dispatches.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Unknown`] when the capability is not found,
    /// [`CapabilityError::InvalidArguments`] when the arguments fail
    /// validation, or propagates the capability's own error unchanged.
    pub fn call(&self, name: &str, arguments: Value) -> CapabilityResult<Value> {
        let handle = self.get(name).ok_or_else(|| CapabilityError::Unknown {
            name: name.to_owned(),
        })?;

        debug!(capability = name, "dispatching capability");
        let result = handle.invoke(arguments);
        if let Err(err) = &result {
            debug!(capability = name, error = %err, "capability call failed");
        }
        result
    }

    /// Lists the descriptors of all registered capabilities, ordered by name.
    #[must_use]
    pub fn list(&self) -> Vec<CapabilityDescriptor> {
        self.read()
            .values()
            .map(|handle| handle.descriptor.clone())
            .collect()
    }

    /// Lists the registered names, ordered.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.read().keys().map(ToString::to_string).collect()
    }

    /// Builds the discovery catalog.
    #[must_use]
    pub fn catalog(&self) -> Catalog {
        let descriptors = self.list();
        Catalog::from_descriptors(&descriptors)
    }

    /// Returns the number of registered capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

/// Errors produced by capability registration and invocation.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// Descriptor construction failed validation.
    #[error(transparent)]
    Descriptor(#[from] bridge_primitives::Error),

    /// Capability name collided with an existing registration.
    #[error("capability `{name}` is already registered")]
    Duplicate {
        /// Name of the offending capability.
        name: String,
    },

    /// Requested capability does not exist.
    #[error("capability `{name}` is not registered")]
    Unknown {
        /// Name of the missing capability.
        name: String,
    },

    /// Arguments were rejected before or during execution.
    #[error("invalid arguments: {reason}")]
    InvalidArguments {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Capability execution failed.
    #[error("{reason}")]
    Execution {
        /// Human-readable error returned by the capability implementation.
        reason: String,
    },
}

impl CapabilityError {
    /// Creates an execution error from the supplied reason.
    #[must_use]
    pub fn execution(reason: impl Into<String>) -> Self {
        Self::Execution {
            reason: reason.into(),
        }
    }

    /// Creates an argument error from the supplied reason.
    #[must_use]
    pub fn invalid_arguments(reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            reason: reason.into(),
        }
    }

    /// Returns `true` for dispatch failures, where no capability ran.
    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown { .. })
    }
}
