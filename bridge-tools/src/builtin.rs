//! Installs the shipped capability sets into a registry.

use std::sync::Arc;

use crate::log::LogCapability;
use crate::mailbox::Mailbox;
use crate::registry::{Capability, CapabilityRegistry, CapabilityResult};
use crate::state::StateStore;
use crate::{array, echo};

/// Registers `log`, `state_get` and `state_set`.
///
/// The caller keeps its own handles to `state` and `log` so it can inspect
/// what guests and remote callers did.
///
/// # Errors
///
/// Returns [`crate::CapabilityError::Duplicate`] if any built-in name is
/// already registered.
pub fn install_core(
    registry: &CapabilityRegistry,
    state: &Arc<StateStore>,
    log: &Arc<LogCapability>,
) -> CapabilityResult<()> {
    registry.register_shared(LogCapability::descriptor()?, Arc::clone(log) as Arc<dyn Capability>)?;
    StateStore::register(state, registry)
}

/// Registers the demo business capabilities: echo, array math and, when a
/// mailbox is supplied, the email tools.
///
/// # Errors
///
/// Returns [`crate::CapabilityError::Duplicate`] on name collisions.
pub fn install_demo(
    registry: &CapabilityRegistry,
    mailbox: Option<&Arc<Mailbox>>,
) -> CapabilityResult<()> {
    echo::register(registry)?;
    array::register(registry)?;
    if let Some(mailbox) = mailbox {
        Mailbox::register(mailbox, registry)?;
    }
    Ok(())
}
