use std::sync::Arc;

use bridge_tools::{CapabilityError, CapabilityRegistry};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{trace, warn};

use crate::abi::{self, Status};
use crate::memory::{self, GuestMemory, GuestSpan, MemoryError};

/// Result alias for bridge calls.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Per-call size limits applied before any guest bytes are copied.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BridgeLimits {
    /// Largest accepted `log` message.
    pub max_log_bytes: u32,
    /// Largest accepted state key.
    pub max_key_bytes: u32,
    /// Largest accepted state value.
    pub max_value_bytes: u32,
}

impl Default for BridgeLimits {
    fn default() -> Self {
        Self {
            max_log_bytes: 64 * 1024,
            max_key_bytes: 4 * 1024,
            max_value_bytes: 1024 * 1024,
        }
    }
}

/// Failures of a single host call. The guest only ever sees
/// [`Status::Failure`]; the detail is logged on the host.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Guest memory access failed.
    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// A span exceeded its configured limit.
    #[error("{what} of {len} bytes exceeds the {limit} byte limit")]
    TooLarge {
        /// Which argument was too large.
        what: &'static str,
        /// Requested length.
        len: u32,
        /// Configured limit.
        limit: u32,
    },

    /// The encoded result does not fit the guest's buffer.
    #[error("result of {required} bytes does not fit a {capacity} byte buffer")]
    BufferTooSmall {
        /// Bytes needed.
        required: u32,
        /// Bytes the guest offered.
        capacity: u32,
    },

    /// The capability rejected the call or was not registered.
    #[error("capability `{capability}` failed: {source}")]
    Capability {
        /// Capability that was dispatched to.
        capability: &'static str,
        /// Error returned by the registry.
        #[source]
        source: CapabilityError,
    },

    /// The result could not be encoded.
    #[error("cannot encode result: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Translates raw guest spans into registry calls.
///
/// The bridge holds a shared reference to the registry and never retains any
/// guest memory between calls.
#[derive(Clone, Debug)]
pub struct HostBridge {
    registry: Arc<CapabilityRegistry>,
    limits: BridgeLimits,
}

impl HostBridge {
    /// Creates a bridge dispatching into `registry` with default limits.
    #[must_use]
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self::with_limits(registry, BridgeLimits::default())
    }

    /// Creates a bridge with explicit limits.
    #[must_use]
    pub fn with_limits(registry: Arc<CapabilityRegistry>, limits: BridgeLimits) -> Self {
        Self { registry, limits }
    }

    /// Returns the registry the bridge dispatches into.
    #[must_use]
    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Returns the active limits.
    #[must_use]
    pub fn limits(&self) -> BridgeLimits {
        self.limits
    }

    /// `log(ptr, len) -> status`
    pub fn log<M: GuestMemory + ?Sized>(&self, memory: &M, ptr: u32, len: u32) -> u32 {
        status(abi::LOG, self.try_log(memory, GuestSpan::new(ptr, len)))
    }

    /// `state_get(key_ptr, key_len, result_ptr) -> status`
    pub fn state_get<M: GuestMemory + ?Sized>(
        &self,
        memory: &mut M,
        key_ptr: u32,
        key_len: u32,
        result_ptr: u32,
    ) -> u32 {
        status(
            abi::STATE_GET,
            self.try_state_get(memory, GuestSpan::new(key_ptr, key_len), result_ptr),
        )
    }

    /// `state_set(key_ptr, key_len, value_ptr, value_len) -> status`
    pub fn state_set<M: GuestMemory + ?Sized>(
        &self,
        memory: &M,
        key_ptr: u32,
        key_len: u32,
        value_ptr: u32,
        value_len: u32,
    ) -> u32 {
        status(
            abi::STATE_SET,
            self.try_state_set(
                memory,
                GuestSpan::new(key_ptr, key_len),
                GuestSpan::new(value_ptr, value_len),
            ),
        )
    }

    /// Reads a message and forwards it to the `log` capability.
    ///
    /// # Errors
    ///
    /// Fails on out-of-bounds or oversized spans, invalid UTF-8, or when the
    /// capability rejects the call.
    pub fn try_log<M: GuestMemory + ?Sized>(&self, memory: &M, message: GuestSpan) -> BridgeResult<()> {
        let message = read_limited(memory, message, "log message", self.limits.max_log_bytes)?;
        self.dispatch(abi::LOG, json!({ "message": message }))?;
        Ok(())
    }

    /// Reads a key, dispatches `state_get` and writes the compact JSON result
    /// into the buffer at `result_ptr`. Returns the number of payload bytes
    /// written.
    ///
    /// # Errors
    ///
    /// Fails on any invalid span, a misaligned or out-of-bounds result buffer,
    /// a dispatch failure, or [`BridgeError::BufferTooSmall`] after recording
    /// the required length in the header.
    pub fn try_state_get<M: GuestMemory + ?Sized>(
        &self,
        memory: &mut M,
        key: GuestSpan,
        result_ptr: u32,
    ) -> BridgeResult<u32> {
        let capacity = memory::read_u32(memory, result_ptr)?;
        memory::check_region(
            memory,
            result_ptr,
            u64::from(abi::RESULT_HEADER_LEN) + u64::from(capacity),
        )?;

        let key = read_limited(memory, key, "state key", self.limits.max_key_bytes)?;
        let value = self.dispatch(abi::STATE_GET, json!({ "key": key }))?;
        let encoded = serde_json::to_vec(&value)?;
        let required = u32::try_from(encoded.len()).unwrap_or(u32::MAX);

        // Region already validated, so these offsets cannot overflow.
        let length_at = result_ptr + abi::RESULT_LENGTH_OFFSET;
        memory::write_u32(memory, length_at, required)?;
        if required > capacity {
            return Err(BridgeError::BufferTooSmall { required, capacity });
        }
        memory::write_bytes(memory, result_ptr + abi::RESULT_HEADER_LEN, &encoded)?;
        Ok(required)
    }

    /// Reads a key and a value and dispatches `state_set`.
    ///
    /// # Errors
    ///
    /// Fails on any invalid or oversized span or a dispatch failure.
    pub fn try_state_set<M: GuestMemory + ?Sized>(
        &self,
        memory: &M,
        key: GuestSpan,
        value: GuestSpan,
    ) -> BridgeResult<()> {
        let key = read_limited(memory, key, "state key", self.limits.max_key_bytes)?;
        let value = read_limited(memory, value, "state value", self.limits.max_value_bytes)?;
        self.dispatch(abi::STATE_SET, json!({ "key": key, "value": value }))?;
        Ok(())
    }

    fn dispatch(&self, capability: &'static str, arguments: Value) -> BridgeResult<Value> {
        self.registry
            .call(capability, arguments)
            .map_err(|source| BridgeError::Capability { capability, source })
    }
}

fn read_limited<M: GuestMemory + ?Sized>(
    memory: &M,
    span: GuestSpan,
    what: &'static str,
    limit: u32,
) -> BridgeResult<String> {
    if span.len > limit {
        return Err(BridgeError::TooLarge {
            what,
            len: span.len,
            limit,
        });
    }
    Ok(memory::read_str(memory, span)?)
}

fn status<T>(entry: &'static str, result: BridgeResult<T>) -> u32 {
    match result {
        Ok(_) => {
            trace!(entry, "host call succeeded");
            Status::Success.into()
        }
        Err(err) => {
            warn!(entry, error = %err, "host call failed");
            Status::Failure.into()
        }
    }
}
