//! Names, constants and status codes shared with guest modules.
//!
//! ```text
//! (import "env" "log"            (func (param i32 i32) (result i32)))
//! (import "env" "state_get"      (func (param i32 i32 i32) (result i32)))
//! (import "env" "state_set"      (func (param i32 i32 i32 i32) (result i32)))
//! (import "env" "bridge_version" (func (result i32)))
//! ```
//!
//! Results are written into a guest-owned buffer. `result_ptr` must be
//! 4-byte aligned and point at:
//!
//! ```text
//! +0  u32 LE  capacity   written by the guest
//! +4  u32 LE  length     written by the host
//! +8  [u8; capacity]     payload, compact JSON
//! ```
//!
//! When the payload does not fit, the host stores the required length, leaves
//! the payload bytes untouched and returns [`Status::Failure`].

/// Import module every host function lives in.
pub const MODULE: &str = "env";

/// `log(ptr, len) -> status`
pub const LOG: &str = "log";

/// `state_get(key_ptr, key_len, result_ptr) -> status`
pub const STATE_GET: &str = "state_get";

/// `state_set(key_ptr, key_len, value_ptr, value_len) -> status`
pub const STATE_SET: &str = "state_set";

/// `bridge_version() -> u32`
pub const BRIDGE_VERSION: &str = "bridge_version";

/// Version of the calling convention described in this module.
pub const ABI_VERSION: u32 = 1;

/// Size of the result buffer header in bytes.
pub const RESULT_HEADER_LEN: u32 = 8;

/// Required alignment of `result_ptr`.
pub const RESULT_ALIGN: u32 = 4;

/// Offset of the `length` field inside the result header.
pub const RESULT_LENGTH_OFFSET: u32 = 4;

/// Status word returned to the guest.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum Status {
    /// The call failed; the guest learns nothing more.
    Failure = 0,
    /// The call succeeded.
    Success = 1,
}

impl From<Status> for u32 {
    fn from(status: Status) -> Self {
        status as Self
    }
}

impl Status {
    /// Interprets a raw status word; any non-zero value is success.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        if raw == 0 { Self::Failure } else { Self::Success }
    }
}
