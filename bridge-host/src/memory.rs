//! Bounds-checked access to guest linear memory.
//!
//! Every host entry point reads and writes guest memory exclusively through
//! the functions in this module. Spans are re-validated against the current
//! memory length on every call, because the guest may grow its memory between
//! calls.

use std::ops::Range;

use thiserror::Error;

/// Byte-addressable view of a guest's linear memory.
pub trait GuestMemory {
    /// Returns the whole memory.
    fn bytes(&self) -> &[u8];

    /// Returns the whole memory for writing.
    fn bytes_mut(&mut self) -> &mut [u8];
}

impl GuestMemory for [u8] {
    fn bytes(&self) -> &[u8] {
        self
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        self
    }
}

impl GuestMemory for Vec<u8> {
    fn bytes(&self) -> &[u8] {
        self
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        self
    }
}

/// Errors raised by guest memory access.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// The span does not lie entirely inside guest memory.
    #[error("span {offset}+{len} is outside guest memory of {memory_len} bytes")]
    OutOfBounds {
        /// Start offset requested by the guest.
        offset: u32,
        /// Length requested by the guest.
        len: u64,
        /// Guest memory size at the time of the call.
        memory_len: usize,
    },

    /// The offset does not meet the required alignment.
    #[error("offset {offset} is not {align}-byte aligned")]
    Misaligned {
        /// Offending offset.
        offset: u32,
        /// Required alignment.
        align: u32,
    },

    /// The bytes are not valid UTF-8.
    #[error("span {offset}+{len} is not valid UTF-8: {reason}")]
    InvalidUtf8 {
        /// Start offset of the span.
        offset: u32,
        /// Length of the span.
        len: u32,
        /// Decoder diagnostic.
        reason: String,
    },
}

/// Result alias for memory access.
pub type MemoryResult<T> = Result<T, MemoryError>;

/// A guest-supplied `(offset, length)` pair.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GuestSpan {
    /// Start offset in guest memory.
    pub offset: u32,
    /// Number of bytes.
    pub len: u32,
}

impl GuestSpan {
    /// Creates a span.
    #[must_use]
    pub const fn new(offset: u32, len: u32) -> Self {
        Self { offset, len }
    }

    /// Converts the span into a host range, checking it against `memory_len`.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::OutOfBounds`] when `offset + len` overflows or
    /// exceeds `memory_len`.
    pub fn range(self, memory_len: usize) -> MemoryResult<Range<usize>> {
        checked_range(self.offset, u64::from(self.len), memory_len)
    }
}

// The only place guest offsets become host indices.
fn checked_range(offset: u32, len: u64, memory_len: usize) -> MemoryResult<Range<usize>> {
    let out_of_bounds = || MemoryError::OutOfBounds {
        offset,
        len,
        memory_len,
    };
    let start = usize::try_from(offset).map_err(|_| out_of_bounds())?;
    let len = usize::try_from(len).map_err(|_| out_of_bounds())?;
    let end = start.checked_add(len).ok_or_else(out_of_bounds)?;
    if end > memory_len {
        return Err(out_of_bounds());
    }
    Ok(start..end)
}

/// Checks that `offset .. offset + len` lies inside memory without copying.
///
/// `len` is 64-bit so callers can validate a header plus a full 32-bit
/// payload without overflowing.
///
/// # Errors
///
/// Returns [`MemoryError::OutOfBounds`] when the region does not fit.
pub fn check_region<M: GuestMemory + ?Sized>(
    memory: &M,
    offset: u32,
    len: u64,
) -> MemoryResult<()> {
    checked_range(offset, len, memory.bytes().len()).map(|_| ())
}

/// Copies the bytes covered by `span` out of guest memory.
///
/// # Errors
///
/// Returns [`MemoryError::OutOfBounds`] when the span does not fit.
pub fn read_bytes<M: GuestMemory + ?Sized>(memory: &M, span: GuestSpan) -> MemoryResult<Vec<u8>> {
    let bytes = memory.bytes();
    let range = span.range(bytes.len())?;
    Ok(bytes[range].to_vec())
}

/// Copies the bytes covered by `span` and decodes them as UTF-8.
///
/// # Errors
///
/// Returns [`MemoryError::OutOfBounds`] or [`MemoryError::InvalidUtf8`].
pub fn read_str<M: GuestMemory + ?Sized>(memory: &M, span: GuestSpan) -> MemoryResult<String> {
    String::from_utf8(read_bytes(memory, span)?).map_err(|err| MemoryError::InvalidUtf8 {
        offset: span.offset,
        len: span.len,
        reason: err.utf8_error().to_string(),
    })
}

/// Reads a little-endian `u32` at a 4-byte aligned offset.
///
/// # Errors
///
/// Returns [`MemoryError::Misaligned`] or [`MemoryError::OutOfBounds`].
pub fn read_u32<M: GuestMemory + ?Sized>(memory: &M, offset: u32) -> MemoryResult<u32> {
    check_aligned(offset)?;
    let bytes = memory.bytes();
    let range = GuestSpan::new(offset, 4).range(bytes.len())?;
    let mut word = [0_u8; 4];
    word.copy_from_slice(&bytes[range]);
    Ok(u32::from_le_bytes(word))
}

/// Copies `data` into guest memory at `offset`.
///
/// Nothing is written unless the whole destination fits.
///
/// # Errors
///
/// Returns [`MemoryError::OutOfBounds`] when the destination does not fit.
pub fn write_bytes<M: GuestMemory + ?Sized>(
    memory: &mut M,
    offset: u32,
    data: &[u8],
) -> MemoryResult<()> {
    let bytes = memory.bytes_mut();
    let len = u64::try_from(data.len()).unwrap_or(u64::MAX);
    let range = checked_range(offset, len, bytes.len())?;
    bytes[range].copy_from_slice(data);
    Ok(())
}

/// Writes a little-endian `u32` at a 4-byte aligned offset.
///
/// # Errors
///
/// Returns [`MemoryError::Misaligned`] or [`MemoryError::OutOfBounds`].
pub fn write_u32<M: GuestMemory + ?Sized>(
    memory: &mut M,
    offset: u32,
    value: u32,
) -> MemoryResult<()> {
    check_aligned(offset)?;
    write_bytes(memory, offset, &value.to_le_bytes())
}

fn check_aligned(offset: u32) -> MemoryResult<()> {
    if offset % 4 == 0 {
        Ok(())
    } else {
        Err(MemoryError::Misaligned { offset, align: 4 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> Vec<u8> {
        let mut memory = vec![0_u8; 64];
        memory[16..21].copy_from_slice(b"hello");
        memory
    }

    #[test]
    fn reads_exactly_the_span() {
        let memory = memory();
        assert_eq!(read_str(&memory, GuestSpan::new(16, 5)).unwrap(), "hello");
        assert_eq!(read_str(&memory, GuestSpan::new(17, 3)).unwrap(), "ell");
        assert_eq!(read_bytes(&memory, GuestSpan::new(64, 0)).unwrap(), b"");
    }

    #[test]
    fn rejects_spans_past_the_end() {
        let memory = memory();
        for span in [
            GuestSpan::new(60, 5),
            GuestSpan::new(64, 1),
            GuestSpan::new(65, 0),
            GuestSpan::new(u32::MAX, 1),
            GuestSpan::new(1, u32::MAX),
            GuestSpan::new(u32::MAX, u32::MAX),
        ] {
            let err = read_bytes(&memory, span).expect_err("out of bounds");
            assert!(matches!(err, MemoryError::OutOfBounds { .. }), "{span:?}");
        }
    }

    #[test]
    fn rejects_invalid_utf8() {
        let mut memory = memory();
        memory[0..2].copy_from_slice(&[0xC3, 0x28]);
        let err = read_str(&memory, GuestSpan::new(0, 2)).expect_err("invalid utf-8");
        assert!(matches!(err, MemoryError::InvalidUtf8 { .. }));
    }

    #[test]
    fn words_are_little_endian_and_aligned() {
        let mut memory = memory();
        write_u32(&mut memory, 8, 0x0102_0304).unwrap();
        assert_eq!(&memory[8..12], &[4, 3, 2, 1]);
        assert_eq!(read_u32(&memory, 8).unwrap(), 0x0102_0304);

        assert_eq!(
            read_u32(&memory, 6).expect_err("misaligned"),
            MemoryError::Misaligned { offset: 6, align: 4 }
        );
        assert!(matches!(
            write_u32(&mut memory, 64, 1).expect_err("past the end"),
            MemoryError::OutOfBounds { .. }
        ));
    }

    #[test]
    fn partial_writes_never_happen() {
        let mut memory = memory();
        let before = memory.clone();
        assert!(write_bytes(&mut memory, 62, b"abcd").is_err());
        assert_eq!(memory, before);
    }

    #[test]
    fn region_checks_do_not_overflow() {
        let memory = memory();
        assert!(check_region(&memory, 0, 64).is_ok());
        assert!(check_region(&memory, 56, 8 + u64::from(u32::MAX)).is_err());
    }
}
