//! Raw layout primitives.
//!
//! Every byte-level reinterpretation the codecs perform goes through the
//! handful of functions here: slice casts, the alignment test, the
//! per-element byte swap and the in-place byte shift.

use bytemuck::Pod;

use crate::error::{Result, SerialError};

/// Byte order of the host the codec pretends to run on.
///
/// The wire is always little-endian. Codecs carry an explicit host order so
/// the big-endian path can be exercised on little-endian machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// Byte order of the machine this was compiled for.
    pub const NATIVE: ByteOrder = if cfg!(target_endian = "big") {
        ByteOrder::Big
    } else {
        ByteOrder::Little
    };

    /// Whether memory layout must be flipped to reach wire layout.
    pub fn needs_swap(self) -> bool {
        self == ByteOrder::Big
    }
}

impl Default for ByteOrder {
    fn default() -> Self {
        Self::NATIVE
    }
}

/// View a slice of unmanaged values as its raw bytes.
pub fn as_bytes<T: Pod>(values: &[T]) -> &[u8] {
    bytemuck::cast_slice(values)
}

/// Mutable raw-byte view of a slice of unmanaged values.
pub fn as_bytes_mut<T: Pod>(values: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(values)
}

/// Whether `bytes` starts at an address that is a multiple of `align`.
pub fn is_aligned(bytes: &[u8], align: usize) -> bool {
    align <= 1 || (bytes.as_ptr() as usize) % align == 0
}

/// Whether `bytes` can be reinterpreted as a `T` in place.
pub fn is_aligned_for<T>(bytes: &[u8]) -> bool {
    is_aligned(bytes, std::mem::align_of::<T>())
}

/// Reverse the bytes of every `element_size`-wide element in `bytes`.
///
/// This is the big-endian fixup: bytes are swapped in pairs around each
/// element's centre.
pub fn swap_element_bytes(bytes: &mut [u8], element_size: usize) {
    if element_size < 2 {
        return;
    }
    for element in bytes.chunks_exact_mut(element_size) {
        element.reverse();
    }
}

/// Move `len` bytes starting at `from` so they start at `to`.
///
/// Overlapping ranges are handled; both ranges must lie inside `buf`.
pub fn shift_bytes(buf: &mut [u8], from: usize, len: usize, to: usize) -> Result<()> {
    let end = from.max(to).saturating_add(len);
    if end > buf.len() {
        return Err(SerialError::BufferOverflow {
            needed: end,
            available: buf.len(),
        });
    }
    if from != to && len > 0 {
        buf.copy_within(from..from + len, to);
    }
    Ok(())
}
