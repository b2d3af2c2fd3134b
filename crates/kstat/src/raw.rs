//! Raw byte access to kstat data.
//!
//! Provides the owned [`RawBlob`] copy of a kstat's backing bytes, the
//! [`RawLayout`] marker for plain structs that raw bytes may be copied into,
//! and [`extract_fixed_string`] for fixed-length C character fields.

use std::mem::size_of;

use crate::error::KstatError;

/// Marker for fixed-layout plain data types.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` (or a primitive/array of such) and
/// every bit pattern of `size_of::<Self>()` bytes must be a valid value.
/// That rules out references, pointers, `bool`, `char` and enums.
pub unsafe trait RawLayout: Copy + 'static {}

unsafe impl RawLayout for u8 {}
unsafe impl RawLayout for i8 {}
unsafe impl RawLayout for u16 {}
unsafe impl RawLayout for i16 {}
unsafe impl RawLayout for u32 {}
unsafe impl RawLayout for i32 {}
unsafe impl RawLayout for u64 {}
unsafe impl RawLayout for i64 {}
unsafe impl<T: RawLayout, const N: usize> RawLayout for [T; N] {}

/// Copy of a kstat's backing bytes as of its current snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlob {
    /// The data bytes, exactly `ks_data_size` long.
    pub data: Vec<u8>,
    /// Element count reported by the backend (`ks_ndata`).
    ///
    /// Its meaning depends on the kind: 1 for IO kstats, the number of
    /// records for named kstats, and the byte length for raw kstats.
    pub ndata: u64,
    /// Snapshot time of the data, in nanoseconds since an arbitrary point.
    pub snaptime: i64,
}

impl RawBlob {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decodes the blob into `T`, which must be exactly the blob's size.
    pub fn decode<T: RawLayout>(&self) -> Result<T, KstatError> {
        read_layout(&self.data)
    }
}

/// Returns the prefix of `buf` up to (excluding) the first zero byte, or
/// the whole of `buf` if it holds no zero byte.
///
/// Only the bytes of `buf` are examined, so a sub-slice shorter than the
/// full field is fine.
pub fn extract_fixed_bytes(buf: &[u8]) -> &[u8] {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    &buf[..end]
}

/// [`extract_fixed_bytes`] as a `String`.
///
/// Meant for identifiers such as module, class and protocol names. Bytes
/// that are not valid UTF-8 become U+FFFD; callers that need the exact
/// contents use [`extract_fixed_bytes`].
pub fn extract_fixed_string(buf: &[u8]) -> String {
    String::from_utf8_lossy(extract_fixed_bytes(buf)).into_owned()
}

/// Copies `src` into `dest` after checking that the sizes are equal.
///
/// Nothing is written when the sizes differ.
pub fn copy_into<T: RawLayout>(src: &[u8], dest: &mut T) -> Result<(), KstatError> {
    *dest = read_layout(src)?;
    Ok(())
}

/// Reads a `T` out of `src`, which must be exactly `size_of::<T>()` bytes.
pub fn read_layout<T: RawLayout>(src: &[u8]) -> Result<T, KstatError> {
    let expected = src.len();
    let actual = size_of::<T>();
    if expected != actual {
        return Err(KstatError::SizeMismatch { expected, actual });
    }

    // SAFETY:
    // - The check above ensures src holds exactly size_of::<T>() bytes
    // - read_unaligned handles any alignment of the kstat data buffer
    // - RawLayout guarantees every bit pattern is a valid T
    Ok(unsafe { std::ptr::read_unaligned(src.as_ptr() as *const T) })
}
