//! Byte-level encoding of numeric payloads exchanged between ranks.

use crate::tape_error::TapeError;
use bytemuck::Pod;

/// View a slice of plain-old-data values as bytes.
#[inline]
pub fn cast_to_bytes<T: Pod>(vals: &[T]) -> &[u8] {
    bytemuck::cast_slice(vals)
}

/// Decode a byte payload back into values.
///
/// Copies into a freshly allocated buffer, so the input's alignment does not
/// matter.
pub fn cast_from_bytes<T: Pod>(bytes: &[u8]) -> Result<Vec<T>, TapeError> {
    let width = std::mem::size_of::<T>();
    if width == 0 {
        return Err(TapeError::Comm("zero-sized wire type".into()));
    }
    if bytes.len() % width != 0 {
        return Err(TapeError::Comm(format!(
            "payload of {} bytes is not a whole number of {width}-byte values",
            bytes.len()
        )));
    }
    let mut out = vec![T::zeroed(); bytes.len() / width];
    bytemuck::cast_slice_mut::<T, u8>(&mut out).copy_from_slice(bytes);
    Ok(out)
}
