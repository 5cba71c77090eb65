//! Unsigned LEB128 varints.
//!
//! Every count, length, and string-table index in the container is written
//! this way: 7 value bits per byte, least-significant group first, high bit
//! set while more bytes follow. All encoded quantities are non-negative and
//! bounded well under 2^32, but decoding goes through `u64` so large counts
//! never wrap.

use crate::error::DecodeError;

/// Append the LEB128 encoding of `value` to `buf`.
///
/// Zero encodes as exactly one `0x00` byte.
pub fn encode_into(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

/// Decode one varint starting at `offset`, returning `(value, bytes_consumed)`.
///
/// Fails with [`DecodeError::TruncatedStream`] if the slice ends before a
/// byte with the continuation bit clear is found.
pub fn decode(bytes: &[u8], offset: usize) -> Result<(u64, usize), DecodeError> {
    let mut value: u64 = 0;
    let mut shift: u32 = 0;
    let mut pos = offset;
    loop {
        let byte = *bytes
            .get(pos)
            .ok_or(DecodeError::TruncatedStream { offset: pos })?;
        // Streams longer than 10 bytes are malformed; excess high bits are
        // ignored rather than allowed to overflow the shift.
        if shift < u64::BITS {
            value |= u64::from(byte & 0x7F) << shift;
        }
        pos += 1;
        if byte & 0x80 == 0 {
            return Ok((value, pos - offset));
        }
        shift += 7;
    }
}
