//! Wire codec for the broker's MQTT 3.1.1 subset
//!
//! The free functions here are the field-level building blocks: the
//! remaining-length integer and length-prefixed UTF-8 strings. [`Encoder`]
//! and [`Decoder`] work on whole packets, [`PacketReader`] pulls packets off
//! an async stream.

mod decode;
mod encode;
mod reader;

#[cfg(test)]
mod tests;

pub use decode::Decoder;
pub use encode::Encoder;
pub use reader::{FixedHeader, Frame, PacketReader, ReadError};

use bytes::{BufMut, BytesMut};

use crate::protocol::{DecodeError, EncodeError};

/// Largest value the 4-byte remaining-length field can carry
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Remaining-length bytes never exceed this
const MAX_LENGTH_BYTES: usize = 4;

/// Decode a remaining-length integer from the start of `buf`.
///
/// Each byte contributes its low 7 bits, least significant group first;
/// a set high bit means another byte follows. Returns the value and the
/// number of bytes it occupied.
pub fn read_variable_int(buf: &[u8]) -> Result<(u32, usize), DecodeError> {
    let mut value: u32 = 0;

    for (i, byte) in buf.iter().take(MAX_LENGTH_BYTES).enumerate() {
        value |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }

    if buf.len() >= MAX_LENGTH_BYTES {
        // Fourth byte still had the continuation bit
        Err(DecodeError::InvalidRemainingLength)
    } else {
        Err(DecodeError::InsufficientData)
    }
}

/// Append `value` as a remaining-length integer using the fewest bytes.
/// Returns how many bytes were written.
pub fn write_variable_int(buf: &mut BytesMut, value: u32) -> Result<usize, EncodeError> {
    if value as usize > MAX_REMAINING_LENGTH {
        return Err(EncodeError::PacketTooLarge);
    }

    let mut rest = value;
    let mut written = 0;
    loop {
        let group = (rest & 0x7F) as u8;
        rest >>= 7;
        written += 1;
        if rest == 0 {
            buf.put_u8(group);
            return Ok(written);
        }
        buf.put_u8(group | 0x80);
    }
}

/// Encoded size of `value` as a remaining-length integer
pub fn variable_int_len(value: u32) -> usize {
    match value {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        _ => 4,
    }
}

/// Big-endian u16 at the start of `buf` (packet identifiers, string lengths)
pub fn read_u16(buf: &[u8]) -> Result<u16, DecodeError> {
    match buf {
        [hi, lo, ..] => Ok(u16::from_be_bytes([*hi, *lo])),
        _ => Err(DecodeError::InsufficientData),
    }
}

/// Length-prefixed UTF-8 string at the start of `buf`.
///
/// Returns the string and the bytes consumed, prefix included.
pub fn read_string(buf: &[u8]) -> Result<(&str, usize), DecodeError> {
    let end = 2 + read_u16(buf)? as usize;
    let bytes = buf.get(2..end).ok_or(DecodeError::InsufficientData)?;
    let s = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?;
    Ok((s, end))
}

/// Append `s` with its 2-byte length prefix
pub fn write_string(buf: &mut BytesMut, s: &str) -> Result<(), EncodeError> {
    let len = u16::try_from(s.len()).map_err(|_| EncodeError::StringTooLong)?;
    buf.put_u16(len);
    buf.put_slice(s.as_bytes());
    Ok(())
}
