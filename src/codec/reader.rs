//! Stream packet reader
//!
//! Reads one fixed header and its body at a time from an async byte stream.
//! There is no resynchronization: once a read fails the stream is unusable.

use std::fmt;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::{read_variable_int, Decoder};
use crate::protocol::{DecodeError, Packet};

/// Error while reading a packet from a stream
#[derive(Debug)]
pub enum ReadError {
    /// Transport failure, including EOF inside a packet
    Io(std::io::Error),
    /// Bytes were read but do not form a valid packet
    Decode(DecodeError),
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadError::Io(e) => write!(f, "IO error: {}", e),
            ReadError::Decode(e) => write!(f, "Decode error: {}", e),
        }
    }
}

impl std::error::Error for ReadError {}

impl From<std::io::Error> for ReadError {
    fn from(e: std::io::Error) -> Self {
        ReadError::Io(e)
    }
}

impl From<DecodeError> for ReadError {
    fn from(e: DecodeError) -> Self {
        ReadError::Decode(e)
    }
}

/// Decoded fixed header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    /// High nibble of the first byte
    pub packet_type: u8,
    /// Low nibble of the first byte
    pub flags: u8,
    pub remaining_length: u32,
}

/// A raw packet: fixed header plus exactly `remaining_length` body bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FixedHeader,
    pub body: Bytes,
}

/// Reads frames from an async stream
pub struct PacketReader<R> {
    reader: R,
    decoder: Decoder,
}

impl<R> PacketReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            decoder: Decoder::new(),
        }
    }

    pub fn with_decoder(reader: R, decoder: Decoder) -> Self {
        Self { reader, decoder }
    }

    /// Read one frame.
    ///
    /// Returns `Ok(None)` when the peer closed the stream at a packet
    /// boundary. EOF anywhere else is an `UnexpectedEof` I/O error.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, ReadError> {
        let mut first = [0u8; 1];
        if self.reader.read(&mut first).await? == 0 {
            return Ok(None);
        }

        // Remaining length: up to 4 bytes, high bit means another follows
        let mut len_buf = [0u8; 4];
        let mut len_bytes = 0;
        loop {
            if len_bytes == len_buf.len() {
                return Err(DecodeError::InvalidRemainingLength.into());
            }
            let byte = self.reader.read_u8().await?;
            len_buf[len_bytes] = byte;
            len_bytes += 1;
            if byte & 0x80 == 0 {
                break;
            }
        }
        let (remaining_length, _) = read_variable_int(&len_buf[..len_bytes])?;

        if remaining_length as usize > self.decoder.max_packet_size() {
            return Err(DecodeError::PacketTooLarge.into());
        }

        let mut body = BytesMut::zeroed(remaining_length as usize);
        self.reader.read_exact(&mut body).await?;

        Ok(Some(Frame {
            header: FixedHeader {
                packet_type: first[0] >> 4,
                flags: first[0] & 0x0F,
                remaining_length,
            },
            body: body.freeze(),
        }))
    }

    /// Read one frame and decode it into a packet
    pub async fn read_packet(&mut self) -> Result<Option<Packet>, ReadError> {
        let Some(frame) = self.read_frame().await? else {
            return Ok(None);
        };
        let packet =
            self.decoder
                .decode_body(frame.header.packet_type, frame.header.flags, frame.body)?;
        Ok(Some(packet))
    }
}
