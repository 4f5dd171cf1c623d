//! Protocol error types

use std::fmt;

use super::PacketType;

/// Why a byte sequence could not be turned into a [`Packet`](super::Packet)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer ends before the field or packet does
    InsufficientData,
    /// Fixed-header type nibble outside the supported subset
    InvalidPacketType(u8),
    /// Remaining length continues past its fourth byte
    InvalidRemainingLength,
    /// PUBLISH QoS bits set to 3
    InvalidQoS(u8),
    /// String field is not UTF-8
    InvalidUtf8,
    MalformedPacket(&'static str),
    /// Remaining length above the configured maximum
    PacketTooLarge,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientData => write!(f, "packet truncated"),
            Self::InvalidPacketType(t) => write!(f, "unsupported packet type {}", t),
            Self::InvalidRemainingLength => write!(f, "remaining length longer than 4 bytes"),
            Self::InvalidQoS(q) => write!(f, "QoS {} in PUBLISH flags", q),
            Self::InvalidUtf8 => write!(f, "string is not valid UTF-8"),
            Self::MalformedPacket(msg) => write!(f, "malformed packet: {}", msg),
            Self::PacketTooLarge => write!(f, "packet exceeds maximum size"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Why a [`Packet`](super::Packet) could not be serialized
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Remaining length would exceed 268 435 455 bytes
    PacketTooLarge,
    /// String longer than its 2-byte length prefix allows
    StringTooLong,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PacketTooLarge => write!(f, "remaining length above protocol maximum"),
            Self::StringTooLong => write!(f, "string longer than 65535 bytes"),
        }
    }
}

impl std::error::Error for EncodeError {}

/// A well-formed packet that the connection's state does not allow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A reply or forwarded frame could not be encoded
    Encode(EncodeError),
    /// Packet type the broker does not accept once connected
    UnexpectedPacket(PacketType),
    /// Packet ordering rule broken, e.g. a second CONNECT
    ProtocolViolation(&'static str),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode(e) => write!(f, "encode failed: {}", e),
            Self::UnexpectedPacket(t) => write!(f, "{:?} not accepted here", t),
            Self::ProtocolViolation(msg) => write!(f, "protocol violation: {}", msg),
        }
    }
}

impl std::error::Error for ProtocolError {}

impl From<EncodeError> for ProtocolError {
    fn from(e: EncodeError) -> Self {
        ProtocolError::Encode(e)
    }
}
