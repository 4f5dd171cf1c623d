//! MQTT Protocol definitions and types
//!
//! Defines the MQTT v3.1.1 subset spoken by the broker: the packet types it
//! dispatches on and the QoS levels it understands.

mod error;
mod packet;

pub use error::{DecodeError, EncodeError, ProtocolError};
pub use packet::*;

/// Quality of Service levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum QoS {
    /// At most once delivery
    #[default]
    AtMostOnce = 0,
    /// At least once delivery
    AtLeastOnce = 1,
    /// Exactly once delivery (parsed and forwarded, never acknowledged)
    ExactlyOnce = 2,
}

impl QoS {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }
}

/// MQTT Packet Type (high nibble of the fixed header)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    Subscribe = 8,
    SubAck = 9,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
}

impl PacketType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(PacketType::Connect),
            2 => Some(PacketType::ConnAck),
            3 => Some(PacketType::Publish),
            4 => Some(PacketType::PubAck),
            8 => Some(PacketType::Subscribe),
            9 => Some(PacketType::SubAck),
            12 => Some(PacketType::PingReq),
            13 => Some(PacketType::PingResp),
            14 => Some(PacketType::Disconnect),
            _ => None,
        }
    }

    /// Fixed header byte with zero flags (e.g. 0x30 for PUBLISH)
    pub fn header_byte(self) -> u8 {
        (self as u8) << 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_type_header_bytes() {
        assert_eq!(PacketType::Connect.header_byte(), 0x10);
        assert_eq!(PacketType::ConnAck.header_byte(), 0x20);
        assert_eq!(PacketType::Publish.header_byte(), 0x30);
        assert_eq!(PacketType::PubAck.header_byte(), 0x40);
        assert_eq!(PacketType::Subscribe.header_byte(), 0x80);
        assert_eq!(PacketType::SubAck.header_byte(), 0x90);
        assert_eq!(PacketType::PingReq.header_byte(), 0xC0);
        assert_eq!(PacketType::PingResp.header_byte(), 0xD0);
        assert_eq!(PacketType::Disconnect.header_byte(), 0xE0);
    }

    #[test]
    fn test_unsupported_packet_types() {
        // PUBREC..PUBCOMP, UNSUBSCRIBE/UNSUBACK and AUTH are outside the subset
        for v in [0u8, 5, 6, 7, 10, 11, 15] {
            assert_eq!(PacketType::from_u8(v), None, "type {}", v);
        }
    }

    #[test]
    fn test_qos_from_u8() {
        assert_eq!(QoS::from_u8(0), Some(QoS::AtMostOnce));
        assert_eq!(QoS::from_u8(1), Some(QoS::AtLeastOnce));
        assert_eq!(QoS::from_u8(2), Some(QoS::ExactlyOnce));
        assert_eq!(QoS::from_u8(3), None);
    }
}
