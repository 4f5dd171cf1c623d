//! MQTT Packet Definitions
//!
//! Tagged representation of every packet the broker and its clients exchange.

use bytes::Bytes;

use super::{PacketType, QoS};

/// MQTT Packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(Connect),
    ConnAck(ConnAck),
    Publish(Publish),
    PubAck(PubAck),
    Subscribe(Subscribe),
    SubAck(SubAck),
    PingReq,
    PingResp,
    Disconnect,
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::ConnAck(_) => PacketType::ConnAck,
            Packet::Publish(_) => PacketType::Publish,
            Packet::PubAck(_) => PacketType::PubAck,
            Packet::Subscribe(_) => PacketType::Subscribe,
            Packet::SubAck(_) => PacketType::SubAck,
            Packet::PingReq => PacketType::PingReq,
            Packet::PingResp => PacketType::PingResp,
            Packet::Disconnect => PacketType::Disconnect,
        }
    }
}

/// CONNECT packet (client -> server)
///
/// Only the fields up to the client identifier are carried; the broker
/// accepts every CONNECT without looking at them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    /// Protocol name ("MQTT" for v3.1.1)
    pub protocol_name: String,
    /// Protocol level (4 for v3.1.1)
    pub protocol_level: u8,
    /// Raw connect flags byte
    pub flags: u8,
    /// Keep alive interval in seconds (parsed, never enforced)
    pub keep_alive: u16,
    /// Client identifier
    pub client_id: String,
}

impl Connect {
    /// Clean-session v3.1.1 CONNECT for the given client identifier
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ..Self::default()
        }
    }
}

impl Default for Connect {
    fn default() -> Self {
        Self {
            protocol_name: "MQTT".to_string(),
            protocol_level: 4,
            flags: 0x02,
            keep_alive: 60,
            client_id: String::new(),
        }
    }
}

/// CONNACK packet (server -> client)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnAck {
    /// Session present flag
    pub session_present: bool,
    /// Return code (0 = accepted)
    pub return_code: u8,
}

/// PUBLISH packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub topic: String,
    /// Present iff qos > 0
    pub packet_id: Option<u16>,
    pub payload: Bytes,
}

impl Publish {
    /// QoS 0 publish of `payload` to `topic`
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            dup: false,
            qos: QoS::AtMostOnce,
            retain: false,
            topic: topic.into(),
            packet_id: None,
            payload: payload.into(),
        }
    }

    /// Low nibble of the fixed header: DUP | QoS | RETAIN
    pub fn flags(&self) -> u8 {
        let mut flags = (self.qos as u8) << 1;
        if self.dup {
            flags |= 0x08;
        }
        if self.retain {
            flags |= 0x01;
        }
        flags
    }
}

/// PUBACK packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PubAck {
    pub packet_id: u16,
}

/// SUBSCRIBE packet (client -> server)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    pub packet_id: u16,
    pub subscriptions: Vec<Subscription>,
}

/// One (filter, requested QoS) entry of a SUBSCRIBE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub filter: String,
    /// Requested QoS byte exactly as sent
    pub qos: u8,
}

/// SUBACK packet (server -> client)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAck {
    pub packet_id: u16,
    /// One granted QoS byte per filter, in request order
    pub return_codes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_flags() {
        let mut publish = Publish::new("a/b", "x");
        assert_eq!(publish.flags(), 0x00);

        publish.qos = QoS::AtLeastOnce;
        assert_eq!(publish.flags(), 0x02);

        publish.retain = true;
        assert_eq!(publish.flags(), 0x03);

        publish.dup = true;
        publish.qos = QoS::ExactlyOnce;
        assert_eq!(publish.flags(), 0x0D);
    }

    #[test]
    fn test_connect_defaults() {
        let connect = Connect::new("reactor_core_001");
        assert_eq!(connect.protocol_name, "MQTT");
        assert_eq!(connect.protocol_level, 4);
        assert_eq!(connect.flags, 0x02);
        assert_eq!(connect.client_id, "reactor_core_001");
    }
}
