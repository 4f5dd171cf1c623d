//! MQTT Packet Decoder
//!
//! Decodes packet bodies into [`Packet`]. Parsing is deliberately
//! permissive: only the fields needed for dispatch are validated, so a
//! CONNECT is never rejected for its protocol level or flags.

use bytes::Bytes;

use super::{read_string, read_u16, read_variable_int, MAX_REMAINING_LENGTH};
use crate::protocol::{
    ConnAck, Connect, DecodeError, Packet, PacketType, PubAck, Publish, QoS, SubAck, Subscribe,
    Subscription,
};

/// MQTT Packet Decoder
#[derive(Debug, Clone)]
pub struct Decoder {
    /// Maximum remaining length accepted
    max_packet_size: usize,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            max_packet_size: MAX_REMAINING_LENGTH,
        }
    }

    pub fn with_max_packet_size(mut self, size: usize) -> Self {
        self.max_packet_size = size.min(MAX_REMAINING_LENGTH);
        self
    }

    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    /// Decode one complete packet from the front of `buf`
    /// Returns (packet, bytes_consumed), or None if more data is needed
    pub fn decode(&self, buf: &[u8]) -> Result<Option<(Packet, usize)>, DecodeError> {
        if buf.len() < 2 {
            return Ok(None);
        }

        let first_byte = buf[0];

        let (remaining_length, len_bytes) = match read_variable_int(&buf[1..]) {
            Ok(r) => r,
            Err(DecodeError::InsufficientData) => return Ok(None),
            Err(e) => return Err(e),
        };

        if remaining_length as usize > self.max_packet_size {
            return Err(DecodeError::PacketTooLarge);
        }

        let total_len = 1 + len_bytes + remaining_length as usize;
        if buf.len() < total_len {
            return Ok(None);
        }

        let body = Bytes::copy_from_slice(&buf[1 + len_bytes..total_len]);
        let packet = self.decode_body(first_byte >> 4, first_byte & 0x0F, body)?;
        Ok(Some((packet, total_len)))
    }

    /// Decode a packet body given the fixed header's type and flags nibbles
    pub fn decode_body(
        &self,
        packet_type: u8,
        flags: u8,
        body: Bytes,
    ) -> Result<Packet, DecodeError> {
        let kind = PacketType::from_u8(packet_type)
            .ok_or(DecodeError::InvalidPacketType(packet_type))?;

        match kind {
            PacketType::Connect => self.decode_connect(&body),
            PacketType::ConnAck => self.decode_connack(&body),
            PacketType::Publish => self.decode_publish(flags, body),
            PacketType::PubAck => Ok(Packet::PubAck(PubAck {
                packet_id: read_u16(&body)?,
            })),
            PacketType::Subscribe => self.decode_subscribe(&body),
            PacketType::SubAck => self.decode_suback(&body),
            PacketType::PingReq => Ok(Packet::PingReq),
            PacketType::PingResp => Ok(Packet::PingResp),
            PacketType::Disconnect => Ok(Packet::Disconnect),
        }
    }

    fn decode_connect(&self, payload: &[u8]) -> Result<Packet, DecodeError> {
        let mut pos = 0;

        let (protocol_name, len) = read_string(payload)?;
        pos += len;

        // Protocol level, connect flags, keep alive
        if pos + 4 > payload.len() {
            return Err(DecodeError::InsufficientData);
        }
        let protocol_level = payload[pos];
        let flags = payload[pos + 1];
        let keep_alive = u16::from_be_bytes([payload[pos + 2], payload[pos + 3]]);
        pos += 4;

        let (client_id, _) = read_string(&payload[pos..])?;

        Ok(Packet::Connect(Connect {
            protocol_name: protocol_name.to_string(),
            protocol_level,
            flags,
            keep_alive,
            client_id: client_id.to_string(),
        }))
    }

    fn decode_connack(&self, payload: &[u8]) -> Result<Packet, DecodeError> {
        if payload.len() < 2 {
            return Err(DecodeError::InsufficientData);
        }
        Ok(Packet::ConnAck(ConnAck {
            session_present: (payload[0] & 0x01) != 0,
            return_code: payload[1],
        }))
    }

    fn decode_publish(&self, flags: u8, payload: Bytes) -> Result<Packet, DecodeError> {
        let dup = (flags & 0x08) != 0;
        let qos_bits = (flags >> 1) & 0x03;
        let qos = QoS::from_u8(qos_bits).ok_or(DecodeError::InvalidQoS(qos_bits))?;
        let retain = (flags & 0x01) != 0;

        let mut pos = 0;
        let (topic, len) = read_string(&payload)?;
        let topic = topic.to_string();
        pos += len;

        let packet_id = if qos != QoS::AtMostOnce {
            let id = read_u16(&payload[pos..])?;
            pos += 2;
            Some(id)
        } else {
            None
        };

        Ok(Packet::Publish(Publish {
            dup,
            qos,
            retain,
            topic,
            packet_id,
            payload: payload.slice(pos..),
        }))
    }

    fn decode_subscribe(&self, payload: &[u8]) -> Result<Packet, DecodeError> {
        let packet_id = read_u16(payload)?;
        let mut pos = 2;

        let mut subscriptions = Vec::new();
        while pos < payload.len() {
            let (filter, len) = read_string(&payload[pos..])?;
            pos += len;

            if pos >= payload.len() {
                return Err(DecodeError::MalformedPacket("missing requested QoS"));
            }
            let qos = payload[pos];
            pos += 1;

            subscriptions.push(Subscription {
                filter: filter.to_string(),
                qos,
            });
        }

        Ok(Packet::Subscribe(Subscribe {
            packet_id,
            subscriptions,
        }))
    }

    fn decode_suback(&self, payload: &[u8]) -> Result<Packet, DecodeError> {
        let packet_id = read_u16(payload)?;
        Ok(Packet::SubAck(SubAck {
            packet_id,
            return_codes: payload[2..].to_vec(),
        }))
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
