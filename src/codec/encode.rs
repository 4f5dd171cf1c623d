//! MQTT Packet Encoder

use bytes::{BufMut, BytesMut};

use super::{variable_int_len, write_string, write_variable_int};
use crate::protocol::{
    ConnAck, Connect, EncodeError, Packet, PacketType, PubAck, Publish, QoS, SubAck, Subscribe,
};

/// MQTT Packet Encoder
#[derive(Debug, Clone, Copy, Default)]
pub struct Encoder;

impl Encoder {
    pub fn new() -> Self {
        Self
    }

    /// Encode a packet to the buffer
    pub fn encode(&self, packet: &Packet, buf: &mut BytesMut) -> Result<(), EncodeError> {
        match packet {
            Packet::Connect(p) => self.encode_connect(p, buf),
            Packet::ConnAck(p) => self.encode_connack(p, buf),
            Packet::Publish(p) => self.encode_publish(p, buf),
            Packet::PubAck(p) => self.encode_puback(p, buf),
            Packet::Subscribe(p) => self.encode_subscribe(p, buf),
            Packet::SubAck(p) => self.encode_suback(p, buf),
            Packet::PingReq => {
                buf.put_u8(0xC0); // PINGREQ type + flags
                buf.put_u8(0x00); // Remaining length
                Ok(())
            }
            Packet::PingResp => {
                buf.put_u8(0xD0); // PINGRESP type + flags
                buf.put_u8(0x00); // Remaining length
                Ok(())
            }
            Packet::Disconnect => {
                buf.put_u8(0xE0); // DISCONNECT type + flags
                buf.put_u8(0x00); // Remaining length
                Ok(())
            }
        }
    }

    fn encode_connect(&self, packet: &Connect, buf: &mut BytesMut) -> Result<(), EncodeError> {
        // Protocol name + level + flags + keep alive + client id
        let remaining_length =
            2 + packet.protocol_name.len() + 1 + 1 + 2 + 2 + packet.client_id.len();

        buf.put_u8(PacketType::Connect.header_byte());
        write_variable_int(buf, remaining_length as u32)?;

        write_string(buf, &packet.protocol_name)?;
        buf.put_u8(packet.protocol_level);
        buf.put_u8(packet.flags);
        buf.put_u16(packet.keep_alive);
        write_string(buf, &packet.client_id)?;

        Ok(())
    }

    fn encode_connack(&self, packet: &ConnAck, buf: &mut BytesMut) -> Result<(), EncodeError> {
        buf.put_u8(PacketType::ConnAck.header_byte());
        buf.put_u8(0x02);
        buf.put_u8(if packet.session_present { 0x01 } else { 0x00 });
        buf.put_u8(packet.return_code);
        Ok(())
    }

    /// Encode a PUBLISH without wrapping it in a [`Packet`]
    pub fn encode_publish(&self, packet: &Publish, buf: &mut BytesMut) -> Result<(), EncodeError> {
        let has_packet_id = packet.qos != QoS::AtMostOnce;

        let mut remaining_length = 2 + packet.topic.len() + packet.payload.len();
        if has_packet_id {
            remaining_length += 2;
        }
        let remaining_length =
            u32::try_from(remaining_length).map_err(|_| EncodeError::PacketTooLarge)?;

        buf.reserve(1 + variable_int_len(remaining_length) + remaining_length as usize);
        buf.put_u8(PacketType::Publish.header_byte() | packet.flags());
        write_variable_int(buf, remaining_length)?;

        write_string(buf, &packet.topic)?;
        if has_packet_id {
            buf.put_u16(packet.packet_id.unwrap_or(0));
        }
        buf.put_slice(&packet.payload);

        Ok(())
    }

    fn encode_puback(&self, packet: &PubAck, buf: &mut BytesMut) -> Result<(), EncodeError> {
        buf.put_u8(PacketType::PubAck.header_byte());
        buf.put_u8(0x02);
        buf.put_u16(packet.packet_id);
        Ok(())
    }

    fn encode_subscribe(&self, packet: &Subscribe, buf: &mut BytesMut) -> Result<(), EncodeError> {
        let remaining_length = 2 + packet
            .subscriptions
            .iter()
            .map(|s| 2 + s.filter.len() + 1)
            .sum::<usize>();

        // SUBSCRIBE carries the reserved flags 0b0010
        buf.put_u8(PacketType::Subscribe.header_byte() | 0x02);
        write_variable_int(buf, remaining_length as u32)?;

        buf.put_u16(packet.packet_id);
        for sub in &packet.subscriptions {
            write_string(buf, &sub.filter)?;
            buf.put_u8(sub.qos);
        }

        Ok(())
    }

    fn encode_suback(&self, packet: &SubAck, buf: &mut BytesMut) -> Result<(), EncodeError> {
        let remaining_length = 2 + packet.return_codes.len();

        buf.put_u8(PacketType::SubAck.header_byte());
        write_variable_int(buf, remaining_length as u32)?;

        buf.put_u16(packet.packet_id);
        buf.put_slice(&packet.return_codes);

        Ok(())
    }
}
