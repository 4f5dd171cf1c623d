//! MQTT Codec Tests
//!
//! Encoding and decoding of every packet in the supported v3.1.1 subset,
//! plus the remaining-length codec.

use bytes::{Bytes, BytesMut};
use pretty_assertions::assert_eq;

use crate::codec::{Decoder, Encoder};
use crate::protocol::{
    ConnAck, Connect, DecodeError, Packet, PubAck, Publish, QoS, SubAck, Subscribe, Subscription,
};

// ============================================================================
// Helper functions
// ============================================================================

fn encode_packet(packet: &Packet) -> BytesMut {
    let mut buf = BytesMut::new();
    Encoder::new().encode(packet, &mut buf).unwrap();
    buf
}

fn decode_packet(buf: &[u8]) -> Result<Packet, DecodeError> {
    match Decoder::new().decode(buf)? {
        Some((packet, consumed)) => {
            assert_eq!(consumed, buf.len(), "trailing bytes after packet");
            Ok(packet)
        }
        None => Err(DecodeError::InsufficientData),
    }
}

// ============================================================================
// CONNECT / CONNACK
// ============================================================================

#[test]
fn test_connect_wire_format() {
    let packet = Packet::Connect(Connect::new("abc"));
    let encoded = encode_packet(&packet);
    assert_eq!(
        &encoded[..],
        &[
            0x10, 0x0F, // CONNECT, remaining length 15
            0x00, 0x04, b'M', b'Q', b'T', b'T', // protocol name
            0x04, // protocol level
            0x02, // clean session
            0x00, 0x3C, // keep alive 60
            0x00, 0x03, b'a', b'b', b'c', // client id
        ][..]
    );
    assert_eq!(decode_packet(&encoded).unwrap(), packet);
}

#[test]
fn test_connect_any_level_and_flags_accepted() {
    // MQIsdp / level 3 / will flag set: all parsed without validation
    let packet = Packet::Connect(Connect {
        protocol_name: "MQIsdp".to_string(),
        protocol_level: 3,
        flags: 0xFF,
        keep_alive: 0,
        client_id: "legacy".to_string(),
    });
    assert_eq!(decode_packet(&encode_packet(&packet)).unwrap(), packet);
}

#[test]
fn test_connect_trailing_fields_ignored() {
    // CONNECT with username flag and a username after the client id
    let data = [
        0x10, 0x13, 0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x82, 0x00, 0x3C, 0x00, 0x01, b'c',
        0x00, 0x04, b'u', b's', b'e', b'r',
    ];
    match decode_packet(&data).unwrap() {
        Packet::Connect(c) => {
            assert_eq!(c.client_id, "c");
            assert_eq!(c.flags, 0x82);
        }
        other => panic!("expected CONNECT, got {:?}", other),
    }
}

#[test]
fn test_connect_truncated() {
    let data = [0x10, 0x06, 0x00, 0x04, b'M', b'Q', b'T', b'T'];
    assert_eq!(decode_packet(&data), Err(DecodeError::InsufficientData));
}

#[test]
fn test_connack_always_accepted_bytes() {
    let encoded = encode_packet(&Packet::ConnAck(ConnAck::default()));
    assert_eq!(&encoded[..], &[0x20, 0x02, 0x00, 0x00][..]);
    assert_eq!(
        decode_packet(&encoded).unwrap(),
        Packet::ConnAck(ConnAck {
            session_present: false,
            return_code: 0
        })
    );
}

// ============================================================================
// PUBLISH / PUBACK
// ============================================================================

#[test]
fn test_publish_qos0() {
    let packet = Packet::Publish(Publish::new("reactor/telemetry", "{\"temp\":25.5}"));
    let encoded = encode_packet(&packet);
    assert_eq!(encoded[0], 0x30);
    assert_eq!(decode_packet(&encoded).unwrap(), packet);
}

#[test]
fn test_publish_qos1_carries_packet_id() {
    let packet = Packet::Publish(Publish {
        dup: false,
        qos: QoS::AtLeastOnce,
        retain: false,
        topic: "a/b".to_string(),
        packet_id: Some(0x1234),
        payload: Bytes::from_static(b"hi"),
    });
    let encoded = encode_packet(&packet);
    assert_eq!(
        &encoded[..],
        &[0x32, 0x09, 0x00, 0x03, b'a', b'/', b'b', 0x12, 0x34, b'h', b'i'][..]
    );
    assert_eq!(decode_packet(&encoded).unwrap(), packet);
}

#[test]
fn test_publish_flags_preserved() {
    // DUP + QoS 2 + RETAIN
    let data = [0x3D, 0x06, 0x00, 0x01, b't', 0x00, 0x09, b'p'];
    match decode_packet(&data).unwrap() {
        Packet::Publish(p) => {
            assert!(p.dup);
            assert!(p.retain);
            assert_eq!(p.qos, QoS::ExactlyOnce);
            assert_eq!(p.packet_id, Some(9));
            assert_eq!(p.flags(), 0x0D);
            assert_eq!(&p.payload[..], b"p");
        }
        other => panic!("expected PUBLISH, got {:?}", other),
    }
}

#[test]
fn test_publish_empty_payload() {
    let data = [0x30, 0x03, 0x00, 0x01, b't'];
    match decode_packet(&data).unwrap() {
        Packet::Publish(p) => assert!(p.payload.is_empty()),
        other => panic!("expected PUBLISH, got {:?}", other),
    }
}

#[test]
fn test_publish_binary_payload_untouched() {
    let payload: Vec<u8> = (0..=255).collect();
    let packet = Packet::Publish(Publish::new("bin", payload.clone()));
    match decode_packet(&encode_packet(&packet)).unwrap() {
        Packet::Publish(p) => assert_eq!(&p.payload[..], &payload[..]),
        other => panic!("expected PUBLISH, got {:?}", other),
    }
}

#[test]
fn test_publish_qos3_rejected() {
    let data = [0x36, 0x05, 0x00, 0x01, b't', 0x00, 0x01];
    assert_eq!(decode_packet(&data), Err(DecodeError::InvalidQoS(3)));
}

#[test]
fn test_publish_qos1_missing_packet_id() {
    let data = [0x32, 0x03, 0x00, 0x01, b't'];
    assert_eq!(decode_packet(&data), Err(DecodeError::InsufficientData));
}

#[test]
fn test_publish_invalid_utf8_topic() {
    let data = [0x30, 0x04, 0x00, 0x02, 0xC3, 0x28];
    assert_eq!(decode_packet(&data), Err(DecodeError::InvalidUtf8));
}

#[test]
fn test_puback() {
    let packet = Packet::PubAck(PubAck { packet_id: 42 });
    let encoded = encode_packet(&packet);
    assert_eq!(&encoded[..], &[0x40, 0x02, 0x00, 0x2A][..]);
    assert_eq!(decode_packet(&encoded).unwrap(), packet);
}

// ============================================================================
// SUBSCRIBE / SUBACK
// ============================================================================

#[test]
fn test_subscribe_multiple_filters() {
    let packet = Packet::Subscribe(Subscribe {
        packet_id: 10,
        subscriptions: vec![
            Subscription {
                filter: "reactor/#".to_string(),
                qos: 0,
            },
            Subscription {
                filter: "reactor/+/alerts".to_string(),
                qos: 1,
            },
        ],
    });
    let encoded = encode_packet(&packet);
    assert_eq!(encoded[0], 0x82);
    assert_eq!(decode_packet(&encoded).unwrap(), packet);
}

#[test]
fn test_subscribe_header_flags_not_required() {
    // Bare 0x80 type byte is accepted as SUBSCRIBE
    let data = [0x80, 0x06, 0x00, 0x01, 0x00, 0x01, b'#', 0x00];
    match decode_packet(&data).unwrap() {
        Packet::Subscribe(s) => {
            assert_eq!(s.packet_id, 1);
            assert_eq!(s.subscriptions.len(), 1);
            assert_eq!(s.subscriptions[0].filter, "#");
        }
        other => panic!("expected SUBSCRIBE, got {:?}", other),
    }
}

#[test]
fn test_subscribe_missing_qos_byte() {
    let data = [0x82, 0x05, 0x00, 0x01, 0x00, 0x01, b'#'];
    assert_eq!(
        decode_packet(&data),
        Err(DecodeError::MalformedPacket("missing requested QoS"))
    );
}

#[test]
fn test_subscribe_requested_qos_kept_verbatim() {
    let data = [0x82, 0x06, 0x00, 0x01, 0x00, 0x01, b'a', 0x02];
    match decode_packet(&data).unwrap() {
        Packet::Subscribe(s) => assert_eq!(s.subscriptions[0].qos, 2),
        other => panic!("expected SUBSCRIBE, got {:?}", other),
    }
}

#[test]
fn test_suback() {
    let packet = Packet::SubAck(SubAck {
        packet_id: 7,
        return_codes: vec![0, 1, 2],
    });
    let encoded = encode_packet(&packet);
    assert_eq!(&encoded[..], &[0x90, 0x05, 0x00, 0x07, 0x00, 0x01, 0x02][..]);
    assert_eq!(decode_packet(&encoded).unwrap(), packet);
}

// ============================================================================
// Zero-length packets and framing
// ============================================================================

#[test]
fn test_empty_packets() {
    assert_eq!(&encode_packet(&Packet::PingReq)[..], &[0xC0, 0x00][..]);
    assert_eq!(&encode_packet(&Packet::PingResp)[..], &[0xD0, 0x00][..]);
    assert_eq!(&encode_packet(&Packet::Disconnect)[..], &[0xE0, 0x00][..]);

    assert_eq!(decode_packet(&[0xC0, 0x00]).unwrap(), Packet::PingReq);
    assert_eq!(decode_packet(&[0xD0, 0x00]).unwrap(), Packet::PingResp);
    assert_eq!(decode_packet(&[0xE0, 0x00]).unwrap(), Packet::Disconnect);
}

#[test]
fn test_unsupported_packet_type() {
    // PUBREC
    assert_eq!(
        decode_packet(&[0x50, 0x02, 0x00, 0x01]),
        Err(DecodeError::InvalidPacketType(5))
    );
    // Reserved type 0
    assert_eq!(
        decode_packet(&[0x00, 0x00]),
        Err(DecodeError::InvalidPacketType(0))
    );
}

#[test]
fn test_decode_needs_more_data() {
    let decoder = Decoder::new();
    assert_eq!(decoder.decode(&[0x30]).unwrap(), None);
    assert_eq!(decoder.decode(&[0x30, 0x80]).unwrap(), None);
    assert_eq!(decoder.decode(&[0x30, 0x05, 0x00]).unwrap(), None);
}

#[test]
fn test_decode_consumes_one_packet() {
    let mut buf = encode_packet(&Packet::PingResp);
    buf.extend_from_slice(&encode_packet(&Packet::PubAck(PubAck { packet_id: 3 })));

    let decoder = Decoder::new();
    let (first, consumed) = decoder.decode(&buf).unwrap().unwrap();
    assert_eq!(first, Packet::PingResp);
    assert_eq!(consumed, 2);
    let (second, _) = decoder.decode(&buf[consumed..]).unwrap().unwrap();
    assert_eq!(second, Packet::PubAck(PubAck { packet_id: 3 }));
}

#[test]
fn test_packet_too_large() {
    let decoder = Decoder::new().with_max_packet_size(100);
    let data = [0x30, 0xFF, 0xFF, 0xFF, 0x7F];
    assert_eq!(decoder.decode(&data), Err(DecodeError::PacketTooLarge));
}

// ============================================================================
// Variable Length Integer Tests
// ============================================================================

#[test]
fn test_variable_int_boundary_values() {
    use crate::codec::{read_variable_int, variable_int_len, write_variable_int};

    let test_cases = [
        (0, vec![0x00]),
        (127, vec![0x7F]),
        (128, vec![0x80, 0x01]),
        (16383, vec![0xFF, 0x7F]),
        (16384, vec![0x80, 0x80, 0x01]),
        (2097151, vec![0xFF, 0xFF, 0x7F]),
        (2097152, vec![0x80, 0x80, 0x80, 0x01]),
        (268435455, vec![0xFF, 0xFF, 0xFF, 0x7F]),
    ];

    for (value, expected_bytes) in test_cases {
        let mut buf = BytesMut::new();
        let written = write_variable_int(&mut buf, value).unwrap();
        assert_eq!(
            &buf[..],
            &expected_bytes[..],
            "Encoding failed for {}",
            value
        );
        assert_eq!(written, variable_int_len(value));

        let (decoded, len) = read_variable_int(&buf).unwrap();
        assert_eq!(decoded, value, "Decoding failed for {}", value);
        assert_eq!(len, expected_bytes.len());
    }
}

#[test]
fn test_variable_int_invalid() {
    use crate::codec::read_variable_int;

    // More than 4 bytes with continuation bits
    let invalid = [0x80, 0x80, 0x80, 0x80, 0x01];
    assert_eq!(
        read_variable_int(&invalid),
        Err(DecodeError::InvalidRemainingLength)
    );
}

#[test]
fn test_variable_int_truncated() {
    use crate::codec::read_variable_int;

    assert_eq!(read_variable_int(&[]), Err(DecodeError::InsufficientData));
    assert_eq!(
        read_variable_int(&[0x80, 0x80]),
        Err(DecodeError::InsufficientData)
    );
}

#[test]
fn test_variable_int_too_large() {
    use crate::codec::write_variable_int;
    use crate::protocol::EncodeError;

    let mut buf = BytesMut::new();
    assert_eq!(
        write_variable_int(&mut buf, 268_435_456),
        Err(EncodeError::PacketTooLarge)
    );
    assert!(buf.is_empty());
}

// ============================================================================
// Property-Based Tests (using proptest)
// ============================================================================

mod proptest_tests {
    use super::*;
    use crate::codec::{read_string, read_variable_int, write_string, write_variable_int};
    use crate::topic::topic_matches_filter;
    use proptest::prelude::*;

    fn topic_strategy() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9_]{1,12}(/[a-zA-Z0-9_]{1,12}){0,5}"
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(1000))]

        #[test]
        fn prop_variable_int_roundtrip(value in 0u32..=268_435_455u32) {
            let mut buf = BytesMut::new();
            let written = write_variable_int(&mut buf, value).unwrap();
            let (decoded, consumed) = read_variable_int(&buf).unwrap();
            prop_assert_eq!(value, decoded);
            prop_assert_eq!(written, consumed);
        }

        #[test]
        fn prop_string_roundtrip(s in "[a-zA-Z0-9_\\-/ ]{0,100}") {
            let mut buf = BytesMut::new();
            write_string(&mut buf, &s).unwrap();
            let (decoded, consumed) = read_string(&buf).unwrap();
            prop_assert_eq!(s.as_str(), decoded);
            prop_assert_eq!(consumed, 2 + s.len());
        }

        #[test]
        fn prop_publish_payload_preserved(
            topic in topic_strategy(),
            payload in proptest::collection::vec(any::<u8>(), 0..512),
            packet_id in 1u16..=u16::MAX,
        ) {
            let packet = Packet::Publish(Publish {
                dup: false,
                qos: QoS::AtLeastOnce,
                retain: false,
                topic,
                packet_id: Some(packet_id),
                payload: Bytes::from(payload),
            });
            let decoded = decode_packet(&encode_packet(&packet)).unwrap();
            prop_assert_eq!(packet, decoded);
        }

        #[test]
        fn prop_topic_matches_itself(topic in topic_strategy()) {
            prop_assert!(topic_matches_filter(&topic, &topic));
            prop_assert!(topic_matches_filter(&topic, "#"));
        }

        #[test]
        fn prop_plus_matches_any_single_level(topic in topic_strategy(), level in 0usize..6) {
            let levels: Vec<&str> = topic.split('/').collect();
            prop_assume!(level < levels.len());
            let filter = levels
                .iter()
                .enumerate()
                .map(|(i, l)| if i == level { "+" } else { *l })
                .collect::<Vec<_>>()
                .join("/");
            prop_assert!(topic_matches_filter(&topic, &filter));
        }

        #[test]
        fn prop_prefix_hash_matches_subtree(topic in topic_strategy(), suffix in topic_strategy()) {
            let filter = format!("{}/#", topic);
            let subtopic = format!("{}/{}", topic, suffix);
            prop_assert!(topic_matches_filter(&subtopic, &filter));
            prop_assert!(topic_matches_filter(&topic, &filter));
        }
    }
}
