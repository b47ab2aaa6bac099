//! Frame codec round-trip and incremental decoding tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use bytes::BytesMut;

use wsbridge_core::protocol::frame::{decode, encode, encode_frame, Decoded, Frame, Opcode};
use wsbridge_core::{ProtocolError, Role};

const MAX_FRAME: usize = 1 << 20;

fn decode_one(wire: &[u8], role: Role) -> (Frame, usize) {
    match decode(wire, role, MAX_FRAME).unwrap() {
        Decoded::Frame { frame, consumed } => (frame, consumed),
        Decoded::NeedMoreData => panic!("expected a complete frame"),
    }
}

#[test]
fn round_trip_across_length_boundaries() {
    for size in [0usize, 1, 125, 126, 127, 65535, 65536, 70000] {
        let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();

        // client -> server: masked, decoded by a server
        let wire = encode(Opcode::Binary, &payload, true);
        let (frame, consumed) = decode_one(&wire, Role::Server);
        assert_eq!(consumed, wire.len(), "size={size}");
        assert_eq!(frame.opcode, Opcode::Binary);
        assert!(frame.fin);
        assert!(frame.mask.is_some());
        assert_eq!(&frame.payload[..], &payload[..], "size={size}");

        // server -> client: unmasked, decoded by a client
        let wire = encode(Opcode::Text, &payload, false);
        let (frame, consumed) = decode_one(&wire, Role::Client);
        assert_eq!(consumed, wire.len(), "size={size}");
        assert_eq!(frame.opcode, Opcode::Text);
        assert!(frame.mask.is_none());
        assert_eq!(&frame.payload[..], &payload[..], "size={size}");
    }
}

#[test]
fn header_uses_minimal_length_encoding() {
    assert_eq!(encode(Opcode::Binary, &[0u8; 125], false)[1], 125);
    assert_eq!(encode(Opcode::Binary, &[0u8; 126], false)[1], 126);
    assert_eq!(encode(Opcode::Binary, &vec![0u8; 65535], false)[1], 126);
    assert_eq!(encode(Opcode::Binary, &vec![0u8; 65536], false)[1], 127);
}

/// Feed `wire` one byte at a time; the frame must appear exactly at the last byte.
fn decode_byte_at_a_time(wire: &[u8], role: Role) -> Frame {
    let mut buf = Vec::with_capacity(wire.len());
    let mut got = None;
    for (i, byte) in wire.iter().enumerate() {
        buf.push(*byte);
        match decode(&buf, role, MAX_FRAME).expect("no spurious protocol error") {
            Decoded::NeedMoreData => assert!(i + 1 < wire.len(), "stalled at {i}"),
            Decoded::Frame { frame, consumed } => {
                assert_eq!(i + 1, wire.len());
                assert_eq!(consumed, wire.len());
                got = Some(frame);
            }
        }
    }
    got.unwrap()
}

#[test]
fn byte_at_a_time_matches_whole_buffer() {
    for len in [0usize, 125, 126, 300, 65535, 65536] {
        let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();
        for (role, is_client) in [(Role::Server, true), (Role::Client, false)] {
            let wire = encode(Opcode::Binary, &payload, is_client);
            let (expected, _) = decode_one(&wire, role);
            assert_eq!(expected.payload.len(), len);
            assert_eq!(decode_byte_at_a_time(&wire, role), expected, "len {len}");
        }
    }
}

#[test]
fn masked_control_frame_byte_at_a_time() {
    let wire = encode(Opcode::Ping, b"keepalive", true);
    let frame = decode_byte_at_a_time(&wire, Role::Server);
    assert_eq!(frame.opcode, Opcode::Ping);
    assert!(frame.fin);
    assert_eq!(&frame.payload[..], b"keepalive");
}

#[test]
fn fragments_keep_fin_and_opcode() {
    let mut wire = BytesMut::new();
    encode_frame(&Frame::fragment(Opcode::Text, "Hel", false), None, &mut wire);
    encode_frame(&Frame::fragment(Opcode::Continuation, "lo", true), None, &mut wire);

    let (first, n) = decode_one(&wire, Role::Client);
    assert!(!first.fin);
    assert_eq!(first.opcode, Opcode::Text);

    let (second, _) = decode_one(&wire[n..], Role::Client);
    assert!(second.fin);
    assert_eq!(second.opcode, Opcode::Continuation);
    assert_eq!(&second.payload[..], b"lo");
}

#[test]
fn oversized_control_frame_is_rejected() {
    let mut wire = BytesMut::new();
    encode_frame(&Frame::ping(vec![0u8; 126]), None, &mut wire);
    assert_eq!(
        decode(&wire, Role::Client, MAX_FRAME),
        Err(ProtocolError::ControlFrameTooLarge(126))
    );
}

#[test]
fn opcode_classification() {
    for op in [Opcode::Close, Opcode::Ping, Opcode::Pong] {
        assert!(op.is_control());
    }
    for op in [Opcode::Continuation, Opcode::Text, Opcode::Binary] {
        assert!(op.is_data());
    }
    for raw in [0x3u8, 0x7, 0xB, 0xF] {
        assert_eq!(Opcode::from_u8(raw), Err(ProtocolError::InvalidOpcode(raw)));
    }
}
