//! Integration tests for packet framing: resumable decoding across
//! arbitrary chunk boundaries and the oversize rejections.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::Decoder;

use remote_tools_protocol::error::ProtocolError;
use remote_tools_protocol::protocol::fragment::{split_message, MAX_FRAGMENT_BYTES};
use remote_tools_protocol::protocol::packet::{
    packet_type, Packet, PacketCodec, RemoteToolsConnect, HEADER_SIZE,
};

#[test]
fn decoding_resumes_at_every_split_point() {
    let first = Packet::new(packet_type::REMOTE_TOOLS_CONNECT, Bytes::from_static(b"meta"))
        .unwrap();
    let second = Packet::new(
        packet_type::REMOTE_TOOLS_MESSAGE,
        Bytes::from_static(b"payload-bytes"),
    )
    .unwrap();

    let mut wire = Vec::new();
    wire.extend_from_slice(&first.to_frame());
    wire.extend_from_slice(&second.to_frame());

    // Split the two-packet byte stream at every possible boundary and
    // feed both halves; the decoder must produce the same two packets
    // regardless of where the cut lands.
    for split in 0..=wire.len() {
        let mut codec = PacketCodec;
        let mut buf = BytesMut::new();
        let mut decoded = Vec::new();

        buf.put_slice(&wire[..split]);
        while let Some(packet) = codec.decode(&mut buf).unwrap() {
            decoded.push(packet);
        }
        buf.put_slice(&wire[split..]);
        while let Some(packet) = codec.decode(&mut buf).unwrap() {
            decoded.push(packet);
        }

        assert_eq!(decoded, vec![first.clone(), second.clone()], "split {split}");
    }
}

#[test]
fn encoder_never_produces_an_oversized_message_packet() {
    // Ten fragments' worth of message: every wrapped packet must stay
    // within the fragment ceiling plus its fixed trailer overhead.
    let message = vec![0xA5u8; MAX_FRAGMENT_BYTES * 10];
    for fragment in split_message(77, &message) {
        assert!(fragment.fragment.len() <= MAX_FRAGMENT_BYTES);
        let packet = fragment.to_packet().expect("fits in a packet");
        assert!(packet.payload.len() <= MAX_FRAGMENT_BYTES + 12);
        assert!(packet.payload.len() + HEADER_SIZE <= u16::MAX as usize);
    }
}

#[test]
fn decoder_rejects_an_oversized_fragment() {
    // A type-8 payload declaring a fragment beyond the configured maximum
    // is refused even though it would fit the packet size field.
    use remote_tools_protocol::protocol::fragment::RemoteToolsMessage;

    let oversize = MAX_FRAGMENT_BYTES + 100;
    let mut payload = Vec::new();
    payload.put_u16(oversize as u16);
    payload.put_u16(oversize as u16);
    payload.extend_from_slice(&vec![0u8; oversize]);
    payload.put_u32(oversize as u32);
    payload.put_u32(1);

    assert!(matches!(
        RemoteToolsMessage::read_from(&payload),
        Err(ProtocolError::OversizedPacket(_))
    ));
}

#[test]
fn connect_packet_parses_from_engine_layout() {
    // Byte-for-byte layout the engine sends: capabilities, persistent id,
    // then the doubly-length-prefixed display name.
    let mut payload = Vec::new();
    payload.put_u32(0x0000_0004);
    payload.put_u32(0x1234_5678);
    payload.put_u32(6); // length
    payload.put_u8(6); // echo
    payload.put_slice(b"Editor");

    let connect = RemoteToolsConnect::read_from(&payload).unwrap();
    assert_eq!(connect.capabilities, 4);
    assert_eq!(connect.persistent_id, 0x1234_5678);
    assert_eq!(connect.display_name, "Editor");
}

#[test]
fn header_layout_is_flags_type_size() {
    let packet = Packet::new(packet_type::REMOTE_TOOLS_MESSAGE, Bytes::from_static(b"abc"))
        .unwrap();
    let frame = packet.to_frame();
    assert_eq!(frame[0], 0, "flags byte");
    assert_eq!(u16::from_be_bytes([frame[1], frame[2]]), 8, "packet type");
    assert_eq!(u16::from_be_bytes([frame[3], frame[4]]), 3, "payload size");
    assert_eq!(&frame[5..], b"abc");
}
