//! # Packet Framing
//!
//! The fixed 5-byte header prefixing every packet on the wire, the packet
//! type identifiers the probe cares about, and the tokio codec that frames
//! a raw byte stream into packets. Decoding is resumable: a read chunk may
//! contain a partial header, multiple whole packets, or any mixture, and
//! the codec picks up where it left off on the next chunk.
//!
//! ## Wire Format
//! ```text
//! [Flags(1)] [Type(2)] [PayloadSize(2)] [Payload(N)]
//! ```
//! All integers are big-endian; this is a closed two-party protocol and
//! the peer writes the same byte order.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::error::{ProtocolError, Result};

/// Size of the packet header in bytes.
pub const HEADER_SIZE: usize = 5;

/// Hard ceiling for header + payload together (the size field is 16 bits).
pub const MAX_PACKET_SIZE: usize = u16::MAX as usize;

/// Packet type identifiers used by the protocol.
pub mod packet_type {
    /// Sent by the engine when it first dials in; payload is ignored.
    pub const INITIATE_CONNECTION: u16 = 1;
    /// Capability/identity exchange; see [`super::RemoteToolsConnect`].
    pub const REMOTE_TOOLS_CONNECT: u16 = 7;
    /// One fragment of an encoded object; see [`crate::protocol::fragment`].
    pub const REMOTE_TOOLS_MESSAGE: u16 = 8;
}

/// The 5-byte packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHeader {
    /// Reserved; always zero on encode, ignored on decode.
    pub flags: u8,
    pub packet_type: u16,
    pub payload_size: u16,
}

impl TcpHeader {
    /// Build a header, rejecting payloads the 16-bit size field (plus
    /// header overhead) cannot carry.
    pub fn new(packet_type: u16, payload_size: usize) -> Result<Self> {
        if payload_size + HEADER_SIZE > MAX_PACKET_SIZE {
            return Err(ProtocolError::OversizedPacket(payload_size));
        }
        Ok(Self {
            flags: 0,
            packet_type,
            payload_size: payload_size as u16,
        })
    }

    pub fn read_from(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(ProtocolError::MalformedPacket(
                "packet header needs 5 bytes".into(),
            ));
        }
        Ok(Self {
            flags: buf[0],
            packet_type: u16::from_be_bytes([buf[1], buf[2]]),
            payload_size: u16::from_be_bytes([buf[3], buf[4]]),
        })
    }

    pub fn write_to(&self, out: &mut BytesMut) {
        out.put_u8(self.flags);
        out.put_u16(self.packet_type);
        out.put_u16(self.payload_size);
    }
}

/// One framed packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: TcpHeader,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(packet_type: u16, payload: Bytes) -> Result<Self> {
        let header = TcpHeader::new(packet_type, payload.len())?;
        Ok(Self { header, payload })
    }

    pub fn packet_type(&self) -> u16 {
        self.header.packet_type
    }

    /// Serialize header + payload into one frame buffer.
    pub fn to_frame(&self) -> Bytes {
        let mut frame = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        self.header.write_to(&mut frame);
        frame.put_slice(&self.payload);
        frame.freeze()
    }
}

/// Tokio codec framing the raw stream into [`Packet`]s.
pub struct PacketCodec;

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }
        let header = TcpHeader::read_from(&src[..HEADER_SIZE])?;
        let total = HEADER_SIZE + header.payload_size as usize;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }
        src.advance(HEADER_SIZE);
        let payload = src.split_to(header.payload_size as usize).freeze();
        trace!(
            packet_type = header.packet_type,
            payload_size = header.payload_size,
            "decoded packet"
        );
        Ok(Some(Packet { header, payload }))
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = ProtocolError;

    fn encode(&mut self, packet: Packet, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(HEADER_SIZE + packet.payload.len());
        packet.header.write_to(dst);
        dst.put_slice(&packet.payload);
        Ok(())
    }
}

/// Capability/identity payload the engine sends right after connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteToolsConnect {
    pub capabilities: u32,
    pub persistent_id: u32,
    pub display_name: String,
}

impl RemoteToolsConnect {
    pub fn read_from(payload: &[u8]) -> Result<Self> {
        let mut cur = payload;
        need(cur, 8, "connect payload")?;
        let capabilities = cur.get_u32();
        let persistent_id = cur.get_u32();
        let display_name = read_bounded_string(&mut cur)?;
        Ok(Self {
            capabilities,
            persistent_id,
            display_name,
        })
    }

    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        out.put_u32(self.capabilities);
        out.put_u32(self.persistent_id);
        write_bounded_string(out, &self.display_name)
    }

    pub fn to_packet(&self) -> Result<Packet> {
        let mut payload = Vec::new();
        self.write_to(&mut payload)?;
        Packet::new(packet_type::REMOTE_TOOLS_CONNECT, Bytes::from(payload))
    }
}

/// Write the engine's bounded string form: a 4-byte length, a 1-byte echo
/// of it when the length fits a byte (2 bytes otherwise), then the UTF-8
/// bytes.
pub fn write_bounded_string(out: &mut Vec<u8>, text: &str) -> Result<()> {
    let len = text.len();
    if len > u16::MAX as usize {
        return Err(ProtocolError::UnsupportedSize(len));
    }
    out.put_u32(len as u32);
    if len <= u8::MAX as usize {
        out.put_u8(len as u8);
    } else {
        out.put_u16(len as u16);
    }
    out.put_slice(text.as_bytes());
    Ok(())
}

/// Counterpart of [`write_bounded_string`]; both length fields must agree
/// or the peer is rejected.
pub fn read_bounded_string(cur: &mut &[u8]) -> Result<String> {
    need(*cur, 4, "string length")?;
    let len = cur.get_u32() as usize;
    if len > u16::MAX as usize {
        return Err(ProtocolError::MalformedPacket(format!(
            "string of {len} bytes exceeds the protocol limit"
        )));
    }
    let echo = if len <= u8::MAX as usize {
        need(*cur, 1, "string length echo")?;
        cur.get_u8() as usize
    } else {
        need(*cur, 2, "string length echo")?;
        cur.get_u16() as usize
    };
    if echo != len {
        return Err(ProtocolError::MalformedPacket(format!(
            "string length fields disagree: {len} vs {echo}"
        )));
    }
    need(*cur, len, "string bytes")?;
    let bytes = cur.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec())
        .map_err(|e| ProtocolError::MalformedPacket(format!("string is not utf-8: {e}")))
}

fn need(cur: &[u8], bytes: usize, what: &str) -> Result<()> {
    if cur.len() < bytes {
        return Err(ProtocolError::MalformedPacket(format!(
            "truncated packet while reading {what}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let header = TcpHeader::new(packet_type::REMOTE_TOOLS_MESSAGE, 1200).unwrap();
        let mut buf = BytesMut::new();
        header.write_to(&mut buf);
        assert_eq!(buf.len(), HEADER_SIZE);
        assert_eq!(TcpHeader::read_from(&buf).unwrap(), header);
    }

    #[test]
    fn header_rejects_oversized_payload() {
        let err = TcpHeader::new(packet_type::REMOTE_TOOLS_MESSAGE, MAX_PACKET_SIZE).unwrap_err();
        assert!(matches!(err, ProtocolError::OversizedPacket(_)));
    }

    #[test]
    fn codec_waits_for_full_packet() {
        let packet = Packet::new(packet_type::REMOTE_TOOLS_CONNECT, Bytes::from_static(b"abcd"))
            .unwrap();
        let frame = packet.to_frame();

        let mut codec = PacketCodec;
        let mut buf = BytesMut::new();

        // Feed one byte at a time; the codec must stay quiet until the
        // frame is whole, then yield exactly the original packet.
        for (idx, byte) in frame.iter().enumerate() {
            buf.put_u8(*byte);
            let decoded = codec.decode(&mut buf).unwrap();
            if idx + 1 < frame.len() {
                assert!(decoded.is_none());
            } else {
                assert_eq!(decoded.unwrap(), packet);
            }
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn codec_splits_back_to_back_packets() {
        let first = Packet::new(1, Bytes::from_static(b"xy")).unwrap();
        let second = Packet::new(8, Bytes::from_static(b"z")).unwrap();

        let mut buf = BytesMut::new();
        buf.put_slice(&first.to_frame());
        buf.put_slice(&second.to_frame());

        let mut codec = PacketCodec;
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), first);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), second);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn bounded_string_roundtrip() {
        for text in ["", "LuaRemoteTools", &"x".repeat(300)] {
            let mut out = Vec::new();
            write_bounded_string(&mut out, text).unwrap();
            let mut cur = out.as_slice();
            assert_eq!(read_bounded_string(&mut cur).unwrap(), text);
            assert!(cur.is_empty());
        }
    }

    #[test]
    fn bounded_string_echo_mismatch_rejected() {
        let mut out = Vec::new();
        write_bounded_string(&mut out, "editor").unwrap();
        out[4] ^= 0x01; // corrupt the echo byte
        let mut cur = out.as_slice();
        assert!(matches!(
            read_bounded_string(&mut cur),
            Err(ProtocolError::MalformedPacket(_))
        ));
    }

    #[test]
    fn connect_payload_roundtrip() {
        let connect = RemoteToolsConnect {
            capabilities: 3,
            persistent_id: 0xDEAD_BEEF,
            display_name: "Editor".into(),
        };
        let mut payload = Vec::new();
        connect.write_to(&mut payload).unwrap();
        assert_eq!(RemoteToolsConnect::read_from(&payload).unwrap(), connect);
    }
}
