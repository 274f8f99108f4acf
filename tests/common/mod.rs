//! Shared fixtures for the integration tests.
//!
//! The schema mirrors a small slice of a real engine dump: the debug
//! message classes with their wire uuids, plus stand-in primitive and
//! container classes. Both encode and decode run against the same
//! registry, exactly as both peers share one schema in production.

#![allow(dead_code)]

use bytes::{BufMut, Bytes};

use remote_tools_protocol::core::SchemaRegistry;
use remote_tools_protocol::protocol::packet::{packet_type, Packet};

pub const SCHEMA_JSON: &str = include_str!("schema.json");

pub fn test_registry() -> SchemaRegistry {
    SchemaRegistry::from_json(SCHEMA_JSON).expect("fixture schema loads")
}

/// Frame an encoded object the way the engine does on its sending side:
/// message packets whose fragment payload carries a 16-bit size plus its
/// echo, the declared total, and the sender id.
pub fn inbound_message_frames(
    message: &[u8],
    persistent_id: u32,
    max_fragment: usize,
) -> Vec<Bytes> {
    let mut frames = Vec::new();
    let mut sent = 0usize;
    loop {
        let len = (message.len() - sent).min(max_fragment);
        let mut payload = Vec::with_capacity(len + 12);
        payload.put_u16(len as u16);
        payload.put_u16(len as u16);
        payload.put_slice(&message[sent..sent + len]);
        payload.put_u32(message.len() as u32);
        payload.put_u32(persistent_id);

        let packet = Packet::new(packet_type::REMOTE_TOOLS_MESSAGE, Bytes::from(payload))
            .expect("fragment fits a packet");
        frames.push(packet.to_frame());

        sent += len;
        if sent >= message.len() {
            break;
        }
    }
    frames
}
