//! # Message Fragmentation
//!
//! An encoded object can outgrow the 16-bit packet size field, so the
//! message packet type carries it as one or more bounded fragments. Every
//! fragment of a logical message declares the same total message size and
//! the sender's persistent id; fragments arrive in order over the single
//! TCP stream, so reassembly is a sequential append.
//!
//! Most messages fit one fragment; `fragment == total` is the fast path.
//!
//! The two directions frame the fragment size differently (verified
//! against the live peer): inbound fragments carry a 16-bit size plus a
//! 16-bit echo, outbound fragments a single 32-bit size.

use bytes::{Buf, BufMut, Bytes};
use tracing::{debug, trace};

use crate::error::{ProtocolError, Result};
use crate::protocol::packet::{packet_type, Packet};

/// Largest fragment payload we will put on the wire; leaves room under the
/// 16-bit packet ceiling for header and trailer overhead.
pub const MAX_FRAGMENT_BYTES: usize = 16384 - 384;

/// Bytes added around the fragment on the outbound wire form.
const OUTBOUND_OVERHEAD: usize = 4 + 4 + 4;

/// One fragment of a logical message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteToolsMessage {
    pub fragment: Bytes,
    /// Full length of the logical message this fragment belongs to.
    pub total_size: u32,
    /// Stable hash identifying the sender across the connection.
    pub persistent_id: u32,
}

impl RemoteToolsMessage {
    /// Whether this fragment alone is the whole message.
    pub fn is_complete(&self) -> bool {
        self.fragment.len() as u32 == self.total_size
    }

    /// Parse an inbound message-packet payload.
    pub fn read_from(payload: &[u8]) -> Result<Self> {
        let mut cur = payload;
        need(cur, 4, "fragment size")?;
        let size = cur.get_u16() as usize;
        let echo = cur.get_u16() as usize;
        if size != echo {
            return Err(ProtocolError::MalformedPacket(format!(
                "fragment size fields disagree: {size} vs {echo}"
            )));
        }
        if size > MAX_FRAGMENT_BYTES {
            return Err(ProtocolError::OversizedPacket(size));
        }
        need(cur, size, "fragment bytes")?;
        let fragment = Bytes::copy_from_slice(&cur[..size]);
        cur.advance(size);
        need(cur, 8, "fragment trailer")?;
        let total_size = cur.get_u32();
        let persistent_id = cur.get_u32();
        Ok(Self {
            fragment,
            total_size,
            persistent_id,
        })
    }

    /// Serialize the outbound wire form.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.put_u32(self.fragment.len() as u32);
        out.put_slice(&self.fragment);
        out.put_u32(self.total_size);
        out.put_u32(self.persistent_id);
    }

    pub fn wire_size(&self) -> usize {
        self.fragment.len() + OUTBOUND_OVERHEAD
    }

    /// Wrap this fragment in a message packet.
    pub fn to_packet(&self) -> Result<Packet> {
        let mut payload = Vec::with_capacity(self.wire_size());
        self.write_to(&mut payload);
        Packet::new(packet_type::REMOTE_TOOLS_MESSAGE, Bytes::from(payload))
    }
}

/// Split an encoded message into wire fragments.
///
/// Every fragment carries the same total size and sender id. An empty
/// message still yields one (empty, already complete) fragment so the
/// receiver observes it.
pub fn split_message(persistent_id: u32, message: &[u8]) -> Vec<RemoteToolsMessage> {
    let total_size = message.len() as u32;
    let mut fragments = Vec::with_capacity(message.len() / MAX_FRAGMENT_BYTES + 1);
    let mut sent = 0usize;
    loop {
        let len = (message.len() - sent).min(MAX_FRAGMENT_BYTES);
        fragments.push(RemoteToolsMessage {
            fragment: Bytes::copy_from_slice(&message[sent..sent + len]),
            total_size,
            persistent_id,
        });
        sent += len;
        if sent >= message.len() {
            break;
        }
    }
    trace!(
        total_size,
        fragments = fragments.len(),
        "split outbound message"
    );
    fragments
}

/// Reassembly progress for one logical message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReassemblyState {
    Idle,
    Accumulating,
}

/// Accumulates ordered fragments until a logical message is whole.
///
/// Created lazily per connection, reset after each completed message or on
/// teardown. Completion fires exactly once per message.
#[derive(Debug, Default)]
pub struct Reassembler {
    buffer: Vec<u8>,
    expected_total: u32,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ReassemblyState {
        if self.buffer.is_empty() && self.expected_total == 0 {
            ReassemblyState::Idle
        } else {
            ReassemblyState::Accumulating
        }
    }

    /// Feed one fragment; returns the whole message once the accumulated
    /// bytes reach the declared total.
    ///
    /// Accumulating more than the declared total, or a fragment declaring
    /// a different total mid-message, is a fatal framing error for the
    /// connection.
    pub fn push(&mut self, msg: &RemoteToolsMessage) -> Result<Option<Bytes>> {
        if self.state() == ReassemblyState::Idle {
            if msg.is_complete() {
                return Ok(Some(msg.fragment.clone()));
            }
            self.expected_total = msg.total_size;
        } else if msg.total_size != self.expected_total {
            return Err(ProtocolError::MalformedPacket(format!(
                "fragment declares total {} while reassembling {}",
                msg.total_size, self.expected_total
            )));
        }

        self.buffer.extend_from_slice(&msg.fragment);
        if self.buffer.len() > self.expected_total as usize {
            let err = ProtocolError::FragmentOverflow {
                declared: self.expected_total,
                accumulated: self.buffer.len(),
            };
            self.reset();
            return Err(err);
        }
        if self.buffer.len() == self.expected_total as usize {
            debug!(
                total = self.expected_total,
                "reassembled fragmented message"
            );
            let whole = Bytes::from(std::mem::take(&mut self.buffer));
            self.reset();
            return Ok(Some(whole));
        }
        Ok(None)
    }

    /// Drop any partial message (connection teardown).
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.expected_total = 0;
    }
}

fn need(cur: &[u8], bytes: usize, what: &str) -> Result<()> {
    if cur.len() < bytes {
        return Err(ProtocolError::MalformedPacket(format!(
            "truncated fragment while reading {what}"
        )));
    }
    Ok(())
}
