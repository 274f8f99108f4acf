//! # Protocol Components
//!
//! Packet framing, message fragmentation, typed debug messages, and the
//! session layer tying them together.
//!
//! ## Inbound Data Flow
//! ```text
//! raw bytes -> PacketCodec -> Packet -> Reassembler -> ObjectStream
//!           -> NetObject -> Dispatcher -> SessionEvent
//! ```
//! Outbound runs the same path in reverse, splitting encoded objects into
//! bounded fragments before framing.

pub mod dispatcher;
pub mod fragment;
pub mod messages;
pub mod packet;
pub mod session;

pub use dispatcher::Dispatcher;
pub use fragment::{Reassembler, RemoteToolsMessage, MAX_FRAGMENT_BYTES};
pub use packet::{Packet, PacketCodec, RemoteToolsConnect, TcpHeader};
pub use session::{Session, SessionCommand, SessionEvent};
