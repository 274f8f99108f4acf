//! # Remote Tools Protocol
//!
//! Schema-driven binary wire protocol for attaching a development tool to
//! a running game-engine process over TCP, reproducing the engine's
//! object-serialization wire format exactly.
//!
//! The engine describes its reflected types in a self-describing schema
//! (uuid, version, fields, container kinds). This crate loads that schema
//! once, then encodes and decodes whole object graphs against it without
//! ever having compiled the engine's types.
//!
//! ## Layers
//! - [`core`]: schema registry, element codec, and the recursive object
//!   stream (the bit-exact heart of the crate)
//! - [`protocol`]: packet framing, message fragmentation and reassembly,
//!   typed debug messages, and the session dispatcher
//! - [`transport`]: the single-connection TCP server the engine dials
//!
//! ## Quick Start
//! ```no_run
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use remote_tools_protocol::core::SchemaRegistry;
//! use remote_tools_protocol::transport;
//!
//! #[tokio::main]
//! async fn main() -> remote_tools_protocol::error::Result<()> {
//!     let registry = Arc::new(SchemaRegistry::load_from_file("classes.json")?);
//!     let (events_tx, mut events_rx) = mpsc::unbounded_channel();
//!     let (_commands_tx, commands_rx) = mpsc::unbounded_channel();
//!
//!     tokio::spawn(async move {
//!         while let Some(event) = events_rx.recv().await {
//!             println!("{event:?}");
//!         }
//!     });
//!
//!     transport::serve("127.0.0.1:6777", registry, events_tx, commands_rx).await
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod utils;

pub use crate::config::ProbeConfig;
pub use crate::core::{NetObject, ObjectStream, SchemaRegistry, Value};
pub use crate::error::{ProtocolError, Result};
pub use crate::protocol::{Session, SessionCommand, SessionEvent};
