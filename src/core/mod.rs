//! # Core Serialization Components
//!
//! The schema registry and the binary object codec.
//!
//! This module is the heart of the crate: it models the engine's reflected
//! type metadata and walks it to produce or consume the engine's
//! tagged-element byte stream, without ever having compiled the engine's
//! types.
//!
//! ## Components
//! - **Schema**: class descriptors, codec classification, registry
//! - **Element**: one tagged wire record (flags, name hash, uuid, value)
//! - **ObjectStream**: recursive whole-object encode/decode
//! - **Value**: the flat positional value tree at the language boundary
//!
//! ## Wire Format
//! ```text
//! [Tag(1)] [Version(4)] [Element...] [End(1)]
//! ```

pub mod element;
pub mod object_stream;
pub mod schema;
pub mod value;

pub use object_stream::ObjectStream;
pub use schema::{ClassDescriptor, ClassField, CodecKind, SchemaRegistry};
pub use value::{NetObject, Value};
