//! # Error Types
//!
//! Comprehensive error handling for the remote tools protocol.
//!
//! This module defines all error variants that can occur during protocol
//! operations, from low-level I/O errors to schema and codec violations.
//!
//! ## Error Categories
//! - **I/O Errors**: Network and file system failures
//! - **Stream Errors**: Bad stream tag, version mismatch, malformed elements
//! - **Schema Errors**: Unknown or unclassifiable class descriptors
//! - **Framing Errors**: Oversized packets, fragment overflow
//!
//! All errors implement `std::error::Error` for interoperability. None of
//! them are retried inside the crate: malformed framing or unknown-uuid
//! errors terminate the current decode and are surfaced to the caller, who
//! decides whether to drop the connection.

use std::io;
use thiserror::Error;
use uuid::Uuid;

/// ProtocolError is the primary error type for all protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The object stream did not start with the expected binary stream tag.
    #[error("bad stream tag: {0:#04x}")]
    BadStreamTag(u8),

    /// The object stream carries a format version this build does not speak.
    #[error("stream version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },

    /// A data element violated the flags-byte invariants.
    #[error("malformed element: {0}")]
    MalformedElement(String),

    /// A type uuid referenced by the stream is absent from the registry.
    /// Fatal for the in-flight decode; the caller may drop and resync.
    #[error("unknown type uuid: {0}")]
    UnknownTypeUuid(Uuid),

    /// A descriptor fits none of the codec categories.
    #[error("class {name} ({uuid}) fits no codec category")]
    UnclassifiableClass { name: String, uuid: Uuid },

    /// A value's byte length cannot be represented in the available
    /// size-field widths.
    #[error("value size {0} cannot be represented on the wire")]
    UnsupportedSize(usize),

    /// Accumulated fragment bytes exceeded the declared message total.
    #[error("fragment overflow: declared {declared} bytes, accumulated {accumulated}")]
    FragmentOverflow { declared: u32, accumulated: usize },

    /// A packet or fragment payload violated the framing layout.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error("packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("serialize error: {0}")]
    SerializeError(String),

    #[error("deserialize error: {0}")]
    DeserializeError(String),

    #[error("schema error: {0}")]
    SchemaError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    /// A decoded object's uuid has no registered handler.
    #[error("no handler for object with uuid {0}")]
    UnexpectedMessage(Uuid),

    #[error("connection closed")]
    ConnectionClosed,
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
