//! # Transport
//!
//! The TCP server the engine dials into. One connection is active at a
//! time; the transport pumps socket bytes into the session and session
//! frames back out, and owns graceful shutdown.

pub mod tcp;

pub use tcp::{serve, serve_with_shutdown};
