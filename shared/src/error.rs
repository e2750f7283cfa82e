//! Error types for the transport layer
//!
//! Nothing here is fatal to the process. Malformed input is dropped by the
//! listener, send failures are logged by the caller, and builder errors only
//! occur when a message is assembled without its reliability fields.

use thiserror::Error;

/// Failures of the fixed-layout big-endian codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WireError {
    /// The destination or source does not hold enough bytes
    #[error("buffer too small: needed {needed} bytes, {available} available")]
    BufferTooSmall { needed: usize, available: usize },
}

/// Reasons an inbound datagram is rejected before reaching a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("packet too short: {len} bytes (minimum {min})")]
    TooShort { len: usize, min: usize },

    #[error("unknown protocol id {0:#010x}")]
    UnknownProtocol(u32),

    #[error("checksum mismatch: {received:#010x} (received) != {expected:#010x} (expected)")]
    ChecksumMismatch { received: u32, expected: u32 },

    #[error("unknown message type {0}")]
    UnknownMessageType(u8),

    #[error("body size {declared} does not match remaining {actual} bytes")]
    BodySizeMismatch { declared: u32, actual: usize },

    #[error(transparent)]
    Wire(#[from] WireError),
}

/// A message was built without one of its required header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("required field `{0}` was not specified")]
    MissingField(&'static str),
}

/// Failures of a `Sender::write_*` call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("sender is not bound to a remote endpoint")]
    Unbound,

    #[error("session is not connected")]
    NotConnected,

    #[error("packet of {size} bytes exceeds the {max} byte limit")]
    Oversized { size: usize, max: usize },

    #[error("transport is closed")]
    Closed,

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Wire(#[from] WireError),
}
