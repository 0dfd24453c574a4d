//! In-memory transport used by the pipe dispatch path.
//!
//! The only backend is the loopback channel: two unidirectional byte buffers
//! with single-slot readiness signalling. See [`loopback`].

use std::fmt;

pub mod loopback;

pub use loopback::{LoopbackChannel, LoopbackEndpoint};

/// Errors surfaced by the loopback transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The channel was closed; no further data will arrive.
    Closed,

    /// A read waited longer than the channel's configured timeout.
    Timeout,

    /// An incoming frame declared a length above the accepted maximum.
    FrameTooLarge(usize),

    /// An incoming frame body could not be decoded; the stream is no longer
    /// trustworthy and must be shut down.
    Malformed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Closed => f.write_str("channel closed"),
            TransportError::Timeout => f.write_str("read timed out waiting for data"),
            TransportError::FrameTooLarge(len) => {
                write!(f, "frame of {len} bytes exceeds the maximum")
            }
            TransportError::Malformed => f.write_str("malformed frame on the stream"),
        }
    }
}

impl std::error::Error for TransportError {}
