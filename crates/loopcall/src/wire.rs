//! Frame types and framing for the pipe dispatch path.
//!
//! The loopback channel carries an undifferentiated byte stream, so the pipe
//! client and server delimit messages with a fixed-width length prefix: a
//! little-endian `u32` followed by that many body bytes. The body is one
//! codec-encoded [`RequestFrame`] or [`ReplyFrame`].

use bytes::{Buf, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::CallError;
use crate::transport::TransportError;

/// Maximum accepted frame body length (16 MB).
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const PREFIX_LEN: usize = 4;

/// One encoded request crossing the pipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Correlates the reply with the request.
    pub id: u64,
    /// Dotted `"Service.Method"` key.
    pub method: String,
    /// Codec-encoded argument payload.
    pub params: Vec<u8>,
}

/// One encoded reply crossing the pipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyFrame {
    /// Id of the request this answers.
    pub id: u64,
    /// Set iff the dispatch failed; `result` is empty in that case.
    pub error: Option<WireError>,
    /// Codec-encoded reply payload.
    pub result: Vec<u8>,
}

/// Serializable rendition of a [`CallError`], preserving the error kind
/// across the pipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub kind: WireErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireErrorKind {
    MalformedKey,
    ServiceNotFound,
    MethodNotFound,
    Decode,
    Encode,
    Handler,
}

impl From<&CallError> for WireError {
    fn from(err: &CallError) -> Self {
        let (kind, message) = match err {
            CallError::MalformedKey(key) => (WireErrorKind::MalformedKey, key.clone()),
            CallError::ServiceNotFound(service) => {
                (WireErrorKind::ServiceNotFound, service.clone())
            }
            CallError::MethodNotFound(key) => (WireErrorKind::MethodNotFound, key.clone()),
            CallError::Decode(msg) => (WireErrorKind::Decode, msg.clone()),
            CallError::Encode(msg) => (WireErrorKind::Encode, msg.clone()),
            CallError::Handler(msg) => (WireErrorKind::Handler, msg.clone()),
            // Local-only failures never originate from a dispatch, but the
            // mapping must stay total; render them as handler failures.
            CallError::Transport(e) => (WireErrorKind::Handler, e.to_string()),
            CallError::Aborted => (WireErrorKind::Handler, err.to_string()),
        };
        WireError { kind, message }
    }
}

impl From<WireError> for CallError {
    fn from(err: WireError) -> Self {
        match err.kind {
            WireErrorKind::MalformedKey => CallError::MalformedKey(err.message),
            WireErrorKind::ServiceNotFound => CallError::ServiceNotFound(err.message),
            WireErrorKind::MethodNotFound => CallError::MethodNotFound(err.message),
            WireErrorKind::Decode => CallError::Decode(err.message),
            WireErrorKind::Encode => CallError::Encode(err.message),
            WireErrorKind::Handler => CallError::Handler(err.message),
        }
    }
}

/// Prefix `body` with its little-endian `u32` length.
///
/// Bodies above [`MAX_FRAME_LEN`] are refused here, on the sending side;
/// the receiving side would reject the frame anyway.
pub fn encode_frame(body: &[u8]) -> Result<Vec<u8>, TransportError> {
    if body.len() > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(body.len()));
    }
    let mut framed = Vec::with_capacity(PREFIX_LEN + body.len());
    framed.extend_from_slice(&(body.len() as u32).to_le_bytes());
    framed.extend_from_slice(body);
    Ok(framed)
}

/// Extract the next complete frame body from `acc`, if one has fully
/// arrived. Leaves partial frames untouched.
pub fn take_frame(acc: &mut BytesMut) -> Result<Option<Bytes>, TransportError> {
    if acc.len() < PREFIX_LEN {
        return Ok(None);
    }
    let len = u32::from_le_bytes([acc[0], acc[1], acc[2], acc[3]]) as usize;
    if len > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(len));
    }
    if acc.len() < PREFIX_LEN + len {
        return Ok(None);
    }
    acc.advance(PREFIX_LEN);
    Ok(Some(acc.split_to(len).freeze()))
}
