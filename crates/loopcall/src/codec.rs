//! Codec boundary for the serialization of arguments, replies, and wire
//! frames.
//!
//! The dispatch core only needs "encode a value to bytes" and "decode bytes
//! into a concrete type"; everything else about the wire format is the
//! codec's business. Argument and reply types qualify for registration
//! exactly when the codec can represent them, which for serde-based codecs
//! means `DeserializeOwned` arguments and `Serialize` replies.

use serde::{de::DeserializeOwned, Serialize};

/// Codec for value serialization.
///
/// Implementations are stateless; both methods are associated functions so a
/// codec can be selected purely at the type level.
pub trait Codec: Send + Sync + 'static {
    /// Short format name, used in diagnostics.
    const NAME: &'static str;

    /// Error type returned by encode and decode operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Encode a value into bytes.
    fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, Self::Error>;

    /// Decode bytes into a value.
    fn decode<T: DeserializeOwned>(buf: &[u8]) -> Result<T, Self::Error>;
}

/// JSON codec: human-readable format using serde_json.
///
/// This is the default codec. Messages can be inspected as text, which makes
/// the loopback traffic easy to debug.
pub struct JsonCodec;

impl Codec for JsonCodec {
    const NAME: &'static str = "json";
    type Error = serde_json::Error;

    fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, Self::Error> {
        serde_json::to_vec(value)
    }

    fn decode<T: DeserializeOwned>(buf: &[u8]) -> Result<T, Self::Error> {
        serde_json::from_slice(buf)
    }
}

/// Postcard codec: compact binary format.
///
/// Smaller and faster than JSON, but not human-readable.
pub struct PostcardCodec;

impl Codec for PostcardCodec {
    const NAME: &'static str = "postcard";
    type Error = postcard::Error;

    fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, Self::Error> {
        postcard::to_allocvec(value)
    }

    fn decode<T: DeserializeOwned>(buf: &[u8]) -> Result<T, Self::Error> {
        postcard::from_bytes(buf)
    }
}
