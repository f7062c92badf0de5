//! Codec trait and implementations for serializing messages.
//!
//! A codec converts between Rust types and raw bytes. The sync layer
//! doesn't care how — it just needs something implementing [`Codec`],
//! so the wire encoding can change without touching any other code.
//!
//! [`JsonCodec`] (human-readable, easy to debug on a packet capture) is
//! the default. A compact binary codec can slot in later behind the same
//! trait.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that can encode values to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because the coordinator moves the codec into
/// long-lived Tokio tasks. `DeserializeOwned` (rather than borrowed
/// `Deserialize`) because the input buffer is dropped right after
/// decoding.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// truncated, or don't match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

/// A [`Codec`] using JSON via `serde_json`.
///
/// ## Example
///
/// ```rust
/// use poplink_protocol::{Codec, CoopMessage, JsonCodec};
///
/// let codec = JsonCodec;
/// let msg = CoopMessage::Heartbeat { timestamp: 5_000 };
///
/// let bytes = codec.encode(&msg).unwrap();
/// let decoded: CoopMessage = codec.decode(&bytes).unwrap();
/// assert_eq!(msg, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
