//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding wire data.
///
/// A decode failure is never fatal to the receiver: the sync coordinator
/// drops the offending payload with a logged warning and keeps going.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a message into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, missing fields, wrong
    /// types, or a truncated payload.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// An advertised local name did not match `"<player>:<color>"` with
    /// a known color after the last colon.
    #[error("bad local name: {0:?}")]
    BadLocalName(String),
}
