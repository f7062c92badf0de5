//! Error types for the link layer.

use poplink_transport::TransportError;

use crate::ConnectionState;

/// Errors surfaced by link operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The operation is not legal in the link's current state.
    /// For example, `request_connection` while not discovering.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: ConnectionState,
    },

    /// Tried to send a payload with no peer connected. The link state
    /// is left untouched.
    #[error("no peer connected")]
    NotConnected,

    /// Accept/reject with no handshake in flight.
    #[error("no pending connection")]
    NoPendingConnection,

    /// The named endpoint is not in the discovered list.
    #[error("unknown endpoint {0}")]
    UnknownEndpoint(String),

    /// The underlying transport failed.
    #[error("transport error")]
    Transport(#[from] TransportError),

    /// The link actor is gone (its task stopped).
    #[error("link is closed")]
    LinkClosed,
}
