//! Top-level error type.

use poplink_protocol::ProtocolError;
use poplink_session::SessionError;
use poplink_sync::SyncError;

/// Any error a [`CoopNode`](crate::CoopNode) operation can produce.
#[derive(Debug, thiserror::Error)]
pub enum PoplinkError {
    /// The connection layer failed or refused.
    #[error("session error")]
    Session(#[from] SessionError),

    /// The sync layer failed or refused.
    #[error("sync error")]
    Sync(#[from] SyncError),

    /// Wire encoding or name parsing failed.
    #[error("protocol error")]
    Protocol(#[from] ProtocolError),
}
