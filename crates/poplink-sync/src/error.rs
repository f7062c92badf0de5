//! Error types for the sync layer.

use poplink_game::CoopGamePhase;
use poplink_protocol::{PlayerColor, ProtocolError};
use poplink_session::SessionError;

/// Errors surfaced by local intents on the sync coordinator.
///
/// Inbound wire problems (malformed messages, claims for bad bubbles)
/// are never errors — they are logged and dropped, because a peer's
/// mistake must not take down this device.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Claims are only legal while the match is `Playing`.
    #[error("cannot claim while {0}")]
    NotPlaying(CoopGamePhase),

    /// Only the hosting device may start the match.
    #[error("only the host can start the game")]
    NotHost,

    /// The operation belongs to the setup screen.
    #[error("not in setup (currently {0})")]
    NotInSetup(CoopGamePhase),

    /// Starting requires both players to have readied up.
    #[error("both players must be ready")]
    NotReady,

    /// The joiner tried to take the host's color. The host picks
    /// freely; the joiner picks from what is left.
    #[error("color {0} is taken by the host")]
    ColorTaken(PlayerColor),

    /// The operation is not legal in the current phase.
    #[error("invalid phase {0} for this operation")]
    InvalidPhase(CoopGamePhase),

    /// The link layer refused or failed.
    #[error("link error: {0}")]
    Session(#[from] SessionError),

    /// Encoding an outbound message failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The coordinator task is gone.
    #[error("sync coordinator is closed")]
    SyncClosed,
}
