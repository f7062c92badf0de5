//! The match phase state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle phase of a match.
///
/// ```text
/// Waiting → Setup → Playing ⇄ Paused
///                      │        │
///                      └──→ Finished ←┘
/// ```
///
/// - **Waiting**: connection screen is open, no peer yet.
/// - **Setup**: peer connected; colors and ready states are exchanged.
/// - **Playing**: the countdown is running and claims are accepted.
/// - **Paused**: countdown frozen (local intent, e.g. app backgrounded).
/// - **Finished**: timer hit zero, the peer announced the end, or the
///   peer disconnected (forfeit). Terminal — there is no resume path.
///
/// A peer disconnect forces `Finished` from *any* phase; that jump goes
/// through the reducer directly rather than [`can_transition_to`](Self::can_transition_to).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CoopGamePhase {
    #[default]
    Waiting,
    Setup,
    Playing,
    Paused,
    Finished,
}

impl CoopGamePhase {
    /// Returns `true` if claims may be applied in this phase.
    pub fn accepts_claims(&self) -> bool {
        matches!(self, Self::Playing)
    }

    /// Returns `true` if the match has reached its terminal phase.
    pub fn is_over(&self) -> bool {
        matches!(self, Self::Finished)
    }

    /// Returns `true` if moving to `target` is a legal transition.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Waiting, Self::Setup)
                | (Self::Setup, Self::Playing)
                | (Self::Playing, Self::Paused)
                | (Self::Paused, Self::Playing)
                | (Self::Playing, Self::Finished)
                | (Self::Paused, Self::Finished)
        )
    }
}

impl std::fmt::Display for CoopGamePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "Waiting"),
            Self::Setup => write!(f, "Setup"),
            Self::Playing => write!(f, "Playing"),
            Self::Paused => write!(f, "Paused"),
            Self::Finished => write!(f, "Finished"),
        }
    }
}
