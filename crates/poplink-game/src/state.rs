//! The aggregate match state.

use poplink_protocol::PlayerColor;
use serde::{Deserialize, Serialize};

use crate::{standard_layout, CoopBubble, CoopGamePhase};

/// Which player a value refers to, from this device's perspective.
///
/// Each device keeps its own view: my claims are `Local` here and
/// `Opponent` on the peer. Messages carry no side at all — the receiver
/// attributes an inbound claim to `Opponent` because only the opponent
/// sends messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerSide {
    Local,
    Opponent,
}

impl PlayerSide {
    /// The other player.
    pub fn other(self) -> Self {
        match self {
            Self::Local => Self::Opponent,
            Self::Opponent => Self::Local,
        }
    }
}

/// What a device knows about one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    /// Display name (no colon handling here — see the protocol crate's
    /// local-name parsing).
    pub name: String,
    /// Claim color.
    pub color: PlayerColor,
    /// Setup-screen ready flag.
    pub ready: bool,
}

impl PlayerProfile {
    /// A profile fresh off the connection screen: not ready yet.
    pub fn new(name: impl Into<String>, color: PlayerColor) -> Self {
        Self { name: name.into(), color, ready: false }
    }
}

/// The whole match as one value.
///
/// Created when the connection screen opens (phase `Waiting`), mutated
/// exclusively by [`apply`](crate::apply) from the sync coordinator's
/// single processing context, discarded on disconnect or when the user
/// backs out to the menu.
///
/// Invariant: `local_score + opponent_score + unclaimed == 44` at all
/// times — scores are *derived* from bubble ownership after every
/// applied claim, never taken from the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoopGameState {
    /// Whether this device is the advertising (host) side.
    pub is_host: bool,
    /// This device's player.
    pub local: PlayerProfile,
    /// The peer's player, once connected.
    pub opponent: Option<PlayerProfile>,
    /// Bubbles owned by `local` (derived).
    pub local_score: u32,
    /// Bubbles owned by `opponent` (derived).
    pub opponent_score: u32,
    /// The 44-bubble board.
    pub bubbles: Vec<CoopBubble>,
    /// Current phase.
    pub phase: CoopGamePhase,
    /// Local wall-clock millis when `Playing` began (0 before that).
    pub match_start_time: u64,
    /// Match length chosen by the host (0 before `GameStart`).
    pub match_duration_ms: u64,
}

impl CoopGameState {
    /// Fresh state for a newly opened connection screen.
    pub fn new(
        is_host: bool,
        player_name: impl Into<String>,
        color: PlayerColor,
    ) -> Self {
        Self {
            is_host,
            local: PlayerProfile::new(player_name, color),
            opponent: None,
            local_score: 0,
            opponent_score: 0,
            bubbles: standard_layout(),
            phase: CoopGamePhase::Waiting,
            match_start_time: 0,
            match_duration_ms: 0,
        }
    }

    /// Number of bubbles nobody owns.
    pub fn unclaimed_count(&self) -> u32 {
        self.bubbles.iter().filter(|b| b.owner.is_none()).count() as u32
    }

    /// Score of one side (derived, same source as the score fields).
    pub fn score_of(&self, side: PlayerSide) -> u32 {
        self.bubbles
            .iter()
            .filter(|b| b.owner == Some(side))
            .count() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BUBBLE_COUNT;

    #[test]
    fn test_new_state_starts_waiting_with_full_board() {
        let state = CoopGameState::new(true, "Alice", PlayerColor::Rose);

        assert!(state.is_host);
        assert_eq!(state.phase, CoopGamePhase::Waiting);
        assert_eq!(state.bubbles.len(), BUBBLE_COUNT);
        assert_eq!(state.unclaimed_count() as usize, BUBBLE_COUNT);
        assert_eq!(state.local_score, 0);
        assert_eq!(state.opponent_score, 0);
        assert!(state.opponent.is_none());
    }

    #[test]
    fn test_player_side_other_flips() {
        assert_eq!(PlayerSide::Local.other(), PlayerSide::Opponent);
        assert_eq!(PlayerSide::Opponent.other(), PlayerSide::Local);
    }

    #[test]
    fn test_new_profile_is_not_ready() {
        let profile = PlayerProfile::new("Bob", PlayerColor::Mint);
        assert!(!profile.ready);
        assert_eq!(profile.color, PlayerColor::Mint);
    }
}
