//! The pure match reducer.
//!
//! `apply(state, event)` is the single mutation point for a match. The
//! sync coordinator feeds it from exactly one processing context, with
//! local intents and inbound messages translated into the same
//! [`GameEvent`] vocabulary — so an optimistic local claim and the
//! peer's copy of that claim take the identical code path.
//!
//! Invalid events (wrong phase, out-of-range bubble, stale claim) are
//! *ignored*, with a debug log. They never panic and never error: over a
//! real link, a late or nonsensical message is ordinary weather, not an
//! exceptional condition.

use tracing::debug;

use crate::{CoopGamePhase, CoopGameState, PlayerSide};
use poplink_protocol::PlayerColor;

/// Everything that can happen to a match.
///
/// Matched exhaustively below — adding a variant without handling it is
/// a compile error, which is the point of the tagged-union design.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    /// The peer connected; the connection screen's metadata names them.
    OpponentJoined {
        name: String,
        color: PlayerColor,
    },

    /// A player picked a color during setup.
    ColorSelected {
        side: PlayerSide,
        color: PlayerColor,
    },

    /// A player toggled ready during setup.
    ReadyChanged {
        side: PlayerSide,
        ready: bool,
    },

    /// The match begins: countdown of `duration_ms` starting at the
    /// *local* wall-clock `now_ms`. Each device anchors its own
    /// countdown to its own receipt time — there is no shared clock.
    Started {
        duration_ms: u64,
        now_ms: u64,
    },

    /// A claim on one bubble, from either side, stamped with the
    /// claimant's send time.
    Claim {
        side: PlayerSide,
        bubble_id: u8,
        timestamp: u64,
    },

    /// Countdown frozen by a local intent.
    Paused,

    /// Countdown resumed.
    Resumed,

    /// The match ended normally (a timer reached zero, here or there).
    Finished,

    /// The peer is gone mid-session. Forces `Finished` from any phase —
    /// a forfeit, with no resume path.
    PeerDisconnected,
}

/// Applies one event to the match. The only function that mutates
/// [`CoopGameState`].
pub fn apply(state: &mut CoopGameState, event: GameEvent) {
    match event {
        GameEvent::OpponentJoined { name, color } => {
            if !state.phase.can_transition_to(CoopGamePhase::Setup) {
                debug!(phase = %state.phase, "opponent joined in wrong phase, ignoring");
                return;
            }
            state.opponent =
                Some(crate::PlayerProfile::new(name, color));
            state.phase = CoopGamePhase::Setup;
        }

        GameEvent::ColorSelected { side, color } => {
            if state.phase != CoopGamePhase::Setup {
                debug!(phase = %state.phase, "color selection outside setup, ignoring");
                return;
            }
            match side {
                PlayerSide::Local => state.local.color = color,
                PlayerSide::Opponent => {
                    if let Some(opponent) = &mut state.opponent {
                        opponent.color = color;
                    }
                }
            }
        }

        GameEvent::ReadyChanged { side, ready } => {
            if state.phase != CoopGamePhase::Setup {
                debug!(phase = %state.phase, "ready toggle outside setup, ignoring");
                return;
            }
            match side {
                PlayerSide::Local => state.local.ready = ready,
                PlayerSide::Opponent => {
                    if let Some(opponent) = &mut state.opponent {
                        opponent.ready = ready;
                    }
                }
            }
        }

        GameEvent::Started { duration_ms, now_ms } => {
            if !state.phase.can_transition_to(CoopGamePhase::Playing) {
                debug!(phase = %state.phase, "start in wrong phase, ignoring");
                return;
            }
            state.phase = CoopGamePhase::Playing;
            state.match_start_time = now_ms;
            state.match_duration_ms = duration_ms;
        }

        GameEvent::Claim { side, bubble_id, timestamp } => {
            apply_claim(state, side, bubble_id, timestamp);
        }

        GameEvent::Paused => {
            if state.phase.can_transition_to(CoopGamePhase::Paused) {
                state.phase = CoopGamePhase::Paused;
            }
        }

        GameEvent::Resumed => {
            if state.phase == CoopGamePhase::Paused {
                state.phase = CoopGamePhase::Playing;
            }
        }

        GameEvent::Finished => {
            if state.phase.can_transition_to(CoopGamePhase::Finished) {
                state.phase = CoopGamePhase::Finished;
            }
        }

        GameEvent::PeerDisconnected => {
            // Forfeit: jumps the machine from anywhere. Idempotent.
            state.phase = CoopGamePhase::Finished;
        }
    }
}

/// The conflict-resolution core: last-generated-claim-wins, guarded per
/// bubble against staleness.
///
/// A claim at `timestamp` is applied unless it is *strictly older* than
/// the timestamp already recorded on that bubble. With no shared clock
/// and no arbiter this is the only ordering available, and it is enough
/// for convergence: once claims stop flying for a bubble, both devices
/// end up holding the claim with the greatest timestamp either has seen.
/// Simultaneous claims may flicker briefly before converging — accepted.
///
/// An exact timestamp tie between crossed claims has no "last" claim, so
/// it gets a deterministic winner instead: the host's claim takes the
/// bubble on both devices. Without that rule each device would apply the
/// other's claim second and the boards would disagree forever.
fn apply_claim(
    state: &mut CoopGameState,
    side: PlayerSide,
    bubble_id: u8,
    timestamp: u64,
) {
    if !state.phase.accepts_claims() {
        debug!(bubble_id, phase = %state.phase, "claim outside Playing, ignoring");
        return;
    }
    let claimant_is_host = match side {
        PlayerSide::Local => state.is_host,
        PlayerSide::Opponent => !state.is_host,
    };
    let Some(bubble) = state.bubbles.get_mut(bubble_id as usize) else {
        debug!(bubble_id, "claim for out-of-range bubble, ignoring");
        return;
    };
    if bubble.owner == Some(side) {
        // Re-claiming your own bubble is a no-op; don't refresh the
        // timestamp, or a slow peer claim could never win it back.
        return;
    }
    if bubble.owner.is_some() && timestamp < bubble.transition_start_time {
        debug!(
            bubble_id,
            stale = timestamp,
            recorded = bubble.transition_start_time,
            "stale claim, ignoring"
        );
        return;
    }
    if bubble.owner.is_some()
        && timestamp == bubble.transition_start_time
        && !claimant_is_host
    {
        debug!(bubble_id, timestamp, "timestamp tie, host keeps the bubble");
        return;
    }

    bubble.owner = Some(side);
    bubble.is_transitioning = true;
    bubble.transition_start_time = timestamp;

    // Scores are derived, never accumulated, so a claim that flips a
    // bubble between owners cannot drift the totals.
    state.local_score = state.score_of(PlayerSide::Local);
    state.opponent_score = state.score_of(PlayerSide::Opponent);
}

// =========================================================================
// Tests
// =========================================================================
