//! Core protocol types for Poplink's wire format.
//!
//! This module defines everything that travels between the two devices:
//! the [`CoopMessage`] tagged union and the [`PlayerColor`] palette, plus
//! the local-name string a device advertises about itself.
//!
//! Both devices run the exact same reducer over the exact same message
//! vocabulary — the wire format below is the entire shared truth of a
//! match. Notably absent: the board layout. Both sides compute the
//! 44-bubble grid from the same constant; it is never transmitted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Player colors
// ---------------------------------------------------------------------------

/// The color a player claims bubbles with.
///
/// The palette is a fixed shared constant. On the wire a color is its
/// SCREAMING_SNAKE_CASE name (`"ROSE"`), which is also what gets packed
/// into the advertised local name.
///
/// The host may pick any color; the joiner's choices exclude whatever
/// the host has already broadcast (see the sync coordinator).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerColor {
    /// The default color a profile starts with before selection.
    #[default]
    Rose,
    Mint,
    Sky,
    Amber,
    Lilac,
    Coral,
}

impl PlayerColor {
    /// The full palette, in display order.
    pub const ALL: [PlayerColor; 6] = [
        PlayerColor::Rose,
        PlayerColor::Mint,
        PlayerColor::Sky,
        PlayerColor::Amber,
        PlayerColor::Lilac,
        PlayerColor::Coral,
    ];

    /// The colors a joiner may pick once the host holds `taken`.
    pub fn available_against(taken: PlayerColor) -> Vec<PlayerColor> {
        Self::ALL.iter().copied().filter(|c| *c != taken).collect()
    }

    /// The wire/display name, e.g. `"ROSE"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerColor::Rose => "ROSE",
            PlayerColor::Mint => "MINT",
            PlayerColor::Sky => "SKY",
            PlayerColor::Amber => "AMBER",
            PlayerColor::Lilac => "LILAC",
            PlayerColor::Coral => "CORAL",
        }
    }
}

impl fmt::Display for PlayerColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlayerColor {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ROSE" => Ok(PlayerColor::Rose),
            "MINT" => Ok(PlayerColor::Mint),
            "SKY" => Ok(PlayerColor::Sky),
            "AMBER" => Ok(PlayerColor::Amber),
            "LILAC" => Ok(PlayerColor::Lilac),
            "CORAL" => Ok(PlayerColor::Coral),
            other => Err(ProtocolError::BadLocalName(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Local-name encoding
// ---------------------------------------------------------------------------

/// Builds the advertised local name: `"<player>:<color>"`.
///
/// The name is the only piece of profile information that crosses the
/// link before a match starts, so the peer can show "connect to Alice
/// (rose)?" during the accept prompt.
pub fn encode_local_name(player_name: &str, color: PlayerColor) -> String {
    format!("{player_name}:{color}")
}

/// Parses an advertised local name by splitting on the **last** colon.
///
/// Splitting on the last colon means a player name containing a colon
/// mostly survives; a *color* name never contains one. A display name
/// whose final segment happens to spell a palette color is a documented
/// limitation carried over from the name format itself.
///
/// # Errors
/// Returns [`ProtocolError::BadLocalName`] when there is no colon or the
/// trailing segment is not a palette color.
pub fn parse_local_name(
    name: &str,
) -> Result<(String, PlayerColor), ProtocolError> {
    let (player, color) = name
        .rsplit_once(':')
        .ok_or_else(|| ProtocolError::BadLocalName(name.to_string()))?;
    let color = PlayerColor::from_str(color)?;
    Ok((player.to_string(), color))
}

// ---------------------------------------------------------------------------
// CoopMessage — the wire tagged union
// ---------------------------------------------------------------------------

/// Every message two paired devices exchange during a match.
///
/// `#[serde(tag = "type")]` produces internally tagged JSON, so a claim
/// looks like:
///
/// ```json
/// { "type": "BUBBLE_CLAIM", "bubbleId": 10, "playerColor": "ROSE", "timestamp": 100 }
/// ```
///
/// Every variant carries a mandatory `timestamp`: the **sender-local**
/// wall-clock in milliseconds at send time. There is no shared clock —
/// timestamps are only ever compared against other timestamps recorded
/// for the *same bubble* (the staleness guard), never used for global
/// ordering. Remaining fields default when absent so an older peer
/// omitting one still decodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum CoopMessage {
    /// Free-form text shown in the in-match chat strip.
    Chat {
        #[serde(default)]
        content: String,
        timestamp: u64,
    },

    /// "I own bubble `bubble_id` as of `timestamp`."
    ///
    /// The receiver applies it unless its recorded state for that bubble
    /// is newer — last-generated-claim-wins.
    BubbleClaim {
        #[serde(default)]
        bubble_id: u8,
        #[serde(default)]
        player_color: PlayerColor,
        timestamp: u64,
    },

    /// Host → joiner: the match starts now and runs for `duration_ms`.
    /// Each side counts down independently from its own receipt time.
    GameStart {
        #[serde(default)]
        duration_ms: u64,
        timestamp: u64,
    },

    /// Whichever side's countdown hits zero first announces the end.
    /// The scores are the sender's view, advisory only — the receiver
    /// freezes its own derived scores.
    GameEnd {
        #[serde(default)]
        local_score: u32,
        #[serde(default)]
        remote_score: u32,
        timestamp: u64,
    },

    /// Advisory score snapshot (e.g. a reconciliation ping while
    /// paused). Never trusted: scores are always recomputed from bubble
    /// ownership.
    ScoreUpdate {
        #[serde(default)]
        local_score: u32,
        #[serde(default)]
        remote_score: u32,
        timestamp: u64,
    },

    /// Sent during setup when a player picks their color.
    ColorSelection {
        #[serde(default)]
        player_color: PlayerColor,
        timestamp: u64,
    },

    /// Sent during setup when a player toggles ready.
    ReadyState {
        #[serde(default)]
        ready: bool,
        timestamp: u64,
    },

    /// Periodic liveness ping while connected. Supplementary — the
    /// transport's disconnect callback stays authoritative.
    Heartbeat { timestamp: u64 },
}

impl CoopMessage {
    /// The sender-local send time carried by every message.
    pub fn timestamp(&self) -> u64 {
        match self {
            CoopMessage::Chat { timestamp, .. }
            | CoopMessage::BubbleClaim { timestamp, .. }
            | CoopMessage::GameStart { timestamp, .. }
            | CoopMessage::GameEnd { timestamp, .. }
            | CoopMessage::ScoreUpdate { timestamp, .. }
            | CoopMessage::ColorSelection { timestamp, .. }
            | CoopMessage::ReadyState { timestamp, .. }
            | CoopMessage::Heartbeat { timestamp } => *timestamp,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
