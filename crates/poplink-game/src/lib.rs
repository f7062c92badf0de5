//! Match data model and pure reducer for Poplink.
//!
//! Everything that *is* a match lives here: the fixed 44-bubble board,
//! the phase state machine, the aggregate [`CoopGameState`], and the
//! [`apply`] reducer that is the only code allowed to mutate a match.
//!
//! The reducer is a pure function over `(state, event)` with no I/O.
//! Both the optimistic local path (a tap on the screen) and the inbound
//! network path (a peer's message) flow through the exact same function,
//! so the two can never diverge in behavior.
//!
//! # Key types
//!
//! - [`CoopGameState`] — the whole match, owned by the sync coordinator
//! - [`GameEvent`] — everything that can happen to a match
//! - [`apply`] — the reducer
//! - [`CoopGamePhase`] — `Waiting → Setup → Playing ⇄ Paused → Finished`
//! - [`CoopBubble`] / [`standard_layout`] — the board

mod board;
mod phase;
mod reducer;
mod state;

pub use board::{standard_layout, CoopBubble, BUBBLE_COUNT, ROW_SIZES};
pub use phase::CoopGamePhase;
pub use reducer::{apply, GameEvent};
pub use state::{CoopGameState, PlayerProfile, PlayerSide};
