//! Game state synchronization for Poplink.
//!
//! The sync coordinator sits between the link (bytes to one peer) and
//! the match (the pure reducer in `poplink-game`). It is the single
//! processing context the reducer demands: local intents and inbound
//! wire messages are both translated into reducer events here, applied
//! in arrival order, and every applied event produces a fresh state
//! snapshot on a `watch` channel.
//!
//! Local intents apply *optimistically* — a tap claims the bubble on
//! this screen immediately, then the claim goes out on the wire. The
//! staleness guard in the reducer is what keeps the two optimistic
//! views convergent.
//!
//! Scores are always derived from bubble ownership on this device.
//! `SCORE_UPDATE` messages from the peer are consistency *checks*, never
//! inputs.

mod config;
mod coordinator;
mod error;

pub use config::SyncConfig;
pub use coordinator::{spawn_sync, SyncEvent, SyncHandle};
pub use error::SyncError;
