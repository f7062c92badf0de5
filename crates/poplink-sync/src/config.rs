//! Sync coordinator configuration.

use std::time::Duration;

/// Tunables for the sync coordinator.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How often to send `HEARTBEAT` while a peer is connected. The
    /// heartbeat keeps the channel warm through idle stretches (setup
    /// screens, pauses); loss detection itself belongs to the link.
    pub heartbeat_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(2),
        }
    }
}
