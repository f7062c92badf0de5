//! # Poplink
//!
//! Serverless two-device cell-claiming game core: two phones (or two
//! processes) pair directly over a nearby-device medium, run a timed
//! match over a fixed 44-bubble board, and keep their views convergent
//! with nothing but timestamped messages — no server, no shared clock.
//!
//! The workspace splits along the natural seams:
//!
//! - `poplink-transport` — the medium ([`LinkTransport`]), with an
//!   in-memory implementation and a WebSocket one
//! - `poplink-protocol` — the [`CoopMessage`] wire format and codec
//! - `poplink-game` — the pure match reducer over [`CoopGameState`]
//! - `poplink-session` — the connection lifecycle actor ([`LinkHandle`])
//! - `poplink-sync` — the match synchronization actor ([`SyncHandle`])
//!
//! This crate re-exports the lot and adds [`CoopNode`], the facade that
//! wires one device end to end.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use poplink::prelude::*;
//!
//! # async fn run() -> Result<(), PoplinkError> {
//! let medium = MemoryMedium::new();
//! let host = CoopNode::host(
//!     medium.endpoint(),
//!     CoopNodeConfig::new("com.example.coop", "Alice"),
//! )
//! .await?;
//! // ... a joiner discovers, requests, both accept, the match runs.
//! # Ok(())
//! # }
//! ```

mod error;
mod node;

pub use error::PoplinkError;
pub use node::{CoopNode, CoopNodeConfig};

pub use poplink_game::{
    apply, standard_layout, CoopBubble, CoopGamePhase, CoopGameState,
    GameEvent, PlayerProfile, PlayerSide, BUBBLE_COUNT, ROW_SIZES,
};
pub use poplink_protocol::{
    encode_local_name, parse_local_name, Codec, CoopMessage, JsonCodec,
    PlayerColor, ProtocolError,
};
pub use poplink_session::{
    spawn_link, ConnectionInfo, ConnectionState, EndpointInfo, LinkHandle,
    SessionError,
};
pub use poplink_sync::{
    spawn_sync, SyncConfig, SyncError, SyncEvent, SyncHandle,
};
pub use poplink_transport::{
    EndpointId, LinkTransport, MemoryMedium, MemoryTransport,
    TransportError, TransportEvent,
};
#[cfg(feature = "websocket")]
pub use poplink_transport::{WsLinkConfig, WsLinkTransport};

/// The common imports for embedding applications.
pub mod prelude {
    pub use crate::{
        CoopGamePhase, CoopGameState, CoopMessage, CoopNode, CoopNodeConfig,
        ConnectionState, EndpointId, LinkTransport, MemoryMedium,
        PlayerColor, PlayerSide, PoplinkError, SyncConfig, SyncEvent,
    };
}
