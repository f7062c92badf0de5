//! The one-stop facade: a device in a coop session.
//!
//! `CoopNode` wires a transport, the link actor, and the sync
//! coordinator together so an embedding application deals with a single
//! object. The underlying handles stay reachable for anything the
//! facade doesn't wrap.

use poplink_game::CoopGameState;
use poplink_protocol::{encode_local_name, PlayerColor};
use poplink_session::{spawn_link, ConnectionState, LinkHandle};
use poplink_sync::{spawn_sync, SyncConfig, SyncHandle};
use poplink_transport::{EndpointId, LinkTransport};

use crate::PoplinkError;

/// Everything needed to put a device on the air.
#[derive(Debug, Clone)]
pub struct CoopNodeConfig {
    /// Service id both devices must share (hosts advertise under it,
    /// joiners scan for it).
    pub service_id: String,
    /// This player's display name.
    pub player_name: String,
    /// This player's initial claim color.
    pub color: PlayerColor,
    /// Sync coordinator tunables.
    pub sync: SyncConfig,
}

impl CoopNodeConfig {
    pub fn new(
        service_id: impl Into<String>,
        player_name: impl Into<String>,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            player_name: player_name.into(),
            color: PlayerColor::default(),
            sync: SyncConfig::default(),
        }
    }

    pub fn color(mut self, color: PlayerColor) -> Self {
        self.color = color;
        self
    }
}

/// One device in a two-device coop session.
///
/// Built as either the host (advertises, starts the match) or the
/// joiner (discovers, requests the connection). Everything after the
/// handshake is symmetric except match start, which is host-only.
pub struct CoopNode {
    link: LinkHandle,
    sync: SyncHandle,
    is_host: bool,
}

impl CoopNode {
    /// Starts a hosting node: advertising immediately, waiting for a
    /// joiner's connection request.
    pub async fn host<T: LinkTransport>(
        transport: T,
        config: CoopNodeConfig,
    ) -> Result<Self, PoplinkError> {
        let node = Self::build(transport, &config, true);
        node.link.start_hosting(&config.service_id).await?;
        Ok(node)
    }

    /// Starts a joining node: discovering immediately. Pick a host from
    /// [`link`](Self::link)'s endpoint watch and request a connection.
    pub async fn join<T: LinkTransport>(
        transport: T,
        config: CoopNodeConfig,
    ) -> Result<Self, PoplinkError> {
        let node = Self::build(transport, &config, false);
        node.link.start_discovery(&config.service_id).await?;
        Ok(node)
    }

    fn build<T: LinkTransport>(
        transport: T,
        config: &CoopNodeConfig,
        is_host: bool,
    ) -> Self {
        let local_name =
            encode_local_name(&config.player_name, config.color);
        let link = spawn_link(transport, local_name);
        let state =
            CoopGameState::new(is_host, &config.player_name, config.color);
        let sync = spawn_sync(link.clone(), state, config.sync.clone());
        Self { link, sync, is_host }
    }

    /// Whether this node is the hosting side.
    pub fn is_host(&self) -> bool {
        self.is_host
    }

    /// The connection layer (lifecycle state, endpoints, accept/reject).
    pub fn link(&self) -> &LinkHandle {
        &self.link
    }

    /// The match layer (state snapshots, claims, chat).
    pub fn sync(&self) -> &SyncHandle {
        &self.sync
    }

    /// Requests a connection to a discovered host.
    pub async fn connect_to(
        &self,
        endpoint: &EndpointId,
    ) -> Result<(), PoplinkError> {
        self.link.request_connection(endpoint).await?;
        Ok(())
    }

    /// Accepts the pending connection (after the users compared tokens).
    pub async fn accept(&self) -> Result<(), PoplinkError> {
        self.link.accept_connection().await?;
        Ok(())
    }

    /// Rejects the pending connection.
    pub async fn reject(&self) -> Result<(), PoplinkError> {
        self.link.reject_connection().await?;
        Ok(())
    }

    /// The link's current lifecycle state.
    pub fn connection_state(&self) -> ConnectionState {
        self.link.state()
    }

    /// A snapshot of the current match.
    pub fn game(&self) -> CoopGameState {
        self.sync.game()
    }

    /// Leaves the session: match forfeited, peer notified, both actors
    /// stopped.
    pub async fn leave(self) {
        self.link.disconnect().await;
        self.sync.shutdown().await;
        self.link.shutdown().await;
    }
}
