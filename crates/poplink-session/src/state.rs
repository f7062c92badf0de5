//! Link state types observed through the handle's `watch` channels.

use poplink_transport::EndpointId;

/// Where the link currently is in its lifecycle.
///
/// Exactly one peer is supported: there is no state for "connected to
/// two endpoints", and the machine refuses operations that would imply
/// one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Idle. Nothing advertised, nothing discovered, nobody connected.
    #[default]
    Disconnected,
    /// Hosting: visible to discoverers, waiting for a request.
    Advertising,
    /// Joining: scanning for hosts.
    Discovering,
    /// A handshake is in flight (either direction).
    Connecting,
    /// Payloads flow.
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` if moving to `target` is a legal transition.
    ///
    /// `Disconnected` is reachable from everywhere (teardown is always
    /// allowed), so it is not listed per-source here.
    pub fn can_transition_to(self, target: Self) -> bool {
        if target == Self::Disconnected {
            return true;
        }
        matches!(
            (self, target),
            (Self::Disconnected, Self::Advertising)
                | (Self::Disconnected, Self::Discovering)
                | (Self::Advertising, Self::Connecting)
                | (Self::Discovering, Self::Connecting)
                | (Self::Connecting, Self::Connected)
                | (Self::Connecting, Self::Advertising)
                | (Self::Connecting, Self::Discovering)
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Advertising => write!(f, "Advertising"),
            Self::Discovering => write!(f, "Discovering"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

/// A host seen while discovering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointInfo {
    pub endpoint: EndpointId,
    /// The host's advertised local name, opaque to this layer.
    pub remote_name: String,
    /// The service the host advertises under.
    pub service_id: String,
}

/// The one connection this link is handshaking or holding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub endpoint: EndpointId,
    pub remote_name: String,
    /// Short code shown on both screens so the humans can confirm they
    /// are connecting to each other and not a stranger.
    pub auth_token: String,
    /// `true` if the peer initiated (we were advertising).
    pub incoming: bool,
}
