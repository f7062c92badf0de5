//! Transport abstraction layer for Poplink.
//!
//! Poplink never talks to a radio directly. The connection manager consumes
//! the narrow [`LinkTransport`] surface — advertise, discover, request,
//! accept/reject, send, disconnect — and receives everything the medium
//! reports back as a stream of [`TransportEvent`]s. Discovery retries,
//! radio switching, and byte delivery are the transport's problem.
//!
//! Two reference implementations ship with this crate:
//!
//! - [`MemoryMedium`] — an in-process "air" shared by any number of
//!   endpoints. Deterministic, used by the test suites and the demo.
//! - [`WsLinkTransport`] — a LAN link over WebSocket for two real
//!   processes (feature `websocket`, default on).
//!
//! # Feature Flags
//!
//! - `websocket` (default) — WebSocket link via `tokio-tungstenite`

mod error;
mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use memory::{MemoryMedium, MemoryTransport};
#[cfg(feature = "websocket")]
pub use websocket::{WsLinkConfig, WsLinkTransport};

use std::fmt;
use std::future::Future;

use rand::Rng;
use tokio::sync::mpsc;

/// Result of a connection attempt, success.
pub const STATUS_OK: i32 = 0;
/// Result of a connection attempt, rejected by one side.
pub const STATUS_CONNECTION_REJECTED: i32 = 8004;
/// Result of a connection attempt, generic transport failure.
pub const STATUS_ERROR: i32 = 13;

/// Opaque identifier the medium assigns to a reachable endpoint.
///
/// Endpoint ids are short opaque strings minted by the transport, not by
/// us. They are only meaningful for the lifetime of one discovery or
/// connection — never persist them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointId(String);

impl EndpointId {
    /// Creates an `EndpointId` from a raw string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything a transport can report back to the connection manager.
///
/// These correspond one-to-one to the callback surface of a
/// nearby-devices stack: connection lifecycle, payload delivery, and
/// endpoint discovery. Events for one transport instance arrive on a
/// single channel so the consumer observes them in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A connection is being established with `endpoint` and needs an
    /// explicit accept or reject from this side. Fires on both the
    /// requesting and the receiving device.
    ConnectionInitiated {
        /// The remote endpoint.
        endpoint: EndpointId,
        /// The remote device's advertised local name.
        remote_name: String,
        /// Short shared token both users can compare out of band.
        auth_token: String,
        /// `true` when the remote side initiated the request.
        incoming: bool,
    },

    /// The connection attempt with `endpoint` finished.
    ConnectionResult {
        /// The remote endpoint.
        endpoint: EndpointId,
        /// Whether the connection is now usable.
        success: bool,
        /// Transport status code ([`STATUS_OK`], [`STATUS_CONNECTION_REJECTED`], ...).
        status: i32,
    },

    /// The established connection to `endpoint` is gone.
    Disconnected {
        /// The remote endpoint.
        endpoint: EndpointId,
    },

    /// Bytes arrived from `endpoint`.
    PayloadReceived {
        /// The sending endpoint.
        endpoint: EndpointId,
        /// The raw payload.
        bytes: Vec<u8>,
    },

    /// Discovery found an advertising endpoint.
    EndpointFound {
        /// The discovered endpoint.
        endpoint: EndpointId,
        /// Its advertised local name.
        remote_name: String,
        /// The service id it advertises under.
        service_id: String,
    },

    /// A previously found endpoint is no longer advertising.
    EndpointLost {
        /// The lost endpoint.
        endpoint: EndpointId,
    },
}

/// The device-to-device medium as Poplink consumes it.
///
/// Implementations are handles over shared internals (`Clone` is
/// required so send tasks can be spawned off the consumer's loop).
/// Every operation either succeeds against the medium or returns a
/// [`TransportError`]; asynchronous outcomes arrive as [`TransportEvent`]s
/// on the channel handed out by [`take_events`](Self::take_events).
///
/// Methods are spelled as `impl Future + Send` rather than `async fn` so
/// that actors generic over a transport can be handed to `tokio::spawn`;
/// implementations still write plain `async fn`.
pub trait LinkTransport: Clone + Send + Sync + 'static {
    /// Starts advertising `local_name` under `service_id`.
    ///
    /// # Errors
    /// Returns [`TransportError::AlreadyInProgress`] if the medium
    /// believes advertising is already active — some stacks report this
    /// as a failure even though the advertisement is up.
    fn start_advertising(
        &self,
        service_id: &str,
        local_name: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Stops advertising. Safe to call when not advertising.
    fn stop_advertising(&self) -> impl Future<Output = ()> + Send;

    /// Starts discovering endpoints advertising under `service_id`.
    ///
    /// # Errors
    /// Same `AlreadyInProgress` caveat as [`start_advertising`](Self::start_advertising).
    fn start_discovery(
        &self,
        service_id: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Stops discovery. Safe to call when not discovering.
    fn stop_discovery(&self) -> impl Future<Output = ()> + Send;

    /// Requests a connection to a discovered endpoint, presenting
    /// `local_name` to the remote user.
    fn request_connection(
        &self,
        endpoint: &EndpointId,
        local_name: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Accepts a pending connection. Payloads flow only once both sides
    /// have accepted.
    fn accept_connection(
        &self,
        endpoint: &EndpointId,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Rejects a pending connection.
    fn reject_connection(
        &self,
        endpoint: &EndpointId,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Sends a payload to a connected endpoint.
    ///
    /// # Errors
    /// Returns [`TransportError::NotConnected`] if there is no
    /// established connection to `endpoint`.
    fn send(
        &self,
        endpoint: &EndpointId,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Tears down the connection to `endpoint`. The remote side observes
    /// a [`TransportEvent::Disconnected`]; the local side does not.
    fn disconnect_from_endpoint(
        &self,
        endpoint: &EndpointId,
    ) -> impl Future<Output = ()> + Send;

    /// Hands out the event stream for this transport instance.
    ///
    /// The stream has a single consumer; returns `None` on every call
    /// after the first.
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>>;
}

/// Mints a short endpoint id in the style of nearby-device stacks.
pub(crate) fn random_endpoint_id() -> EndpointId {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::rng();
    let id: String = (0..4)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect();
    EndpointId::new(id)
}

/// Mints the short auth token shown to both users for comparison.
pub(crate) fn random_auth_token() -> String {
    let mut rng = rand::rng();
    format!("{:04}", rng.random_range(0..10_000u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_id_new_and_as_str() {
        let id = EndpointId::new("X4ZQ");
        assert_eq!(id.as_str(), "X4ZQ");
        assert_eq!(id.to_string(), "X4ZQ");
    }

    #[test]
    fn test_endpoint_id_equality_and_hash() {
        use std::collections::HashMap;
        let a = EndpointId::new("AAAA");
        let b = EndpointId::new("AAAA");
        let c = EndpointId::new("BBBB");
        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut map = HashMap::new();
        map.insert(a.clone(), 1);
        assert_eq!(map[&b], 1);
    }

    #[test]
    fn test_random_endpoint_id_is_four_chars() {
        let id = random_endpoint_id();
        assert_eq!(id.as_str().len(), 4);
    }

    #[test]
    fn test_random_auth_token_is_four_digits() {
        let token = random_auth_token();
        assert_eq!(token.len(), 4);
        assert!(token.chars().all(|c| c.is_ascii_digit()));
    }
}
