//! Connection lifecycle management for Poplink.
//!
//! The link actor owns a [`LinkTransport`](poplink_transport::LinkTransport)
//! and drives the one-peer connection state machine:
//!
//! ```text
//! Disconnected → Advertising ──┐
//!             → Discovering ──┼→ Connecting → Connected
//!                              │      │            │
//!                              └──────┴────────────┴→ Disconnected
//! ```
//!
//! Everything runs in a single Tokio task, communicating with the
//! outside world through channels — the same actor shape as the sync
//! coordinator above it. Callers hold a cheap-to-clone [`LinkHandle`]
//! and observe the link through `watch` channels (current state,
//! discovered endpoints, the active connection) plus one mpsc stream of
//! inbound payload bytes.

mod error;
mod manager;
mod state;

pub use error::SessionError;
pub use manager::{spawn_link, LinkHandle};
pub use state::{ConnectionInfo, ConnectionState, EndpointInfo};
