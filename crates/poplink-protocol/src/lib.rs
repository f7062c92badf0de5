//! Wire protocol for Poplink.
//!
//! This crate defines the "language" two paired devices speak:
//!
//! - **Types** ([`CoopMessage`], [`PlayerColor`]) — the tagged union that
//!   travels on the wire and the shared color palette.
//! - **Local names** ([`encode_local_name`], [`parse_local_name`]) — the
//!   `"<player>:<color>"` string a device advertises about itself.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how messages become
//!   bytes and back.
//! - **Errors** ([`ProtocolError`]) — what can go wrong doing either.
//!
//! # Architecture
//!
//! The protocol layer sits between the transport (raw bytes) and the
//! sync coordinator (game meaning). It knows nothing about connections
//! or match state — it only serializes and deserializes.
//!
//! ```text
//! Transport (bytes) → Protocol (CoopMessage) → Sync Coordinator (state)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    encode_local_name, parse_local_name, CoopMessage, PlayerColor,
};
