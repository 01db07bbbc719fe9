//! Wire protocol for Partyline.
//!
//! This crate defines what travels on the wire between a host and its
//! clients:
//!
//! - **Messages** ([`Message`] and the reserved control opcodes) — the
//!   `(op_code, payload)` records the bus carries.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how those records are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]) — what can go wrong while encoding
//!   or decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (framed bytes) and the
//! session controller (roles and peers). It knows nothing about sockets
//! or connections — only how to serialize and deserialize messages.
//!
//! ```text
//! Transport (frames) → Protocol (Message) → Session (role, peers)
//! ```

mod codec;
mod error;
mod message;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use message::{CLIENT_EXIT, Message, SRV_SHUTDOWN};
