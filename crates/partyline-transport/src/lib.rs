//! Transport layer for Partyline.
//!
//! Owns the raw TCP plumbing: a listening endpoint for the host role
//! ([`TcpTransport`]), an outbound [`connect`] for the client role, and
//! the length-prefixed framing that turns a byte stream back into
//! discrete messages. Connections split into a send half (held by the
//! session's peer registry) and a receive half (owned by that peer's
//! receive loop), so no buffer is ever shared between concurrent reads.

mod error;
mod frame;
mod tcp;

pub use error::TransportError;
pub use frame::{MAX_FRAME_LEN, read_frame, write_frame};
pub use tcp::{PeerReceiver, PeerSender, PeerSocket, TcpTransport, connect, lan_ip};

use std::fmt;

/// Opaque identifier for a connected peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(u64);

impl PeerId {
    /// Creates a `PeerId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_new_and_into_inner() {
        let id = PeerId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_peer_id_display() {
        let id = PeerId::new(7);
        assert_eq!(id.to_string(), "peer-7");
    }

    #[test]
    fn test_peer_id_equality() {
        let a = PeerId::new(1);
        let b = PeerId::new(1);
        let c = PeerId::new(2);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_peer_id_hash_works_as_map_key() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(PeerId::new(1), "alice");
        map.insert(PeerId::new(2), "bob");
        assert_eq!(map[&PeerId::new(1)], "alice");
    }
}
