//! Notifications delivered to the application.

use std::net::SocketAddr;

use partyline_protocol::Message;
use partyline_transport::PeerId;

/// An event on the session's queue.
///
/// Receive tasks enqueue these; the application drains them on its own
/// execution context ([`Session::poll_event`](crate::Session::poll_event)
/// once per tick, or [`Session::next_event`](crate::Session::next_event)).
/// Handlers therefore never run concurrently with each other.
#[derive(Debug)]
pub enum SessionEvent {
    /// Client role: the connection to the host is up.
    Connected,

    /// Client role: `join` failed. Carries the rendered cause; the
    /// session is still idle.
    JoinError(String),

    /// An application message arrived.
    Data(Message),

    /// Host role: a new client connected.
    PeerConnected {
        /// Identifier of the new peer.
        peer: PeerId,
        /// The peer's remote address.
        addr: SocketAddr,
    },

    /// A peer went away: client exit, remote close, socket error, or a
    /// protocol violation on that connection. On the client role this
    /// refers to the host.
    PeerDisconnected {
        /// Identifier of the departed peer.
        peer: PeerId,
    },

    /// Client role: the host announced shutdown. The local session has
    /// already returned to idle when this is observed.
    ServerShutdown,

    /// Non-critical diagnostics, separate from the error taxonomy.
    Debug(String),
}
