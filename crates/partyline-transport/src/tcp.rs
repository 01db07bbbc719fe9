//! TCP endpoints: a listener for the host role, outbound connect for
//! the client role, and the split halves of one framed connection.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

use crate::frame::{read_frame, write_frame};
use crate::{PeerId, TransportError};

/// Counter for generating unique peer IDs.
static NEXT_PEER_ID: AtomicU64 = AtomicU64::new(1);

fn next_peer_id() -> PeerId {
    PeerId::new(NEXT_PEER_ID.fetch_add(1, Ordering::Relaxed))
}

/// A listening TCP endpoint that accepts incoming peer connections.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Binds a listener to the given address.
    ///
    /// # Errors
    /// Returns [`TransportError::Bind`] if the address cannot be bound.
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await.map_err(TransportError::Bind)?;
        tracing::info!(%addr, "transport listening");
        Ok(Self { listener })
    }

    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener.local_addr().map_err(TransportError::Bind)
    }

    /// Waits for and accepts the next incoming connection.
    ///
    /// # Errors
    /// Returns [`TransportError::Accept`] if the accept fails.
    pub async fn accept(&self) -> Result<PeerSocket, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Accept)?;
        let id = next_peer_id();
        tracing::debug!(%id, %addr, "accepted connection");
        Ok(PeerSocket { id, addr, stream })
    }
}

/// Opens a connection to a remote listener.
///
/// Returns as soon as the connection is established; no retry is
/// attempted on failure.
///
/// # Errors
/// Returns [`TransportError::Connect`] with the underlying cause.
pub async fn connect(addr: SocketAddr) -> Result<PeerSocket, TransportError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(TransportError::Connect)?;
    let id = next_peer_id();
    tracing::debug!(%id, %addr, "connected");
    Ok(PeerSocket { id, addr, stream })
}

/// One established connection, not yet split into its two halves.
pub struct PeerSocket {
    id: PeerId,
    addr: SocketAddr,
    stream: TcpStream,
}

impl PeerSocket {
    /// The unique identifier assigned to this connection.
    pub fn id(&self) -> PeerId {
        self.id
    }

    /// The remote address of this connection.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Splits into a send half and a receive half.
    ///
    /// The send half goes to whoever writes (the session's peer
    /// registry); the receive half is owned by the connection's receive
    /// loop. When both halves are dropped the socket closes.
    pub fn split(self) -> (PeerSender, PeerReceiver) {
        let (reader, writer) = self.stream.into_split();
        (
            PeerSender {
                id: self.id,
                addr: self.addr,
                writer,
            },
            PeerReceiver {
                id: self.id,
                reader,
            },
        )
    }
}

/// The write half of a peer connection.
pub struct PeerSender {
    id: PeerId,
    addr: SocketAddr,
    writer: OwnedWriteHalf,
}

impl PeerSender {
    /// The identifier of the connection this half belongs to.
    pub fn id(&self) -> PeerId {
        self.id
    }

    /// The remote address of this connection.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Sends one payload as a single frame.
    ///
    /// # Errors
    /// Returns [`TransportError::Send`] on socket errors and
    /// [`TransportError::FrameTooLarge`] for oversized payloads.
    pub async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        write_frame(&mut self.writer, payload).await
    }
}

/// The read half of a peer connection.
pub struct PeerReceiver {
    id: PeerId,
    reader: OwnedReadHalf,
}

impl PeerReceiver {
    /// The identifier of the connection this half belongs to.
    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Receives the next frame's payload.
    ///
    /// Returns `Ok(None)` when the remote closed cleanly.
    ///
    /// # Errors
    /// Returns [`TransportError::Receive`] on socket errors or a frame
    /// truncated by a mid-message close.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        read_frame(&mut self.reader).await
    }
}

/// Detects the machine's outward-facing IPv4 address.
///
/// Connects a UDP socket toward a public address and reads back the
/// local address the OS picked for that route. No packets are sent.
///
/// # Errors
/// Returns [`TransportError::Bind`] if the machine has no usable route.
pub fn lan_ip() -> Result<IpAddr, TransportError> {
    let socket = std::net::UdpSocket::bind(("0.0.0.0", 0)).map_err(TransportError::Bind)?;
    socket
        .connect(("8.8.8.8", 53))
        .map_err(TransportError::Bind)?;
    let addr = socket.local_addr().map_err(TransportError::Bind)?;
    Ok(addr.ip())
}
