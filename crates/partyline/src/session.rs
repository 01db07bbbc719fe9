//! The session controller: roles, peers, broadcast, relay, shutdown.
//!
//! One accepted connection gets one receive task; the client role runs
//! a single receive task for its connection to the host. All tasks
//! communicate with the application exclusively through the session's
//! event queue, and all of them watch a lifecycle epoch so `close`
//! unblocks every pending read instead of waiting it out.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use partyline_protocol::{CLIENT_EXIT, Codec, JsonCodec, Message, ProtocolError, SRV_SHUTDOWN};
use partyline_transport::{self as transport, PeerId, PeerReceiver, PeerSender, PeerSocket, TcpTransport};
use tokio::sync::{Mutex, mpsc, watch};

use crate::{SessionConfig, SessionError, SessionEvent};

/// Lifecycle role of a session.
///
/// ```text
///   Idle ──(host)──→ Host ──┐
///     │                     ├──(close / shutdown opcode)──→ Closing ──→ Idle
///     └──(join)──→ Client ──┘
/// ```
///
/// `Host` and `Client` are entered only from `Idle`; `Closing` always
/// returns to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Not started.
    Idle,
    /// Accepting inbound connections and broadcasting/relaying.
    Host,
    /// Connected to exactly one host.
    Client,
    /// Tearing down; transient.
    Closing,
}

/// One registered remote endpoint. The receive half lives in the peer's
/// receive task; only the send half is kept here.
struct Peer {
    sender: Mutex<PeerSender>,
}

/// State shared between the session façade and its background tasks.
struct Shared {
    config: SessionConfig,
    codec: JsonCodec,
    role: Mutex<Role>,
    peers: Mutex<HashMap<PeerId, Arc<Peer>>>,
    local_addr: Mutex<Option<SocketAddr>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    /// Monotonic counter bumped on every teardown. Tasks capture the
    /// value at spawn and exit as soon as it moves, so a fast
    /// close-then-host sequence can never strand a loop.
    lifecycle: watch::Sender<u64>,
}

impl Shared {
    fn emit(&self, event: SessionEvent) {
        // The receiver lives in the Session; if it's gone, so is
        // everyone who could observe the event.
        let _ = self.events.send(event);
    }
}

/// A host/client message bus session.
///
/// Constructed and owned by the application's composition root; there
/// is no global session state. Dropping a `Session` unblocks its
/// background tasks, but the cooperative shutdown notifications are
/// only sent by [`close`](Session::close).
pub struct Session {
    shared: Arc<Shared>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl Session {
    /// Creates an idle session.
    pub fn new(config: SessionConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (lifecycle, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                config,
                codec: JsonCodec,
                role: Mutex::new(Role::Idle),
                peers: Mutex::new(HashMap::new()),
                local_addr: Mutex::new(None),
                events: events_tx,
                lifecycle,
            }),
            events: events_rx,
        }
    }

    /// Creates an idle session with the default configuration.
    pub fn with_defaults() -> Self {
        Self::new(SessionConfig::default())
    }

    // -- Lifecycle --------------------------------------------------------

    /// Starts hosting on the given port (0 picks a free one).
    ///
    /// Binds the configured address (by default the machine's detected
    /// LAN address, not the wildcard) and starts accepting clients.
    /// No-op if the session is already started.
    ///
    /// # Errors
    /// Returns [`TransportError::Bind`](partyline_transport::TransportError::Bind)
    /// if no local address can be resolved or the port cannot be bound.
    pub async fn host(&self, port: u16) -> Result<(), SessionError> {
        let mut role = self.shared.role.lock().await;
        if *role != Role::Idle {
            let current = *role;
            tracing::debug!(role = ?current, "host ignored: session already started");
            return Ok(());
        }

        let ip = match self.shared.config.bind_addr {
            Some(ip) => ip,
            None => transport::lan_ip()?,
        };
        let listener = TcpTransport::bind(SocketAddr::new(ip, port)).await?;
        let local = listener.local_addr()?;

        *self.shared.local_addr.lock().await = Some(local);
        *role = Role::Host;
        // Captured under the role lock: a close racing in after this
        // point bumps the epoch and the loop exits immediately.
        let epoch = *self.shared.lifecycle.borrow();
        drop(role);

        tracing::info!(%local, "session hosting");
        self.shared
            .emit(SessionEvent::Debug(format!("hosting on {local}")));

        tokio::spawn(accept_loop(Arc::clone(&self.shared), listener, epoch));
        Ok(())
    }

    /// Joins the host at `addr:port`.
    ///
    /// On success a [`SessionEvent::Connected`] is queued and the
    /// session enters the client role. On failure a
    /// [`SessionEvent::JoinError`] is queued, the error is returned,
    /// and the session stays idle. No-op if already started.
    ///
    /// # Errors
    /// Returns [`TransportError::Connect`](partyline_transport::TransportError::Connect)
    /// with the underlying cause; no retry is attempted.
    pub async fn join(&self, addr: IpAddr, port: u16) -> Result<(), SessionError> {
        let mut role = self.shared.role.lock().await;
        if *role != Role::Idle {
            let current = *role;
            tracing::debug!(role = ?current, "join ignored: session already started");
            return Ok(());
        }

        let target = SocketAddr::new(addr, port);
        self.shared
            .emit(SessionEvent::Debug(format!("joining {target}")));

        let socket = match transport::connect(target).await {
            Ok(socket) => socket,
            Err(e) => {
                let err = SessionError::from(e);
                tracing::warn!(%target, error = %err, "join failed");
                self.shared.emit(SessionEvent::JoinError(err.to_string()));
                return Err(err);
            }
        };

        let id = socket.id();
        let host_addr = socket.addr();
        let (sender, receiver) = socket.split();
        self.shared.peers.lock().await.insert(
            id,
            Arc::new(Peer {
                sender: Mutex::new(sender),
            }),
        );
        *role = Role::Client;
        let epoch = *self.shared.lifecycle.borrow();
        drop(role);

        tracing::info!(%id, %host_addr, "joined host");
        self.shared.emit(SessionEvent::Connected);

        tokio::spawn(client_loop(Arc::clone(&self.shared), receiver, epoch));
        Ok(())
    }

    /// Closes the session.
    ///
    /// The host role notifies every client with `SRV_SHUTDOWN` and then
    /// closes every peer plus the listener; the client role notifies
    /// the host with `CLIENT_EXIT` and closes its socket. Notifications
    /// are best effort; failures never block teardown. No-op when not
    /// started.
    pub async fn close(&self) {
        let closing_from = {
            let mut role = self.shared.role.lock().await;
            match *role {
                Role::Idle | Role::Closing => return,
                from => {
                    *role = Role::Closing;
                    from
                }
            }
        };

        let notice = match closing_from {
            Role::Host => Message::server_shutdown(),
            _ => Message::client_exit(),
        };
        match self.shared.codec.encode(&notice) {
            Ok(bytes) => fan_out(&self.shared, None, &bytes).await,
            Err(e) => tracing::debug!(error = %e, "failed to encode close notice"),
        }

        teardown(&self.shared).await;
        tracing::info!(role = ?closing_from, "session closed");
    }

    // -- Messaging --------------------------------------------------------

    /// Sends one `(op_code, payload)` message.
    ///
    /// The host role broadcasts to every connected peer; the client
    /// role sends to the host. Send failures on individual peers are
    /// observed by their receive loops and surface as
    /// [`SessionEvent::PeerDisconnected`], not here.
    ///
    /// # Errors
    /// [`ProtocolError::ReservedOpcode`] for the control opcodes, and
    /// [`SessionError::NotStarted`] when the session is idle.
    pub async fn send(
        &self,
        op_code: impl Into<String>,
        payload: impl Into<String>,
    ) -> Result<(), SessionError> {
        let msg = Message::new(op_code, payload);
        if msg.is_control() {
            return Err(ProtocolError::ReservedOpcode(msg.op_code).into());
        }
        if !matches!(*self.shared.role.lock().await, Role::Host | Role::Client) {
            return Err(SessionError::NotStarted);
        }

        let bytes = self.shared.codec.encode(&msg)?;
        fan_out(&self.shared, None, &bytes).await;
        Ok(())
    }

    // -- Events -----------------------------------------------------------

    /// Removes and returns the next queued event without waiting.
    ///
    /// Intended for per-tick draining from a game loop.
    pub fn poll_event(&mut self) -> Option<SessionEvent> {
        self.events.try_recv().ok()
    }

    /// Waits for the next event.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    // -- Introspection ----------------------------------------------------

    /// Current lifecycle role.
    pub async fn role(&self) -> Role {
        *self.shared.role.lock().await
    }

    /// `true` while the session is in an active role.
    pub async fn is_started(&self) -> bool {
        matches!(self.role().await, Role::Host | Role::Client)
    }

    /// Number of registered peers (clients for the host role; 0 or 1
    /// for the client role).
    pub async fn peer_count(&self) -> usize {
        self.shared.peers.lock().await.len()
    }

    /// The address the host role is bound to, if hosting.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.shared.local_addr.lock().await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Unblocks every loop still running; their sockets close as the
        // tasks drop their halves.
        self.shared.lifecycle.send_modify(|epoch| *epoch += 1);
    }
}

// ---------------------------------------------------------------------------
// Background tasks
// ---------------------------------------------------------------------------

/// Accepts clients until the lifecycle epoch moves, registering each
/// one and spawning its receive loop.
async fn accept_loop(shared: Arc<Shared>, listener: TcpTransport, epoch: u64) {
    let mut lifecycle = shared.lifecycle.subscribe();
    loop {
        tokio::select! {
            _ = async { let _ = lifecycle.wait_for(|current| *current != epoch).await; } => break,
            result = listener.accept() => match result {
                Ok(socket) => register_peer(&shared, socket, epoch).await,
                Err(e) => {
                    if *shared.lifecycle.borrow() != epoch {
                        // The session was closed on purpose.
                        break;
                    }
                    tracing::error!(error = %e, "accept failed");
                }
            },
        }
    }
    tracing::debug!("accept loop exited");
}

async fn register_peer(shared: &Arc<Shared>, socket: PeerSocket, epoch: u64) {
    let id = socket.id();
    let addr = socket.addr();
    let (sender, receiver) = socket.split();
    {
        let mut peers = shared.peers.lock().await;
        // Raced with a concurrent close: refuse the socket rather than
        // leak a peer into a torn-down session.
        if *shared.lifecycle.borrow() != epoch {
            return;
        }
        peers.insert(
            id,
            Arc::new(Peer {
                sender: Mutex::new(sender),
            }),
        );
    }

    tracing::info!(%id, %addr, "client connected");
    shared.emit(SessionEvent::PeerConnected { peer: id, addr });
    tokio::spawn(host_peer_loop(Arc::clone(shared), receiver, epoch));
}

/// Host-side receive loop for one client connection.
async fn host_peer_loop(shared: Arc<Shared>, mut receiver: PeerReceiver, epoch: u64) {
    let id = receiver.id();
    let mut lifecycle = shared.lifecycle.subscribe();
    loop {
        let frame = tokio::select! {
            _ = lifecycle.wait_for(|current| *current != epoch) => break,
            frame = receiver.recv() => frame,
        };

        match frame {
            Ok(Some(bytes)) => {
                let msg: Message = match shared.codec.decode(&bytes) {
                    Ok(msg) => msg,
                    Err(e) => {
                        tracing::warn!(%id, error = %e, "dropping peer after malformed frame");
                        unregister_peer(&shared, id).await;
                        break;
                    }
                };
                match msg.op_code.as_str() {
                    CLIENT_EXIT => {
                        tracing::info!(%id, "client exited");
                        unregister_peer(&shared, id).await;
                        break;
                    }
                    SRV_SHUTDOWN => {
                        // Only the host may announce shutdown.
                        tracing::debug!(%id, "ignoring SRV_SHUTDOWN from a client");
                    }
                    _ => {
                        // Relay the raw frame to every other peer, then
                        // surface the message locally.
                        fan_out(&shared, Some(id), &bytes).await;
                        shared.emit(SessionEvent::Data(msg));
                    }
                }
            }
            Ok(None) => {
                tracing::info!(%id, "client closed connection");
                unregister_peer(&shared, id).await;
                break;
            }
            Err(e) => {
                tracing::debug!(%id, error = %e, "receive failed");
                unregister_peer(&shared, id).await;
                break;
            }
        }
    }
}

/// Client-side receive loop for the connection to the host.
async fn client_loop(shared: Arc<Shared>, mut receiver: PeerReceiver, epoch: u64) {
    let id = receiver.id();
    let mut lifecycle = shared.lifecycle.subscribe();
    loop {
        let frame = tokio::select! {
            _ = lifecycle.wait_for(|current| *current != epoch) => break,
            frame = receiver.recv() => frame,
        };

        match frame {
            Ok(Some(bytes)) => {
                let msg: Message = match shared.codec.decode(&bytes) {
                    Ok(msg) => msg,
                    Err(e) => {
                        tracing::warn!(error = %e, "disconnecting after malformed frame");
                        client_disconnect(&shared, id).await;
                        break;
                    }
                };
                match msg.op_code.as_str() {
                    SRV_SHUTDOWN => {
                        tracing::info!("host shut down");
                        // Settle the local state first, so the session
                        // is back to idle by the time the application
                        // observes the event.
                        close_from_task(&shared).await;
                        shared.emit(SessionEvent::ServerShutdown);
                        break;
                    }
                    CLIENT_EXIT => {
                        tracing::debug!("ignoring CLIENT_EXIT from the host");
                    }
                    _ => shared.emit(SessionEvent::Data(msg)),
                }
            }
            Ok(None) => {
                // Host vanished without announcing shutdown.
                tracing::info!("host closed connection");
                client_disconnect(&shared, id).await;
                break;
            }
            Err(e) => {
                tracing::debug!(error = %e, "receive failed");
                client_disconnect(&shared, id).await;
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Writes one encoded frame to every registered peer, optionally
/// excluding the one it came from (the relay path). A failed send is
/// left for that peer's receive loop to observe.
async fn fan_out(shared: &Arc<Shared>, except: Option<PeerId>, bytes: &[u8]) {
    let targets: Vec<(PeerId, Arc<Peer>)> = shared
        .peers
        .lock()
        .await
        .iter()
        .filter(|(id, _)| Some(**id) != except)
        .map(|(id, peer)| (*id, Arc::clone(peer)))
        .collect();

    for (id, peer) in targets {
        if let Err(e) = peer.sender.lock().await.send(bytes).await {
            tracing::debug!(%id, error = %e, "send failed");
        }
    }
}

/// Removes one peer and queues the disconnect notification. Keyed on
/// the map entry, so the notification fires at most once per peer.
async fn unregister_peer(shared: &Arc<Shared>, id: PeerId) {
    let removed = shared.peers.lock().await.remove(&id);
    if removed.is_some() {
        shared.emit(SessionEvent::PeerDisconnected { peer: id });
    }
}

/// Releases everything a started session holds: bumps the lifecycle
/// epoch so every loop unblocks and exits, drops all peers (closing
/// their sockets), and returns the role to `Idle`.
async fn teardown(shared: &Arc<Shared>) {
    shared.lifecycle.send_modify(|epoch| *epoch += 1);
    shared.peers.lock().await.clear();
    *shared.local_addr.lock().await = None;
    *shared.role.lock().await = Role::Idle;
}

/// Teardown initiated from a receive task (shutdown opcode, remote
/// close, or a protocol violation).
async fn close_from_task(shared: &Arc<Shared>) {
    {
        let mut role = shared.role.lock().await;
        if *role == Role::Idle {
            return;
        }
        *role = Role::Closing;
    }
    teardown(shared).await;
}

/// Client-side loss of the host connection: tear the session down and
/// only then queue the disconnect, so the application sees a settled
/// idle session. The map entry keeps the notification single-shot.
async fn client_disconnect(shared: &Arc<Shared>, id: PeerId) {
    let removed = shared.peers.lock().await.remove(&id);
    close_from_task(shared).await;
    if removed.is_some() {
        shared.emit(SessionEvent::PeerDisconnected { peer: id });
    }
}
