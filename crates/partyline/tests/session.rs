//! Integration tests for the session controller: broadcast, relay,
//! disconnect and shutdown propagation, and role lifecycle.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use partyline::{Message, Role, Session, SessionConfig, SessionError, SessionEvent};
use partyline_transport::TcpTransport;

// =========================================================================
// Helpers
// =========================================================================

fn local_config() -> SessionConfig {
    SessionConfig {
        bind_addr: Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
    }
}

/// Starts a host on a random loopback port and returns it with its
/// bound address.
async fn start_host() -> (Session, SocketAddr) {
    let host = Session::new(local_config());
    host.host(0).await.expect("host should bind");
    let addr = host.local_addr().await.expect("host should expose addr");
    (host, addr)
}

/// Joins a fresh client session to the given host address.
async fn join_client(addr: SocketAddr) -> Session {
    let client = Session::new(local_config());
    client
        .join(addr.ip(), addr.port())
        .await
        .expect("join should succeed");
    client
}

/// Waits (bounded) for the first event matching `pred`, discarding
/// everything else in between.
async fn expect_event<F>(session: &mut Session, mut pred: F) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = session
                .next_event()
                .await
                .expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Waits (bounded) for the next `Data` event.
async fn expect_data(session: &mut Session) -> Message {
    match expect_event(session, |e| matches!(e, SessionEvent::Data(_))).await {
        SessionEvent::Data(msg) => msg,
        _ => unreachable!(),
    }
}

/// Asserts that no `Data` event arrives within `wait`.
async fn assert_no_data(session: &mut Session, wait: Duration) {
    let result = tokio::time::timeout(wait, async {
        loop {
            match session.next_event().await {
                Some(SessionEvent::Data(msg)) => return msg,
                Some(_) => continue,
                None => std::future::pending::<()>().await,
            }
        }
    })
    .await;
    assert!(result.is_err(), "unexpected data: {:?}", result.unwrap());
}

/// Waits (bounded) until the session's peer registry reaches `n`.
async fn wait_for_peer_count(session: &Session, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while session.peer_count().await != n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for peer count");
}

// =========================================================================
// Connection establishment
// =========================================================================

#[tokio::test]
async fn test_join_connects_client_and_registers_peer() {
    let (mut host, addr) = start_host().await;
    let mut client = join_client(addr).await;

    expect_event(&mut client, |e| matches!(e, SessionEvent::Connected)).await;
    expect_event(&mut host, |e| {
        matches!(e, SessionEvent::PeerConnected { .. })
    })
    .await;

    wait_for_peer_count(&host, 1).await;
    assert_eq!(host.role().await, Role::Host);
    assert_eq!(client.role().await, Role::Client);
    assert!(host.is_started().await);
    assert!(client.is_started().await);
}

#[tokio::test]
async fn test_join_refused_emits_join_error_and_stays_idle() {
    // Bind then drop to get a loopback port with nothing behind it.
    let listener = TcpTransport::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let dead = listener.local_addr().unwrap();
    drop(listener);

    let mut client = Session::new(local_config());
    let err = client
        .join(dead.ip(), dead.port())
        .await
        .expect_err("join should fail");

    assert!(matches!(err, SessionError::Transport(_)));
    expect_event(&mut client, |e| matches!(e, SessionEvent::JoinError(_))).await;
    assert!(!client.is_started().await);
    assert_eq!(client.role().await, Role::Idle);
}

#[tokio::test]
async fn test_host_twice_is_noop() {
    let (host, addr) = start_host().await;

    host.host(0).await.expect("second host should be a no-op");

    assert_eq!(host.local_addr().await, Some(addr));
    assert_eq!(host.role().await, Role::Host);
}

#[tokio::test]
async fn test_join_twice_is_noop() {
    let (host, addr) = start_host().await;
    let client = join_client(addr).await;
    wait_for_peer_count(&host, 1).await;

    client
        .join(addr.ip(), addr.port())
        .await
        .expect("second join should be a no-op");

    assert_eq!(client.role().await, Role::Client);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(host.peer_count().await, 1, "no second connection opened");
}

// =========================================================================
// Broadcast and relay
// =========================================================================

#[tokio::test]
async fn test_host_send_reaches_joined_client() {
    let (host, addr) = start_host().await;
    let mut client = join_client(addr).await;
    wait_for_peer_count(&host, 1).await;

    host.send("score", "42").await.unwrap();

    let msg = expect_data(&mut client).await;
    assert_eq!(msg, Message::new("score", "42"));
}

#[tokio::test]
async fn test_host_broadcast_reaches_all_clients() {
    let (host, addr) = start_host().await;
    let mut a = join_client(addr).await;
    let mut b = join_client(addr).await;
    let mut c = join_client(addr).await;
    wait_for_peer_count(&host, 3).await;

    host.send("round", "1").await.unwrap();

    for client in [&mut a, &mut b, &mut c] {
        let msg = expect_data(client).await;
        assert_eq!(msg, Message::new("round", "1"));
    }
}

#[tokio::test]
async fn test_relay_reaches_other_clients_but_not_sender() {
    let (mut host, addr) = start_host().await;
    let mut a = join_client(addr).await;
    let mut b = join_client(addr).await;
    wait_for_peer_count(&host, 2).await;

    a.send("ping", "hi").await.unwrap();

    // The host surfaces the message and relays it to B.
    let on_host = expect_data(&mut host).await;
    assert_eq!(on_host, Message::new("ping", "hi"));
    let on_b = expect_data(&mut b).await;
    assert_eq!(on_b, Message::new("ping", "hi"));

    // The sender must not get its own message echoed back.
    assert_no_data(&mut a, Duration::from_millis(300)).await;
}

#[tokio::test]
async fn test_payload_with_quoting_characters_round_trips() {
    let (host, addr) = start_host().await;
    let mut client = join_client(addr).await;
    wait_for_peer_count(&host, 1).await;

    host.send("msg", r#"it's a "quoted" line"#).await.unwrap();

    let msg = expect_data(&mut client).await;
    assert_eq!(msg.payload, r#"it's a "quoted" line"#);
}

// =========================================================================
// Disconnect propagation
// =========================================================================

#[tokio::test]
async fn test_client_close_unregisters_peer_exactly_once() {
    let (mut host, addr) = start_host().await;
    let client = join_client(addr).await;
    wait_for_peer_count(&host, 1).await;

    client.close().await;

    expect_event(&mut host, |e| {
        matches!(e, SessionEvent::PeerDisconnected { .. })
    })
    .await;
    assert_eq!(host.peer_count().await, 0);
    assert_eq!(client.role().await, Role::Idle);

    // No duplicate disconnect for the same peer.
    tokio::time::sleep(Duration::from_millis(100)).await;
    while let Some(event) = host.poll_event() {
        assert!(
            !matches!(event, SessionEvent::PeerDisconnected { .. }),
            "duplicate disconnect: {event:?}"
        );
    }
}

#[tokio::test]
async fn test_abrupt_client_drop_unregisters_peer() {
    let (mut host, addr) = start_host().await;

    // A raw connection that vanishes without sending CLIENT_EXIT.
    let socket = partyline_transport::connect(addr).await.unwrap();
    expect_event(&mut host, |e| {
        matches!(e, SessionEvent::PeerConnected { .. })
    })
    .await;
    drop(socket);

    expect_event(&mut host, |e| {
        matches!(e, SessionEvent::PeerDisconnected { .. })
    })
    .await;
    assert_eq!(host.peer_count().await, 0);
}

#[tokio::test]
async fn test_malformed_frame_drops_peer() {
    let (mut host, addr) = start_host().await;

    let socket = partyline_transport::connect(addr).await.unwrap();
    let (mut tx, _rx) = socket.split();
    expect_event(&mut host, |e| {
        matches!(e, SessionEvent::PeerConnected { .. })
    })
    .await;

    tx.send(b"not json at all").await.unwrap();

    expect_event(&mut host, |e| {
        matches!(e, SessionEvent::PeerDisconnected { .. })
    })
    .await;
    assert_eq!(host.peer_count().await, 0);
    assert_no_data(&mut host, Duration::from_millis(100)).await;
}

#[tokio::test]
async fn test_client_observes_host_vanish_without_shutdown() {
    // A bare listener that accepts one connection and drops it.
    let listener = TcpTransport::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let socket = listener.accept().await.unwrap();
        drop(socket);
    });

    let mut client = join_client(addr).await;

    expect_event(&mut client, |e| {
        matches!(e, SessionEvent::PeerDisconnected { .. })
    })
    .await;
    assert_eq!(client.role().await, Role::Idle);
}

// =========================================================================
// Shutdown propagation
// =========================================================================

#[tokio::test]
async fn test_host_close_notifies_every_client_exactly_once() {
    let (host, addr) = start_host().await;
    let mut a = join_client(addr).await;
    let mut b = join_client(addr).await;
    wait_for_peer_count(&host, 2).await;

    host.close().await;

    for client in [&mut a, &mut b] {
        expect_event(client, |e| matches!(e, SessionEvent::ServerShutdown)).await;
        assert_eq!(client.role().await, Role::Idle);

        // No data and no second shutdown afterwards.
        tokio::time::sleep(Duration::from_millis(100)).await;
        while let Some(event) = client.poll_event() {
            assert!(
                !matches!(
                    event,
                    SessionEvent::Data(_) | SessionEvent::ServerShutdown
                ),
                "unexpected event after shutdown: {event:?}"
            );
        }
    }

    assert_eq!(host.role().await, Role::Idle);
    assert_eq!(host.peer_count().await, 0);
    assert_eq!(host.local_addr().await, None);
}

#[tokio::test]
async fn test_host_can_restart_after_close() {
    let (host, _first_addr) = start_host().await;

    host.close().await;
    assert_eq!(host.role().await, Role::Idle);

    host.host(0).await.expect("host should restart from idle");
    assert_eq!(host.role().await, Role::Host);
    let addr = host.local_addr().await.expect("rebound");

    // The restarted session is fully functional.
    let mut client = join_client(addr).await;
    wait_for_peer_count(&host, 1).await;
    host.send("round", "2").await.unwrap();
    assert_eq!(expect_data(&mut client).await, Message::new("round", "2"));
}

#[tokio::test]
async fn test_close_when_idle_is_noop() {
    let session = Session::new(local_config());
    session.close().await;
    assert_eq!(session.role().await, Role::Idle);
}

// =========================================================================
// Send-path guards
// =========================================================================

#[tokio::test]
async fn test_send_reserved_opcode_rejected() {
    let (host, _addr) = start_host().await;

    for reserved in [partyline::CLIENT_EXIT, partyline::SRV_SHUTDOWN] {
        let err = host
            .send(reserved, "")
            .await
            .expect_err("reserved opcode must be rejected");
        assert!(matches!(
            err,
            SessionError::Protocol(partyline::ProtocolError::ReservedOpcode(_))
        ));
    }
}

#[tokio::test]
async fn test_send_when_idle_is_not_started_error() {
    let session = Session::new(local_config());

    let err = session
        .send("msg", "hello")
        .await
        .expect_err("send needs a started session");
    assert!(matches!(err, SessionError::NotStarted));
}
