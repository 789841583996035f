//! End-to-end presence flow over real WebSocket connections.
//!
//! Binds the server to an ephemeral port, connects clients with
//! tokio-tungstenite, and replays the join/leave/disconnect scenarios.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use huddle_api::{decode_event, encode_event, ClientEvent, ErrorCode, RoomId, ServerEvent};
use huddle_server::{Server, ServerState};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Start a server on an ephemeral port and keep a handle to its state so
/// tests can assert on the registry directly.
async fn start_server() -> (SocketAddr, Arc<ServerState>) {
    let server = Server::bind("127.0.0.1:0".parse().unwrap())
        .await
        .expect("bind server");
    let addr = server.local_addr().expect("local addr");
    let state = server.state().clone();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    (addr, state)
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}"))
        .await
        .expect("client connect");
    ws
}

async fn send(ws: &mut Client, event: &ClientEvent) {
    ws.send(Message::Text(encode_event(event)))
        .await
        .expect("send event");
}

/// Receive the next server event, skipping any non-text frames.
async fn recv_event(ws: &mut Client) -> ServerEvent {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("connection closed while waiting for event")
            .expect("socket error while waiting for event");
        if let Message::Text(text) = msg {
            return decode_event(&text).expect("decode server event");
        }
    }
}

fn join(room: &str, uid: &str, name: Option<&str>, media: &str) -> ClientEvent {
    ClientEvent::Join {
        room_id: room.to_string(),
        uid: uid.to_string(),
        display_name: name.map(str::to_string),
        media_session_id: media.to_string(),
    }
}

fn expect_peers(event: ServerEvent) -> Vec<String> {
    match event {
        ServerEvent::JoinAck {
            ok: true,
            peers: Some(peers),
            error: None,
        } => {
            let mut uids: Vec<String> = peers.into_iter().map(|p| p.uid).collect();
            uids.sort();
            uids
        }
        other => panic!("expected positive join ack, got {other:?}"),
    }
}

/// Poll until the registry holds the expected number of rooms; disconnect
/// cleanup runs asynchronously after the socket closes.
async fn wait_for_room_count(state: &Arc<ServerState>, expected: usize) {
    for _ in 0..50 {
        if state.registry.room_count().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!(
        "timeout waiting for room count {expected}, have {}",
        state.registry.room_count().await
    );
}

#[tokio::test]
async fn two_clients_see_each_other_arrive_and_leave() {
    let (addr, state) = start_server().await;

    // A joins room "X1".
    let mut a = connect(addr).await;
    send(&mut a, &join("X1", "u1", Some("Ana"), "m1")).await;
    assert_eq!(expect_peers(recv_event(&mut a).await), vec!["u1"]);

    // B joins "x1 " (same room after normalization); A is notified.
    let mut b = connect(addr).await;
    send(&mut b, &join("x1 ", "u2", Some("Bea"), "m2")).await;
    assert_eq!(expect_peers(recv_event(&mut b).await), vec!["u1", "u2"]);
    assert_eq!(
        recv_event(&mut a).await,
        ServerEvent::UserJoined {
            uid: "u2".to_string(),
            display_name: "Bea".to_string(),
            media_session_id: "m2".to_string(),
        }
    );

    // B disconnects without an explicit leave; A still learns of it.
    b.close(None).await.expect("close b");
    assert_eq!(
        recv_event(&mut a).await,
        ServerEvent::UserLeft {
            uid: "u2".to_string()
        }
    );
    let x1 = RoomId::normalize("X1").unwrap();
    let remaining = state.registry.snapshot(&x1).await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].uid, "u1");

    // A leaves explicitly; the room is gone.
    send(
        &mut a,
        &ClientEvent::Leave {
            room_id: "X1".to_string(),
            uid: "u1".to_string(),
        },
    )
    .await;
    wait_for_room_count(&state, 0).await;
}

#[tokio::test]
async fn join_without_uid_is_rejected_and_creates_nothing() {
    let (addr, state) = start_server().await;

    let mut a = connect(addr).await;
    send(&mut a, &join("X1", "", None, "m1")).await;

    assert_eq!(
        recv_event(&mut a).await,
        ServerEvent::JoinAck {
            ok: false,
            peers: None,
            error: Some(ErrorCode::BadRequest),
        }
    );
    assert_eq!(state.registry.room_count().await, 0);

    // The connection stays usable: a valid join afterwards succeeds.
    send(&mut a, &join("X1", "u1", None, "m1")).await;
    assert_eq!(expect_peers(recv_event(&mut a).await), vec!["u1"]);
}

#[tokio::test]
async fn blank_display_name_defaults_to_guest() {
    let (addr, _state) = start_server().await;

    let mut a = connect(addr).await;
    send(&mut a, &join("LOBBY", "u1", Some("   "), "m1")).await;
    match recv_event(&mut a).await {
        ServerEvent::JoinAck {
            ok: true,
            peers: Some(peers),
            ..
        } => {
            assert_eq!(peers.len(), 1);
            assert_eq!(peers[0].display_name, "Guest");
        }
        other => panic!("expected positive join ack, got {other:?}"),
    }
}

#[tokio::test]
async fn disconnect_without_join_leaves_no_trace() {
    let (addr, state) = start_server().await;

    let mut a = connect(addr).await;
    send(&mut a, &join("X1", "u1", None, "m1")).await;
    recv_event(&mut a).await;

    // B connects and closes without ever joining: no broadcast, no change.
    let mut b = connect(addr).await;
    b.close(None).await.expect("close b");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(state.registry.room_count().await, 1);

    // A is still alone and reachable: a third peer's join is broadcast.
    let mut c = connect(addr).await;
    send(&mut c, &join("X1", "u3", None, "m3")).await;
    assert_eq!(expect_peers(recv_event(&mut c).await), vec!["u1", "u3"]);
    assert_eq!(
        recv_event(&mut a).await,
        ServerEvent::UserJoined {
            uid: "u3".to_string(),
            display_name: "Guest".to_string(),
            media_session_id: "m3".to_string(),
        }
    );
}

#[tokio::test]
async fn room_is_recreated_fresh_after_everyone_left() {
    let (addr, state) = start_server().await;

    let mut a = connect(addr).await;
    send(&mut a, &join("EPHEMERAL", "u1", None, "m1")).await;
    recv_event(&mut a).await;

    a.close(None).await.expect("close a");
    wait_for_room_count(&state, 0).await;

    // A later join sees an empty room, not leftovers.
    let mut b = connect(addr).await;
    send(&mut b, &join("ephemeral", "u2", None, "m2")).await;
    assert_eq!(expect_peers(recv_event(&mut b).await), vec!["u2"]);
}
