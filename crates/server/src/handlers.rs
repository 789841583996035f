//! Lifecycle event handling.
//!
//! This module binds inbound client events to registry operations and
//! outbound broadcasts, separated from socket I/O for testability: every
//! outbound frame goes through a [`PeerHandle`] channel, so tests drive the
//! handlers with plain mpsc pairs and assert on the received events.
//!
//! Per connection there are three transitions over the session state:
//! `join` (validated, acked), `leave` (silent on bad input), and the
//! transport-initiated disconnect cleanup in [`cleanup_client`].

use crate::state::{PeerHandle, ServerState, Session};
use huddle_api::{normalize_display_name, ClientEvent, PeerRecord, RoomId, ServerEvent};
use std::sync::Arc;
use tracing::{debug, info};

/// Handle a decoded event from a client.
///
/// Registry calls complete synchronously in memory and cannot fail; the one
/// expected failure mode is join validation, which is reported to the sender
/// as a negative ack rather than an error.
pub async fn handle_event(event: ClientEvent, sender: &Arc<PeerHandle>, state: &Arc<ServerState>) {
    match event {
        ClientEvent::Join {
            room_id,
            uid,
            display_name,
            media_session_id,
        } => handle_join(room_id, uid, display_name, media_session_id, sender, state).await,
        ClientEvent::Leave { room_id, uid } => handle_leave(room_id, uid, sender, state).await,
    }
}

/// Handle a join: validate, upsert into the registry, ack the joiner with
/// the post-insert snapshot, then notify the rest of the room.
async fn handle_join(
    raw_room: String,
    uid: String,
    display_name: Option<String>,
    media_session_id: String,
    sender: &Arc<PeerHandle>,
    state: &Arc<ServerState>,
) {
    let uid = uid.trim().to_string();
    let media_session_id = media_session_id.trim().to_string();

    let room = match RoomId::normalize(&raw_room) {
        Some(room) if !uid.is_empty() && !media_session_id.is_empty() => room,
        _ => {
            debug!(conn_id = sender.conn_id, "join rejected: missing required field");
            sender.send(ServerEvent::ack_bad_request());
            return;
        }
    };
    let display_name = normalize_display_name(display_name.as_deref());

    let record = PeerRecord {
        uid: uid.clone(),
        display_name: display_name.clone(),
        media_session_id: media_session_id.clone(),
    };
    let peers = state.registry.join(&room, record).await;

    // A second join from the same connection overwrites the binding without
    // leaving the previous room; the old record stays until something names
    // it in an explicit leave.
    sender
        .set_session(Session {
            room: room.clone(),
            uid: uid.clone(),
        })
        .await;

    info!(
        conn_id = sender.conn_id,
        room = %room,
        uid = %uid,
        peers = peers.len(),
        "peer joined"
    );

    // Ack first; notification ordering for the rest of the room is not
    // observable relative to the ack.
    sender.send(ServerEvent::ack_ok(peers));
    broadcast_to_room(
        state,
        &room,
        sender.conn_id,
        ServerEvent::UserJoined {
            uid,
            display_name,
            media_session_id,
        },
    )
    .await;
}

/// Handle an explicit, client-initiated leave. No ack is defined for this
/// event; payloads that normalize to nothing are silently ignored.
async fn handle_leave(raw_room: String, uid: String, sender: &Arc<PeerHandle>, state: &Arc<ServerState>) {
    let uid = uid.trim().to_string();
    let Some(room) = RoomId::normalize(&raw_room) else {
        return;
    };
    if uid.is_empty() {
        return;
    }

    remove_member(state, sender.conn_id, &room, &uid).await;
    sender.take_session().await;
}

/// Disconnect cleanup: runs when a connection's socket closes for any
/// reason. A connection that never completed a join produces no broadcast
/// and no registry change; a joined one is removed exactly once using the
/// session's stored `(room, uid)`.
pub async fn cleanup_client(handle: &Arc<PeerHandle>, state: &Arc<ServerState>) {
    state.remove_client(handle.conn_id);

    if let Some(session) = handle.take_session().await {
        info!(
            conn_id = handle.conn_id,
            room = %session.room,
            uid = %session.uid,
            "connection closed while joined"
        );
        remove_member(state, handle.conn_id, &session.room, &session.uid).await;
    }
}

/// Shared removal path for explicit leave and disconnect: registry leave,
/// then a `user-left` fan-out to whoever is still in the room.
async fn remove_member(state: &Arc<ServerState>, sender_conn: u64, room: &RoomId, uid: &str) {
    let removed = state.registry.leave(room, uid).await;
    debug!(conn_id = sender_conn, room = %room, uid, removed, "peer left");

    broadcast_to_room(
        state,
        room,
        sender_conn,
        ServerEvent::UserLeft {
            uid: uid.to_string(),
        },
    )
    .await;
}

/// Send `event` to every connection whose session is bound to `room`,
/// excluding `except_conn`.
///
/// Snapshots the handle set first; sends are fire-and-forget channel pushes
/// and hold no registry lock.
async fn broadcast_to_room(state: &Arc<ServerState>, room: &RoomId, except_conn: u64, event: ServerEvent) {
    for handle in state.snapshot_clients() {
        if handle.conn_id == except_conn {
            continue;
        }
        match handle.session().await {
            Some(session) if session.room == *room => handle.send(event.clone()),
            _ => {}
        }
    }
}
