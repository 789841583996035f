//! Connection state and shared server state.
//!
//! This module holds the per-connection [`PeerHandle`] and the process-wide
//! [`ServerState`], designed to be testable in isolation without network
//! connections: a handle is just an outbound event channel, so tests can
//! drive the coordinator with plain mpsc pairs.
//!
//! # Locking Strategy
//!
//! - **`next_conn_id`**: `AtomicU64` for lock-free id allocation
//! - **`clients`**: `DashMap` for lock-free per-connection access
//! - **`registry`**: a single `RwLock` inside [`RoomRegistry`]
//! - **session**: one small `RwLock<Option<Session>>` per connection
//!
//! Broadcast paths snapshot the client set first and then send without
//! holding the registry lock; sends are channel pushes and never block.

use crate::registry::RoomRegistry;
use dashmap::DashMap;
use huddle_api::{RoomId, ServerEvent};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::{mpsc, RwLock};

/// A connection's single active room membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub room: RoomId,
    pub uid: String,
}

/// Handle to one connected client.
///
/// Outbound events go through an unbounded channel drained by the
/// connection's writer task, so the coordinator never touches the socket.
#[derive(Debug)]
pub struct PeerHandle {
    /// Server-assigned connection id (immutable).
    pub conn_id: u64,
    tx: mpsc::UnboundedSender<ServerEvent>,
    /// Active membership, if any. Set on a successful join, overwritten on a
    /// repeat join, cleared on leave and disconnect.
    session: RwLock<Option<Session>>,
}

impl PeerHandle {
    pub fn new(conn_id: u64, tx: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            conn_id,
            tx,
            session: RwLock::new(None),
        }
    }

    /// Queue an event for delivery, fire-and-forget. A send failure means
    /// the writer task is gone and the connection is already closing, so
    /// the event is simply dropped.
    pub fn send(&self, event: ServerEvent) {
        let _ = self.tx.send(event);
    }

    pub async fn set_session(&self, session: Session) {
        *self.session.write().await = Some(session);
    }

    /// Clear the active session, returning what was bound.
    pub async fn take_session(&self) -> Option<Session> {
        self.session.write().await.take()
    }

    /// Current session binding (read-only, fast).
    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }
}

/// The server's shared state: connection handles plus the room registry.
///
/// Client lookup and iteration are lock-free via `DashMap`; membership
/// mutations go through [`RoomRegistry`].
pub struct ServerState {
    clients: DashMap<u64, Arc<PeerHandle>>,
    pub registry: RoomRegistry,
    next_conn_id: AtomicU64,
}

impl ServerState {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
            registry: RoomRegistry::new(),
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Allocate the next connection id (lock-free).
    pub fn allocate_conn_id(&self) -> u64 {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a newly accepted connection.
    pub fn register_client(&self, handle: Arc<PeerHandle>) {
        self.clients.insert(handle.conn_id, handle);
    }

    /// Remove a connection by id.
    pub fn remove_client(&self, conn_id: u64) {
        self.clients.remove(&conn_id);
    }

    /// Number of connected clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Snapshot of all handles for iteration outside the map. Use this
    /// before any await so broadcasts hold no map guard.
    pub fn snapshot_clients(&self) -> Vec<Arc<PeerHandle>> {
        self.clients.iter().map(|r| r.value().clone()).collect()
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}
