//! Server startup and connection management.
//!
//! This module owns the WebSocket transport: the accept loop, the
//! per-connection reader/writer tasks, and disconnect cleanup. Presence
//! logic lives in [`crate::handlers`]; this layer only frames events in and
//! out and signals connection close.

use crate::{
    handlers::{cleanup_client, handle_event},
    state::{PeerHandle, ServerState},
};
use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use huddle_api::{decode_event, encode_event, ClientEvent, ServerEvent};
use std::{net::SocketAddr, sync::Arc};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// The Huddle presence server.
///
/// Accepts WebSocket connections and keeps every client's view of room
/// membership in sync through join/leave acks and broadcasts.
pub struct Server {
    listener: TcpListener,
    state: Arc<ServerState>,
}

impl Server {
    /// Bind the listener. Accepting starts in [`Server::run`].
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        Ok(Self {
            listener,
            state: Arc::new(ServerState::new()),
        })
    }

    /// Local address the server is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared state handle (for tests).
    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    /// Accept connections until the task is dropped or the listener fails.
    pub async fn run(&self) -> Result<()> {
        info!("listening on {}", self.listener.local_addr()?);

        loop {
            let (stream, remote) = self
                .listener
                .accept()
                .await
                .context("listener accept failed")?;
            let state = self.state.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, remote, state).await {
                    debug!(%remote, "connection error: {e:?}");
                }
            });
        }
    }
}

/// Handle a single client connection for its whole lifetime.
///
/// 1. Complete the WebSocket handshake
/// 2. Assign a connection id (lock-free) and register the handle
/// 3. Writer task drains the handle's event channel onto the socket
/// 4. Reader loop decodes frames and feeds the handlers
/// 5. Cleanup runs when either side closes, for any reason
pub async fn handle_connection(
    stream: TcpStream,
    remote: SocketAddr,
    state: Arc<ServerState>,
) -> Result<()> {
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .context("websocket handshake failed")?;
    let (mut ws_tx, mut ws_rx) = ws.split();

    let conn_id = state.allocate_conn_id();
    info!(conn_id, %remote, "new connection");

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let handle = Arc::new(PeerHandle::new(conn_id, tx));
    state.register_client(handle.clone());
    debug!(total_clients = state.client_count(), "client registered");

    // Writer: forward queued events to the socket as JSON text frames.
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if ws_tx.send(Message::Text(encode_event(&event))).await.is_err() {
                break;
            }
        }
    });

    // Reader: decode frames and route them to the coordinator.
    let reader_handle = handle.clone();
    let reader_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = ws_rx.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    debug!(conn_id, "socket read ended: {e}");
                    break;
                }
            };
            match msg {
                Message::Text(text) => match decode_event::<ClientEvent>(&text) {
                    Ok(event) => handle_event(event, &reader_handle, &reader_state).await,
                    Err(e) => warn!(conn_id, "ignoring malformed frame: {e}"),
                },
                Message::Close(_) => break,
                // Pings are answered by the protocol layer; binary frames
                // are not part of this protocol.
                _ => {}
            }
        }
    });

    // Whichever task finishes first, the connection is done.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    cleanup_client(&handle, &state).await;
    info!(conn_id, %remote, "connection closed");
    Ok(())
}
