//! Huddle Presence Server Library
//!
//! This crate provides the room presence core for the Huddle signaling
//! service: who is currently in which room, and the join/leave/disconnect
//! lifecycle that keeps every connected client's view in sync. It is
//! designed to be testable and reusable, with the presence logic separated
//! from the binary entrypoint and from socket I/O.
//!
//! # Architecture
//!
//! The server is organized into several modules:
//!
//! - [`config`]: Configuration management (TOML file + env + CLI args)
//! - [`registry`]: The authoritative room membership registry
//! - [`state`]: Connection handles and shared server state
//! - [`handlers`]: Lifecycle event handling and room broadcasts
//! - [`server`]: WebSocket accept loop and connection management
//!
//! # Locking Strategy
//!
//! - **Connection id allocation**: Lock-free via `AtomicU64`
//! - **Connection handles**: `DashMap` for lock-free per-client access
//! - **Room membership**: Single `RwLock` inside [`registry::RoomRegistry`]
//! - **Broadcasts**: Snapshot the handle set first, then fire-and-forget
//!   channel sends with no registry lock held
//!
//! # Example
//!
//! ```no_run
//! use huddle_server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load()?;
//!     let server = Server::bind(config.bind).await?;
//!     server.run().await
//! }
//! ```

pub mod config;
pub mod handlers;
pub mod registry;
pub mod server;
pub mod state;

// Re-export main types for convenience
pub use config::{CliArgs, ServerConfig};
pub use registry::RoomRegistry;
pub use server::Server;
pub use state::{PeerHandle, ServerState, Session};
