//! Huddle Presence Server Binary
//!
//! This is a thin wrapper around the server library that sets up logging
//! and runs the server.

use anyhow::Result;
use clap::Parser;
use huddle_server::{CliArgs, Server, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::load_with_args(CliArgs::parse())?;

    // RUST_LOG wins over the configured level when set.
    let filter = EnvFilter::try_from_env("RUST_LOG")
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let server = Server::bind(config.bind).await?;
    server.run().await
}
