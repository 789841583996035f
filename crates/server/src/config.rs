//! Server configuration management.
//!
//! This module handles loading configuration from:
//! 1. Default values
//! 2. TOML config file (huddle-server.toml)
//! 3. Environment variables (HUDDLE_*)
//! 4. Command-line arguments (highest priority)
//!
//! Configuration options:
//! - `bind`: Socket address to bind to (IPv4/IPv6 with port)
//! - `log_level`: Logging level (trace, debug, info, warn, error)

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::{fs, net::SocketAddr, path::PathBuf};
use tracing::info;

/// Port used when the bind address does not specify one.
pub const DEFAULT_PORT: u16 = 4000;

/// Default configuration file content with comments.
pub const DEFAULT_CONFIG_CONTENT: &str = r#"# Huddle Server Configuration
# ===========================
#
# This file configures the Huddle presence/signaling server. All options
# can be overridden via environment variables or command-line arguments.

# Socket address to bind to.
# Supports both IPv4 and IPv6 addresses.
# If no port is specified, 4000 is used.
# Examples:
#   - "[::]:4000"      - All interfaces, IPv6 and IPv4 (default)
#   - "0.0.0.0:4000"   - All IPv4 interfaces only
#   - "127.0.0.1:4000" - Localhost only
bind = "[::]:4000"

# Logging level.
# Options: trace, debug, info, warn, error
log_level = "info"
"#;

/// Command-line arguments for the server.
#[derive(Parser, Debug)]
#[command(name = "huddle-server")]
#[command(about = "Huddle room presence server", long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file.
    /// If the file doesn't exist, it will be created with default values.
    #[arg(short, long, default_value = "huddle-server.toml")]
    pub config: PathBuf,

    /// Socket address to bind to (overrides config file).
    /// Examples: "[::]:4000", "0.0.0.0:4000", "127.0.0.1:8000"
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Logging level (overrides config file).
    /// Options: trace, debug, info, warn, error
    #[arg(short, long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    /// Socket address to bind to.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Logging level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_bind() -> String {
    format!("[::]:{DEFAULT_PORT}")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            log_level: default_log_level(),
        }
    }
}

/// Resolved server configuration.
///
/// This is the final configuration after merging defaults, config file,
/// environment, and CLI args.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to bind to.
    pub bind: SocketAddr,
    /// Logging level.
    pub log_level: String,
}

impl ServerConfig {
    /// Load configuration from CLI args and config file.
    pub fn load() -> Result<Self> {
        Self::load_with_args(CliArgs::parse())
    }

    /// Load configuration with the given CLI args.
    ///
    /// Priority (highest to lowest):
    /// 1. Command-line arguments
    /// 2. Environment variables (HUDDLE_*)
    /// 3. Config file
    /// 4. Default values
    ///
    /// This is useful for testing.
    pub fn load_with_args(args: CliArgs) -> Result<Self> {
        let config_path = &args.config;

        // HUDDLE_NO_CONFIG skips the config file entirely (for testing).
        let file_config = if std::env::var("HUDDLE_NO_CONFIG").is_ok() {
            FileConfig::default()
        } else if config_path.exists() {
            let content = fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?
        } else {
            info!("Config file not found, creating default: {}", config_path.display());
            fs::write(config_path, DEFAULT_CONFIG_CONTENT)
                .with_context(|| format!("Failed to create config file: {}", config_path.display()))?;
            FileConfig::default()
        };

        let env_bind = std::env::var("HUDDLE_BIND")
            .ok()
            .or_else(|| std::env::var("HUDDLE_PORT").ok().map(|p| format!("[::]:{p}")));
        let env_log_level = std::env::var("HUDDLE_LOG_LEVEL").ok();

        let bind_str = args.bind.or(env_bind).unwrap_or(file_config.bind);
        let log_level = args.log_level.or(env_log_level).unwrap_or(file_config.log_level);

        let bind = parse_bind_address(&bind_str)?;

        Ok(Self { bind, log_level })
    }
}

/// Parse a bind address string into a SocketAddr.
///
/// If no port is specified, [`DEFAULT_PORT`] is used.
fn parse_bind_address(s: &str) -> Result<SocketAddr> {
    // Try parsing as-is first
    if let Ok(addr) = s.parse() {
        return Ok(addr);
    }

    // Try adding the default port
    let with_port = if s.contains('[') && !s.contains("]:") {
        // IPv6 without port: [::] -> [::]:4000
        format!("{s}:{DEFAULT_PORT}")
    } else if !s.contains(':') {
        // IPv4 without port: 0.0.0.0 -> 0.0.0.0:4000
        format!("{s}:{DEFAULT_PORT}")
    } else {
        s.to_string()
    };

    with_port
        .parse()
        .with_context(|| format!("Invalid bind address: {s}"))
}
