//! Server configuration.
//!
//! Configuration can be loaded from:
//! - TOML configuration file (`huddle.toml` and standard locations)
//! - Environment variables (`HUDDLE__*`, plus `HUDDLE_HOST` / `HUDDLE_PORT`)

use anyhow::{Context, Result};
use huddle_core::{HubConfig, Role, RoomId, RoomKind, UserId};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Locations searched by [`Config::load`], first match wins.
const CONFIG_PATHS: [&str; 3] = [
    "huddle.toml",
    "/etc/huddle/huddle.toml",
    "~/.config/huddle/huddle.toml",
];

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Users known to the built-in identity provider.
    #[serde(default)]
    pub users: Vec<UserSeed>,

    /// Rooms loaded into the built-in room directory.
    #[serde(default)]
    pub rooms: Vec<RoomSeed>,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Route prefix for WebSocket connections; the room id follows it.
    #[serde(default = "default_ws_prefix")]
    pub websocket_prefix: String,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of concurrent connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Maximum inbound frame size in bytes.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,

    /// Outbound queue capacity per session.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,

    /// Maximum characters of message content.
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,

    /// Consecutive malformed frames tolerated before the connection is closed.
    #[serde(default = "default_max_protocol_errors")]
    pub max_protocol_errors: usize,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// A user and the bearer token that authenticates as them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSeed {
    pub token: String,
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// A room and its members.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSeed {
    pub id: RoomId,
    #[serde(default)]
    pub kind: RoomKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub members: Vec<MemberSeed>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberSeed {
    pub user: UserId,
    #[serde(default)]
    pub role: Role,
}

// Default value functions
fn default_host() -> String {
    std::env::var("HUDDLE_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("HUDDLE_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080)
}

fn default_true() -> bool {
    true
}

fn default_ws_prefix() -> String {
    "/ws/rooms".to_string()
}

fn default_max_connections() -> usize {
    10_000
}

fn default_max_frame_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_outbound_queue() -> usize {
    256
}

fn default_max_content_length() -> usize {
    4096
}

fn default_max_protocol_errors() -> usize {
    16
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            limits: LimitsConfig::default(),
            metrics: MetricsConfig::default(),
            users: Vec::new(),
            rooms: Vec::new(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_prefix: default_ws_prefix(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_frame_size: default_max_frame_size(),
            outbound_queue: default_outbound_queue(),
            max_content_length: default_max_content_length(),
            max_protocol_errors: default_max_protocol_errors(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from the first config file found, layered with
    /// `HUDDLE__*` environment variables (`HUDDLE__LIMITS__MAX_CONNECTIONS`).
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();

        for path in &CONFIG_PATHS {
            let expanded = shellexpand::tilde(path);
            let path = Path::new(expanded.as_ref());
            if path.exists() {
                builder = builder.add_source(
                    config::File::from(path).format(config::FileFormat::Toml),
                );
                break;
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix("HUDDLE")
                .prefix_separator("__")
                .separator("__"),
        );

        builder
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }

    /// Engine limits derived from this configuration.
    #[must_use]
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            outbound_queue: self.limits.outbound_queue,
            max_content_length: self.limits.max_content_length,
            ..HubConfig::default()
        }
    }

    /// WebSocket route, e.g. `/ws/rooms/:room_id`.
    #[must_use]
    pub fn websocket_route(&self) -> String {
        format!(
            "{}/:room_id",
            self.transport.websocket_prefix.trim_end_matches('/')
        )
    }
}
