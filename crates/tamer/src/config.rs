//! Configuration management for the Tamer game server.
//!
//! Loads the TOML file, validates it and converts it into the types the
//! game server core expects.

use game_server::session::Instance;
use game_server::{GameSettings, ServerConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Smallest frame worth configuring: a header plus one payload byte.
const MIN_PACKET_SIZE: usize = 5;

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Map host settings
    pub server: ServerSettings,
    /// Optional dungeon host sharing the same session directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dungeon: Option<DungeonSettings>,
    #[serde(default)]
    pub trade: TradeSettings,
    #[serde(default)]
    pub social: SocialSettings,
    #[serde(default)]
    pub persistence: PersistenceSettings,
    pub logging: LoggingSettings,
}

/// Network settings of the map host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Network address to bind the map host to (e.g., "127.0.0.1:7607")
    pub bind_address: String,
    /// Channel number the map host serves
    #[serde(default = "default_channel")]
    pub channel: u8,
    /// Maximum number of concurrent client connections per host
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Read inactivity timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
    /// Largest accepted frame in bytes, header included
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,
}

/// A second hosting instance for dungeons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DungeonSettings {
    pub bind_address: String,
    #[serde(default = "default_channel")]
    pub channel: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSettings {
    /// Staging slots per side
    #[serde(default = "default_trade_slots")]
    pub slots: u8,
    /// Seconds without activity before a trade is cancelled
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
    /// Seconds between idle sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialSettings {
    #[serde(default = "default_friend_list_capacity")]
    pub friend_list_capacity: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistenceSettings {
    /// JSON file with characters and guilds loaded at startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_file: Option<PathBuf>,
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

fn default_channel() -> u8 {
    1
}

fn default_max_connections() -> usize {
    1000
}

pub fn default_connection_timeout() -> u64 {
    60
}

fn default_max_packet_size() -> usize {
    game_server::config::ServerConfig::default().max_packet_size
}

fn default_trade_slots() -> u8 {
    5
}

fn default_idle_timeout() -> u64 {
    300
}

fn default_sweep_interval() -> u64 {
    10
}

fn default_friend_list_capacity() -> usize {
    50
}

impl Default for TradeSettings {
    fn default() -> Self {
        Self {
            slots: default_trade_slots(),
            idle_timeout: default_idle_timeout(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

impl Default for SocialSettings {
    fn default() -> Self {
        Self {
            friend_list_capacity: default_friend_list_capacity(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                bind_address: "127.0.0.1:7607".to_string(),
                channel: default_channel(),
                max_connections: default_max_connections(),
                connection_timeout: default_connection_timeout(),
                max_packet_size: default_max_packet_size(),
            },
            dungeon: None,
            trade: TradeSettings::default(),
            social: SocialSettings::default(),
            persistence: PersistenceSettings::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, a default configuration is written to
    /// `path` and returned.
    pub async fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if tokio::fs::try_exists(path).await? {
            let content = tokio::fs::read_to_string(path).await?;
            Ok(toml::from_str(&content)?)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    fn host_config(&self, bind_address: &str, channel: u8, instance: Instance) -> anyhow::Result<ServerConfig> {
        Ok(ServerConfig {
            bind_address: bind_address.parse()?,
            max_connections: self.server.max_connections,
            connection_timeout: self.server.connection_timeout,
            max_packet_size: self.server.max_packet_size,
            channel,
            instance,
        })
    }

    /// The map host's [`ServerConfig`].
    pub fn to_server_config(&self) -> anyhow::Result<ServerConfig> {
        self.host_config(&self.server.bind_address, self.server.channel, Instance::Map)
    }

    /// The dungeon host's [`ServerConfig`], if one is configured.
    pub fn dungeon_server_config(&self) -> anyhow::Result<Option<ServerConfig>> {
        self.dungeon
            .as_ref()
            .map(|d| self.host_config(&d.bind_address, d.channel, Instance::Dungeon))
            .transpose()
    }

    pub fn game_settings(&self) -> GameSettings {
        GameSettings {
            friend_list_capacity: self.social.friend_list_capacity,
            trade_slots: self.trade.slots,
            trade_idle_timeout: Duration::from_secs(self.trade.idle_timeout),
            trade_sweep_interval: Duration::from_secs(self.trade.sweep_interval),
        }
    }

    /// Validates the configuration for consistency and correctness.
    pub fn validate(&self) -> Result<(), String> {
        let map_addr = self
            .server
            .bind_address
            .parse::<SocketAddr>()
            .map_err(|_| format!("Invalid bind address: {}", &self.server.bind_address))?;

        if let Some(dungeon) = &self.dungeon {
            let dungeon_addr = dungeon
                .bind_address
                .parse::<SocketAddr>()
                .map_err(|_| format!("Invalid dungeon bind address: {}", &dungeon.bind_address))?;
            if dungeon_addr == map_addr && map_addr.port() != 0 {
                return Err("Map and dungeon hosts cannot share a bind address".to_string());
            }
        }

        if self.server.max_connections == 0 {
            return Err("max_connections must be at least 1".to_string());
        }
        if self.server.connection_timeout == 0 {
            return Err("connection_timeout must be at least 1 second".to_string());
        }
        if !(MIN_PACKET_SIZE..=u16::MAX as usize).contains(&self.server.max_packet_size) {
            return Err(format!(
                "max_packet_size must be between {MIN_PACKET_SIZE} and {}",
                u16::MAX
            ));
        }

        if self.trade.slots == 0 {
            return Err("Trade slots must be at least 1".to_string());
        }
        if self.trade.idle_timeout == 0 || self.trade.sweep_interval == 0 {
            return Err("Trade idle_timeout and sweep_interval must be positive".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}
