//! Server configuration types and defaults.
//!
//! [`ServerConfig`] describes one hosting instance (a map host or a dungeon
//! host). [`GameSettings`] holds the gameplay limits shared by every instance
//! in the process and travels inside the
//! [`ServerContext`](crate::ServerContext).

use crate::session::Instance;
use packet_codec::DEFAULT_MAX_FRAME_LEN;
use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for one hosting instance.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The socket address to bind the server to
    pub bind_address: SocketAddr,

    /// Maximum number of concurrent connections allowed
    pub max_connections: usize,

    /// Read inactivity timeout in seconds
    pub connection_timeout: u64,

    /// Largest accepted frame, header included
    pub max_packet_size: usize,

    /// Channel number sessions on this instance are reachable on
    pub channel: u8,

    /// Which kind of host this is
    pub instance: Instance,
}

impl ServerConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 7607)),
            max_connections: 1000,
            connection_timeout: 60,
            max_packet_size: DEFAULT_MAX_FRAME_LEN,
            channel: 0,
            instance: Instance::Map,
        }
    }
}

/// Gameplay limits shared by all instances.
#[derive(Debug, Clone)]
pub struct GameSettings {
    pub friend_list_capacity: usize,
    /// Staging slots per side of a trade.
    pub trade_slots: u8,
    pub trade_idle_timeout: Duration,
    pub trade_sweep_interval: Duration,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            friend_list_capacity: 50,
            trade_slots: 5,
            trade_idle_timeout: Duration::from_secs(300),
            trade_sweep_interval: Duration::from_secs(10),
        }
    }
}
