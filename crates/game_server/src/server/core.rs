//! Core game server implementation.
//!
//! A [`GameServer`] is one hosting instance: it owns a listening socket, a
//! connection limit and a shutdown channel, and shares its
//! [`ServerContext`](crate::ServerContext) with every other instance in the
//! process.

use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::error::ServerError;
use crate::server::connection::handle_connection;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Semaphore};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

const STATUS_INTERVAL: Duration = Duration::from_secs(60);

/// One hosting instance (a map host or a dungeon host).
///
/// # Lifecycle
///
/// 1. [`GameServer::start`] binds `bind_address` (or [`GameServer::serve`]
///    takes an already bound listener)
/// 2. every accepted socket gets its own task, bounded by
///    `max_connections`
/// 3. [`GameServer::shutdown`] stops the accept loop and signals every
///    connection worker to tear down
pub struct GameServer {
    config: Arc<ServerConfig>,
    dispatcher: Arc<Dispatcher>,
    connection_slots: Arc<Semaphore>,
    shutdown_sender: broadcast::Sender<()>,
}

impl GameServer {
    pub fn new(config: ServerConfig, dispatcher: Arc<Dispatcher>) -> Self {
        let (shutdown_sender, _) = broadcast::channel(1);
        let connection_slots = Arc::new(Semaphore::new(config.max_connections));
        Self {
            config: Arc::new(config),
            dispatcher,
            connection_slots,
            shutdown_sender,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Binds the configured address and serves until shutdown.
    pub async fn start(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_address)
            .await
            .map_err(|e| ServerError::Network(format!("Bind failed on {}: {e}", self.config.bind_address)))?;
        self.serve(listener).await
    }

    /// Runs the accept loop on `listener` until shutdown is requested.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        if self.config.max_connections == 0 {
            return Err(ServerError::Config("max_connections must be at least 1".into()));
        }
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::Network(e.to_string()))?;
        info!(
            "🚀 {} host listening on {} (channel {})",
            self.config.instance, local_addr, self.config.channel
        );

        let mut shutdown_receiver = self.shutdown_sender.subscribe();
        let mut status = interval(STATUS_INTERVAL);
        status.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };
                    let Ok(permit) = self.connection_slots.clone().try_acquire_owned() else {
                        warn!(%addr, max = self.config.max_connections, "connection limit reached, refusing");
                        continue;
                    };

                    let config = self.config.clone();
                    let dispatcher = self.dispatcher.clone();
                    let shutdown = self.shutdown_sender.subscribe();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, config, dispatcher, shutdown).await {
                            debug!(%addr, "connection ended: {}", e);
                        }
                        drop(permit);
                    });
                }
                _ = status.tick() => {
                    let online = self
                        .dispatcher
                        .context()
                        .directory
                        .online_count(self.config.instance)
                        .await;
                    info!("👥 {} session(s) online on {} host", online, self.config.instance);
                }
                _ = shutdown_receiver.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        info!("Server stopped");
        Ok(())
    }

    /// Stops the accept loop and every connection worker of this instance.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        info!("🛑 Shutting down {} host", self.config.instance);
        // no receivers simply means nothing is running yet
        let _ = self.shutdown_sender.send(());
        Ok(())
    }

    /// Receiver that fires when this instance shuts down.
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_sender.subscribe()
    }
}
