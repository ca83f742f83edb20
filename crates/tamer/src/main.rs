//! Main application entry point for the Tamer game server.
//!
//! Loads configuration, builds the shared server context and runs the map
//! host, an optional dungeon host and the trade idle sweeper until a
//! shutdown signal arrives.

mod cli;
mod config;
mod logging;
mod signals;

use anyhow::{anyhow, Context};
use clap::Parser;
use cli::CliArgs;
use config::AppConfig;
use futures::future::{join_all, select_all};
use game_server::{create_server, trade, GameServer, MemoryStore, ServerContext};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Main application struct.
pub struct Application {
    config: AppConfig,
    context: Arc<ServerContext>,
    hosts: Vec<Arc<GameServer>>,
}

impl Application {
    pub async fn new(args: CliArgs) -> anyhow::Result<Self> {
        // Load configuration first (before logging setup)
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(bind_address) = args.bind_address {
            config.server.bind_address = bind_address;
        }
        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }
        if args.json_logs {
            config.logging.json_format = true;
        }

        config
            .validate()
            .map_err(|e| anyhow!("Configuration validation failed: {e}"))?;
        logging::setup_logging(&config.logging)?;

        let store = match &config.persistence.seed_file {
            Some(path) => MemoryStore::from_json_file(path)
                .with_context(|| format!("loading seed data from {}", path.display()))?,
            None => MemoryStore::new(),
        };
        let context = Arc::new(ServerContext::new(Arc::new(store), config.game_settings()));

        let mut hosts = vec![Arc::new(create_server(config.to_server_config()?, context.clone())?)];
        if let Some(dungeon) = config.dungeon_server_config()? {
            hosts.push(Arc::new(create_server(dungeon, context.clone())?));
        }

        info!(
            "🚀 Tamer Game Server v{} | Config: {}",
            env!("CARGO_PKG_VERSION"),
            args.config_path.display()
        );
        Ok(Self {
            config,
            context,
            hosts,
        })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        info!("📋 Configuration Summary:");
        for host in &self.hosts {
            let host_config = host.config();
            info!(
                "  🌐 {} host: {} (channel {})",
                host_config.instance, host_config.bind_address, host_config.channel
            );
        }
        info!("  👥 Max connections per host: {}", self.config.server.max_connections);
        info!("  ⏱️ Connection timeout: {}s", self.config.server.connection_timeout);
        info!(
            "  🤝 Trade slots: {} | idle timeout: {}s",
            self.config.trade.slots, self.config.trade.idle_timeout
        );

        let (sweeper_shutdown, sweeper_signal) = broadcast::channel(1);
        let sweeper = tokio::spawn(trade::run_idle_sweeper(self.context.clone(), sweeper_signal));

        let running: Vec<_> = self
            .hosts
            .iter()
            .cloned()
            .map(|host| {
                tokio::spawn(async move {
                    if let Err(e) = host.start().await {
                        error!("❌ {} host error: {}", host.config().instance, e);
                    }
                })
            })
            .collect();

        info!("🛑 Press Ctrl+C to gracefully shutdown");
        let (stopped, running) = wait_for_stop(signals::wait_for_shutdown_signal(), running).await?;
        if let Some(index) = stopped {
            error!(
                "{} host stopped unexpectedly, shutting down",
                self.hosts[index].config().instance
            );
        }

        info!("🛑 Shutdown signal received, initiating graceful shutdown...");
        for host in &self.hosts {
            host.shutdown().await?;
        }
        let _ = sweeper_shutdown.send(());

        info!("⏳ Waiting for connections to close...");
        let stopped = tokio::time::timeout(SHUTDOWN_GRACE, join_all(running)).await;
        if stopped.is_err() {
            info!("Grace period elapsed with hosts still stopping");
        }
        let _ = sweeper.await;

        info!("✅ Tamer Game Server shutdown complete");
        Ok(())
    }
}

/// Waits for `signal` or for the first host task to end, whichever comes
/// first. Returns the index of a host that ended on its own and the handles
/// still to be joined. `running` must not be empty.
async fn wait_for_stop(
    signal: impl Future<Output = std::io::Result<()>>,
    running: Vec<JoinHandle<()>>,
) -> std::io::Result<(Option<usize>, Vec<JoinHandle<()>>)> {
    let mut any_stopped = select_all(running);
    tokio::select! {
        result = signal => {
            result?;
            Ok((None, any_stopped.into_inner()))
        }
        (_, index, remaining) = &mut any_stopped => Ok((Some(index), remaining)),
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    let app = match Application::new(args).await {
        Ok(app) => app,
        Err(e) => {
            eprintln!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    };
    if let Err(e) = app.run().await {
        error!("❌ Application error: {:?}", e);
        std::process::exit(1);
    }
    Ok(())
}
