//! # Game Server - Packet Dispatch Core
//!
//! The network-facing command layer of the Tamer game server. It decodes
//! binary packets from player sessions, routes each one to a handler that
//! mutates in-memory session and character state, issues persistence
//! commands, and sends response or broadcast frames back to one or more
//! sessions.
//!
//! ## Architecture Overview
//!
//! ### Core Components
//!
//! * **Dispatcher** ([`dispatch`]) - immutable packet type to handler table
//!   with panic capture and per-class failure policies
//! * **Session Model** ([`session`]) - per-connection state and a
//!   multi-producer outbound queue
//! * **Directory** ([`directory`]) - instance-spanning lookup of live sessions
//!   by character id or by `(channel, handle)`
//! * **Trade** ([`trade`]) - two-party staged exchange with atomic completion
//! * **Broadcast** ([`broadcast`]) - guild chat and presence fan-out
//! * **Handlers** ([`handlers`]) - one type per inbound packet
//!
//! ### Packet Flow
//!
//! 1. The connection worker frames the socket with [`packet_codec::FrameDecoder`]
//! 2. The first frame must be `JOIN`; the character is loaded and registered
//! 3. Every later packet goes through [`Dispatcher::dispatch`], one at a time
//! 4. Handlers reply through [`Session::send`] and reach other sessions
//!    through the [`Directory`]
//!
//! ## Error Handling
//!
//! Handlers return [`HandlerError`]; the dispatcher maps each variant to a
//! policy (drop, reply, terminate, or log) so no handler failure takes the
//! connection down except a deliberate security termination.
//!
//! ## Thread Safety
//!
//! * The directory sits behind a `tokio::sync::RwLock`
//! * Characters sit behind a per-session `tokio::sync::Mutex`
//! * Each trade serializes both participants through its own mutex, locking
//!   characters lower id first

pub mod broadcast;
pub mod config;
pub mod context;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod model;
pub mod notify;
pub mod persistence;
pub mod protocol;
pub mod server;
pub mod session;
pub mod trade;

pub use config::{GameSettings, ServerConfig};
pub use context::ServerContext;
pub use directory::Directory;
pub use dispatch::{DispatchOutcome, Dispatcher, FailureKind, HandlerRegistry, PacketHandler};
pub use error::{DirectoryError, HandlerError, RegistryError, ServerError};
pub use persistence::{MemoryStore, Persistence, PersistenceCommand, PersistenceError};
pub use server::GameServer;
pub use session::{ConnectionId, Instance, Session, SessionState};

use std::sync::Arc;

/// Builds a [`GameServer`] for `config` with the default handler table.
///
/// Fails only if the handler table is misconfigured.
pub fn create_server(config: ServerConfig, context: Arc<ServerContext>) -> Result<GameServer, RegistryError> {
    let registry = Arc::new(handlers::default_registry()?);
    let dispatcher = Arc::new(Dispatcher::new(registry, context));
    Ok(GameServer::new(config, dispatcher))
}
