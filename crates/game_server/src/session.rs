//! Per-connection state.
//!
//! A [`Session`] is created once the connection has joined with a character
//! and lives until the connection worker finishes its teardown. Other
//! connections' workers reach it through the [`Directory`](crate::Directory)
//! and may call [`Session::send`] concurrently: outbound frames go into an
//! unbounded channel that a single writer task drains to the socket, so
//! frames from one producer stay in order.
//!
//! # Locking
//!
//! * `character` is a `tokio::sync::Mutex` and may be held across awaits.
//! * the trade slot is a short `std::sync::Mutex` and is never held across
//!   an await. When two slots are needed they are taken in ascending
//!   character id order.

use crate::model::{Character, CharacterId};
use crate::trade::TradeSession;
use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

/// Unique identifier for a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of server instance hosting a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instance {
    Map,
    Dungeon,
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instance::Map => f.write_str("map"),
            Instance::Dungeon => f.write_str("dungeon"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Joined, client still loading the map.
    Loading,
    Ready,
}

const STATE_LOADING: u8 = 0;
const STATE_READY: u8 = 1;

pub struct Session {
    id: ConnectionId,
    handle: u32,
    channel: u8,
    instance: Instance,
    character_id: CharacterId,
    name: String,
    character: tokio::sync::Mutex<Character>,
    state: AtomicU8,
    away: AtomicBool,
    trade: Mutex<Option<Arc<TradeSession>>>,
    outbound: mpsc::UnboundedSender<Bytes>,
    closed: watch::Sender<bool>,
}

impl Session {
    /// Creates a session in the `Loading` state together with the receiving
    /// end of its outbound queue.
    pub fn new(
        handle: u32,
        channel: u8,
        instance: Instance,
        character: Character,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Bytes>) {
        let (outbound, receiver) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);
        let session = Arc::new(Self {
            id: ConnectionId::new(),
            handle,
            channel,
            instance,
            character_id: character.id,
            name: character.name.clone(),
            character: tokio::sync::Mutex::new(character),
            state: AtomicU8::new(STATE_LOADING),
            away: AtomicBool::new(false),
            trade: Mutex::new(None),
            outbound,
            closed,
        });
        (session, receiver)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn handle(&self) -> u32 {
        self.handle
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn instance(&self) -> Instance {
        self.instance
    }

    pub fn character_id(&self) -> CharacterId {
        self.character_id
    }

    /// Character name, fixed for the session's lifetime.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn character(&self) -> tokio::sync::MutexGuard<'_, Character> {
        self.character.lock().await
    }

    pub fn state(&self) -> SessionState {
        match self.state.load(Ordering::Acquire) {
            STATE_READY => SessionState::Ready,
            _ => SessionState::Loading,
        }
    }

    pub fn mark_ready(&self) {
        self.state.store(STATE_READY, Ordering::Release);
    }

    pub fn is_away(&self) -> bool {
        self.away.load(Ordering::Acquire)
    }

    pub fn set_away(&self, away: bool) {
        self.away.store(away, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        !*self.closed.borrow()
    }

    /// Queues a frame for this session's socket.
    ///
    /// Returns `false` if the connection is already gone; callers treat that
    /// as a no-op.
    pub fn send(&self, frame: Bytes) -> bool {
        self.is_connected() && self.outbound.send(frame).is_ok()
    }

    /// Marks the session closed and wakes its connection worker. Idempotent.
    pub fn disconnect(&self) {
        self.closed.send_replace(true);
    }

    /// Resolves once [`Session::disconnect`] has been called.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    pub fn trade(&self) -> Option<Arc<TradeSession>> {
        self.trade_slot().clone()
    }

    pub fn is_trading(&self) -> bool {
        self.trade_slot().is_some()
    }

    pub(crate) fn trade_slot(&self) -> MutexGuard<'_, Option<Arc<TradeSession>>> {
        self.trade.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .field("channel", &self.channel)
            .field("instance", &self.instance)
            .field("character_id", &self.character_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
