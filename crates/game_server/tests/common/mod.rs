//! Shared harness: an in-memory store, a recording notification sink and
//! joined sessions that are driven through the real dispatcher.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use game_server::model::{Character, CharacterId, Guild, Inventory, Item};
use game_server::notify::{Notification, NotificationKind, NotificationSink, NotifyError};
use game_server::{
    handlers, DispatchOutcome, Dispatcher, GameSettings, Instance, MemoryStore, PersistenceCommand,
    ServerContext, Session,
};
use packet_codec::{Packet, PacketWriter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Default)]
pub struct RecordingSink {
    received: Mutex<Vec<Notification>>,
    failing: AtomicBool,
}

impl RecordingSink {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn received(&self) -> Vec<Notification> {
        self.received.lock().unwrap().clone()
    }

    pub fn of_kind(&self, kind: NotificationKind) -> Vec<Notification> {
        self.received().into_iter().filter(|n| n.kind == kind).collect()
    }

    /// Waits for spawned notification tasks to run.
    pub async fn wait_for(&self, count: usize) -> Vec<Notification> {
        for _ in 0..100 {
            if self.received.lock().unwrap().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.received()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        self.received.lock().unwrap().push(notification);
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Unavailable("relay offline".into()));
        }
        Ok(())
    }
}

pub struct Harness {
    pub ctx: Arc<ServerContext>,
    pub store: Arc<MemoryStore>,
    pub sink: Arc<RecordingSink>,
    pub dispatcher: Dispatcher,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(GameSettings::default())
    }

    pub fn with_settings(settings: GameSettings) -> Self {
        let store = Arc::new(MemoryStore::recording());
        let sink = Arc::new(RecordingSink::default());
        let ctx = Arc::new(ServerContext::new(store.clone(), settings).with_notifier(sink.clone()));
        let registry = Arc::new(handlers::default_registry().unwrap());
        let dispatcher = Dispatcher::new(registry, ctx.clone());
        Self {
            ctx,
            store,
            sink,
            dispatcher,
        }
    }

    /// Stores a character with the given items and returns it.
    pub fn seed(&self, id: CharacterId, name: &str, items: &[(u16, Item)]) -> Character {
        let mut character = Character::new(id, name, 10);
        character.inventory = Inventory::from_slots(10, items.iter().cloned()).unwrap();
        self.store.insert_character(character.clone());
        character
    }

    pub fn seed_guild(&self, id: u32, name: &str, members: &[CharacterId]) {
        self.store.insert_guild(Guild {
            id,
            name: name.to_string(),
            members: members.to_vec(),
        });
    }

    /// Joins a stored character on channel 1 of the map host, ready.
    pub async fn join(&self, id: CharacterId) -> Client {
        self.join_on(id, Instance::Map).await
    }

    pub async fn join_on(&self, id: CharacterId, instance: Instance) -> Client {
        let character = self.store.character(id).expect("character was not seeded");
        let handle = self.ctx.directory.allocate_handle();
        let (session, rx) = Session::new(handle, 1, instance, character);
        self.ctx.directory.register(&session).await.unwrap();
        session.mark_ready();
        Client { session, rx }
    }

    pub async fn send(&self, client: &Client, packet: Packet) -> DispatchOutcome {
        self.dispatcher.dispatch(&client.session, &packet).await
    }

    pub fn commands(&self) -> Vec<PersistenceCommand> {
        self.store.executed()
    }
}

pub struct Client {
    pub session: Arc<Session>,
    rx: UnboundedReceiver<Bytes>,
}

impl Client {
    pub fn handle(&self) -> u32 {
        self.session.handle()
    }

    /// Everything queued for this client since the last call.
    pub fn frames(&mut self) -> Vec<Bytes> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    pub fn packets(&mut self) -> Vec<Packet> {
        self.frames()
            .iter()
            .map(|f| Packet::from_frame(f).unwrap())
            .collect()
    }

    pub fn types(&mut self) -> Vec<u16> {
        self.packets().iter().map(Packet::type_id).collect()
    }
}

/// Encodes a client packet and decodes it back the way the server sees it.
pub fn packet(type_id: u16, build: impl FnOnce(&mut PacketWriter)) -> Packet {
    let mut writer = PacketWriter::new(type_id);
    build(&mut writer);
    Packet::from_frame(&writer.finish().unwrap()).unwrap()
}

pub fn empty(type_id: u16) -> Packet {
    packet(type_id, |_| {})
}
