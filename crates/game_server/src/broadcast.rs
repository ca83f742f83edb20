//! Group delivery for guild chat and presence.
//!
//! A frame is serialized once and the same [`Bytes`] goes to every online
//! member; members that are offline or on a closed connection are skipped.

use crate::context::ServerContext;
use crate::directory::Directory;
use crate::error::HandlerError;
use crate::model::{CharacterId, Guild, GuildId};
use crate::notify::{spawn_notify, Notification};
use crate::persistence::{Persistence, PersistenceCommand, PersistenceError};
use crate::protocol;
use crate::session::Session;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Delivers `frame` to each online member and returns how many got it.
pub async fn fan_out(
    directory: &Directory,
    members: impl IntoIterator<Item = CharacterId>,
    frame: &Bytes,
) -> usize {
    let mut delivered = 0;
    for member in members {
        if let Some(session) = directory.find_by_character_id(member).await {
            if session.send(frame.clone()) {
                delivered += 1;
            }
        }
    }
    delivered
}

/// Guild rosters loaded on first use.
///
/// No packet changes guild membership, so a roster is loaded once and kept
/// for the life of the process.
#[derive(Debug, Default)]
pub struct GuildCache {
    guilds: DashMap<GuildId, Arc<Guild>>,
}

impl GuildCache {
    pub async fn get_or_load(
        &self,
        persistence: &dyn Persistence,
        id: GuildId,
    ) -> Result<Option<Arc<Guild>>, PersistenceError> {
        if let Some(guild) = self.guilds.get(&id) {
            return Ok(Some(guild.clone()));
        }
        let Some(guild) = persistence.load_guild(id).await? else {
            return Ok(None);
        };
        debug!(guild_id = id, members = guild.members.len(), "guild cached");
        let guild = self.guilds.entry(id).or_insert_with(|| Arc::new(guild)).clone();
        Ok(Some(guild))
    }

    pub fn len(&self) -> usize {
        self.guilds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guilds.is_empty()
    }
}

/// Sends a chat line to every online guild member, records it once and
/// relays it to the notification sink.
pub async fn guild_chat(
    ctx: &ServerContext,
    session: &Arc<Session>,
    text: &str,
) -> Result<usize, HandlerError> {
    let guild_id = session
        .character()
        .await
        .guild_id
        .ok_or_else(|| HandlerError::validation("You are not in a guild."))?;
    if text.trim().is_empty() {
        return Err(HandlerError::validation("Message is empty."));
    }
    let guild = ctx
        .guilds
        .get_or_load(ctx.persistence.as_ref(), guild_id)
        .await?
        .ok_or_else(|| HandlerError::validation("Your guild could not be found."))?;

    let frame = protocol::guild_message(session.name(), text)?;
    let delivered = fan_out(&ctx.directory, guild.members.iter().copied(), &frame).await;
    debug!(
        guild_id,
        delivered,
        members = guild.members.len(),
        "guild message delivered"
    );

    spawn_notify(
        ctx.notifier.clone(),
        Notification::guild_chat(
            session.name(),
            format!("[{}] {}", guild.name, text),
            session.channel(),
        ),
    );

    ctx.persistence
        .execute(PersistenceCommand::CreateGuildMessage {
            guild_id,
            sender_id: session.character_id(),
            message: text.to_string(),
        })
        .await?;
    Ok(delivered)
}

/// Tells online friends and guild mates that `session` came online or left.
pub async fn announce_presence(ctx: &ServerContext, session: &Session, online: bool) -> Result<(), HandlerError> {
    let (friend_ids, guild_id): (Vec<CharacterId>, _) = {
        let character = session.character().await;
        (
            character.friends.iter().map(|f| f.friend_id).collect(),
            character.guild_id,
        )
    };

    let friend_frame = if online {
        protocol::friend_connect(session.name())?
    } else {
        protocol::friend_disconnect(session.name())?
    };
    let friends = fan_out(&ctx.directory, friend_ids, &friend_frame).await;

    let mut guild_mates = 0;
    if let Some(guild_id) = guild_id {
        if let Some(guild) = ctx.guilds.get_or_load(ctx.persistence.as_ref(), guild_id).await? {
            let frame = protocol::guild_member_online(session.name(), online)?;
            let others = guild
                .members
                .iter()
                .copied()
                .filter(|id| *id != session.character_id());
            guild_mates = fan_out(&ctx.directory, others, &frame).await;
        }
    }

    info!(
        character_id = session.character_id(),
        online, friends, guild_mates, "presence announced"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Character;
    use crate::persistence::MemoryStore;
    use crate::session::Instance;

    #[tokio::test]
    async fn fan_out_skips_offline_and_closed_members() {
        let directory = Directory::new();
        let (online, mut online_rx) = Session::new(1, 1, Instance::Map, Character::new(1, "a", 1));
        let (closed, mut closed_rx) = Session::new(2, 1, Instance::Dungeon, Character::new(2, "b", 1));
        directory.register(&online).await.unwrap();
        directory.register(&closed).await.unwrap();
        closed.disconnect();

        let frame = Bytes::from_static(b"\x04\x00\x01\x00");
        assert_eq!(fan_out(&directory, [1, 2, 3], &frame).await, 1);
        assert_eq!(online_rx.try_recv().unwrap(), frame);
        assert!(closed_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn guild_roster_is_loaded_once() {
        let store = MemoryStore::new();
        store.insert_guild(Guild {
            id: 7,
            name: "Wings".into(),
            members: vec![1, 2],
        });
        let cache = GuildCache::default();

        let first = cache.get_or_load(&store, 7).await.unwrap().unwrap();
        store.insert_guild(Guild {
            id: 7,
            name: "Wings".into(),
            members: vec![1],
        });
        let second = cache.get_or_load(&store, 7).await.unwrap().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.members, vec![1, 2]);
        assert_eq!(cache.len(), 1);
        assert!(cache.get_or_load(&store, 8).await.unwrap().is_none());
    }
}
