use crate::context::ServerContext;
use crate::dispatch::PacketHandler;
use crate::error::HandlerError;
use crate::model::FriendEntry;
use crate::persistence::PersistenceCommand;
use crate::protocol::{self, inbound};
use crate::session::{Session, SessionState};
use async_trait::async_trait;
use packet_codec::Packet;
use std::sync::Arc;
use tracing::debug;

/// `FRIEND_ADD name:string`
///
/// An unknown name gets `FRIEND_NOT_FOUND` rather than a system message so
/// the client can show it inline in the friend window.
pub struct FriendAddHandler;

#[async_trait]
impl PacketHandler for FriendAddHandler {
    fn packet_type(&self) -> u16 {
        inbound::FRIEND_ADD
    }

    async fn handle(&self, ctx: &ServerContext, session: &Arc<Session>, packet: &Packet) -> Result<(), HandlerError> {
        let name = packet.reader().read_string()?;
        let capacity = ctx.settings.friend_list_capacity;

        if name.trim().is_empty() {
            return Err(HandlerError::validation("Enter a name."));
        }
        if name.eq_ignore_ascii_case(session.name()) {
            return Err(HandlerError::validation("You cannot add yourself."));
        }
        {
            let character = session.character().await;
            if character.friends.contains(&name) {
                return Err(HandlerError::validation(format!("{name} is already your friend.")));
            }
            if character.friends.len() >= capacity {
                return Err(HandlerError::validation("Your friend list is full."));
            }
        }

        let Some(found) = ctx.persistence.find_character_by_name(&name).await? else {
            session.send(protocol::friend_not_found(&name)?);
            return Ok(());
        };

        let entry = FriendEntry::new(found.name.clone(), found.id);
        session
            .character()
            .await
            .friends
            .add(entry.clone(), capacity)
            .map_err(|e| HandlerError::validation(e.to_string()))?;

        session.send(protocol::friend_add(&found.name, entry.status)?);
        if let Some(friend) = ctx.directory.find_by_character_id(found.id).await {
            if friend.state() == SessionState::Ready {
                session.send(protocol::friend_connect(&found.name)?);
            }
        }
        debug!(character_id = session.character_id(), friend_id = found.id, "friend added");

        ctx.persistence
            .execute(PersistenceCommand::CreateFriend {
                character_id: session.character_id(),
                friend: entry,
            })
            .await?;
        Ok(())
    }
}

/// `FRIEND_DELETE name:string`
pub struct FriendDeleteHandler;

#[async_trait]
impl PacketHandler for FriendDeleteHandler {
    fn packet_type(&self) -> u16 {
        inbound::FRIEND_DELETE
    }

    async fn handle(&self, ctx: &ServerContext, session: &Arc<Session>, packet: &Packet) -> Result<(), HandlerError> {
        let name = packet.reader().read_string()?;
        let removed = session
            .character()
            .await
            .friends
            .remove(&name)
            .map_err(|e| HandlerError::validation(e.to_string()))?;

        session.send(protocol::friend_delete(&removed.name)?);
        ctx.persistence
            .execute(PersistenceCommand::DeleteFriend {
                character_id: session.character_id(),
                friend_id: removed.friend_id,
            })
            .await?;
        Ok(())
    }
}

/// `FRIEND_MEMO name:string memo:string`
pub struct FriendMemoHandler;

#[async_trait]
impl PacketHandler for FriendMemoHandler {
    fn packet_type(&self) -> u16 {
        inbound::FRIEND_MEMO
    }

    async fn handle(&self, ctx: &ServerContext, session: &Arc<Session>, packet: &Packet) -> Result<(), HandlerError> {
        let mut reader = packet.reader();
        let name = reader.read_string()?;
        let memo = reader.read_string()?;

        let entry = session
            .character()
            .await
            .friends
            .set_memo(&name, memo)
            .map_err(|e| HandlerError::validation(e.to_string()))?
            .clone();

        session.send(protocol::friend_memo(&entry.name, &entry.memo)?);
        ctx.persistence
            .execute(PersistenceCommand::UpdateFriendMemo {
                character_id: session.character_id(),
                friend_id: entry.friend_id,
                memo: entry.memo,
            })
            .await?;
        Ok(())
    }
}
