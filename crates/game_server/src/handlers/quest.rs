use crate::context::ServerContext;
use crate::dispatch::PacketHandler;
use crate::error::HandlerError;
use crate::persistence::PersistenceCommand;
use crate::protocol::{self, inbound};
use crate::session::Session;
use async_trait::async_trait;
use packet_codec::Packet;
use std::sync::Arc;
use tracing::warn;

/// `QUEST_GIVE_UP quest_id:u16`
///
/// Giving up a quest that is not in progress is ignored without a reply.
pub struct QuestGiveUpHandler;

#[async_trait]
impl PacketHandler for QuestGiveUpHandler {
    fn packet_type(&self) -> u16 {
        inbound::QUEST_GIVE_UP
    }

    async fn handle(&self, ctx: &ServerContext, session: &Arc<Session>, packet: &Packet) -> Result<(), HandlerError> {
        let quest_id = packet.reader().read_u16()?;

        if !session.character().await.quests.remove(&quest_id) {
            warn!(
                character_id = session.character_id(),
                quest_id, "give up requested for a quest not in progress"
            );
            return Ok(());
        }

        session.send(protocol::quest_give_up(quest_id)?);
        ctx.persistence
            .execute(PersistenceCommand::RemoveQuest {
                character_id: session.character_id(),
                quest_id,
            })
            .await?;
        Ok(())
    }
}
