use crate::context::ServerContext;
use crate::dispatch::PacketHandler;
use crate::error::HandlerError;
use crate::protocol::{self, inbound};
use crate::session::Session;
use async_trait::async_trait;
use packet_codec::Packet;
use std::sync::Arc;

pub struct EncyclopediaLoadHandler;

#[async_trait]
impl PacketHandler for EncyclopediaLoadHandler {
    fn packet_type(&self) -> u16 {
        inbound::ENCYCLOPEDIA_LOAD
    }

    async fn handle(&self, _ctx: &ServerContext, session: &Arc<Session>, _packet: &Packet) -> Result<(), HandlerError> {
        let frame = {
            let character = session.character().await;
            protocol::encyclopedia(character.encyclopedia.iter())?
        };
        session.send(frame);
        Ok(())
    }
}
