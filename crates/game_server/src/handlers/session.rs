use crate::context::ServerContext;
use crate::dispatch::PacketHandler;
use crate::error::HandlerError;
use crate::protocol::inbound;
use crate::session::Session;
use async_trait::async_trait;
use packet_codec::Packet;
use std::sync::Arc;
use tracing::debug;

/// `JOIN` is consumed by the connection worker before dispatch starts; a
/// second one on a joined session is rejected.
pub struct JoinHandler;

#[async_trait]
impl PacketHandler for JoinHandler {
    fn packet_type(&self) -> u16 {
        inbound::JOIN
    }

    async fn handle(&self, _ctx: &ServerContext, _session: &Arc<Session>, _packet: &Packet) -> Result<(), HandlerError> {
        Err(HandlerError::validation("You are already in game."))
    }
}

pub struct LoadingCompleteHandler;

#[async_trait]
impl PacketHandler for LoadingCompleteHandler {
    fn packet_type(&self) -> u16 {
        inbound::LOADING_COMPLETE
    }

    async fn handle(&self, _ctx: &ServerContext, session: &Arc<Session>, _packet: &Packet) -> Result<(), HandlerError> {
        session.mark_ready();
        debug!(character_id = session.character_id(), "finished loading");
        Ok(())
    }
}

/// `SET_AWAY flag:u8`
pub struct SetAwayHandler;

#[async_trait]
impl PacketHandler for SetAwayHandler {
    fn packet_type(&self) -> u16 {
        inbound::SET_AWAY
    }

    async fn handle(&self, _ctx: &ServerContext, session: &Arc<Session>, packet: &Packet) -> Result<(), HandlerError> {
        let away = packet.reader().read_u8()? != 0;
        session.set_away(away);
        debug!(character_id = session.character_id(), away, "away flag changed");
        Ok(())
    }
}
