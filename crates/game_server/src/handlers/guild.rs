use crate::broadcast;
use crate::context::ServerContext;
use crate::dispatch::PacketHandler;
use crate::error::HandlerError;
use crate::protocol::inbound;
use crate::session::Session;
use async_trait::async_trait;
use packet_codec::Packet;
use std::sync::Arc;

/// `GUILD_MESSAGE text:string`
pub struct GuildMessageHandler;

#[async_trait]
impl PacketHandler for GuildMessageHandler {
    fn packet_type(&self) -> u16 {
        inbound::GUILD_MESSAGE
    }

    async fn handle(&self, ctx: &ServerContext, session: &Arc<Session>, packet: &Packet) -> Result<(), HandlerError> {
        let text = packet.reader().read_string()?;
        broadcast::guild_chat(ctx, session, &text).await?;
        Ok(())
    }
}
