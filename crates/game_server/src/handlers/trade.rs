use crate::context::ServerContext;
use crate::dispatch::PacketHandler;
use crate::error::HandlerError;
use crate::protocol::inbound;
use crate::session::Session;
use crate::trade;
use async_trait::async_trait;
use packet_codec::Packet;
use std::sync::Arc;

/// `TRADE_REQUEST target_handle:u32`
pub struct TradeRequestHandler;

#[async_trait]
impl PacketHandler for TradeRequestHandler {
    fn packet_type(&self) -> u16 {
        inbound::TRADE_REQUEST
    }

    async fn handle(&self, ctx: &ServerContext, session: &Arc<Session>, packet: &Packet) -> Result<(), HandlerError> {
        let target_handle = packet.reader().read_u32()?;
        trade::request(ctx, session, target_handle).await
    }
}

/// `TRADE_ACCEPT requester_handle:u32`
pub struct TradeAcceptHandler;

#[async_trait]
impl PacketHandler for TradeAcceptHandler {
    fn packet_type(&self) -> u16 {
        inbound::TRADE_ACCEPT
    }

    async fn handle(&self, ctx: &ServerContext, session: &Arc<Session>, packet: &Packet) -> Result<(), HandlerError> {
        let requester_handle = packet.reader().read_u32()?;
        trade::accept(ctx, session, requester_handle).await
    }
}

/// `TRADE_REFUSE requester_handle:u32`
pub struct TradeRefuseHandler;

#[async_trait]
impl PacketHandler for TradeRefuseHandler {
    fn packet_type(&self) -> u16 {
        inbound::TRADE_REFUSE
    }

    async fn handle(&self, ctx: &ServerContext, session: &Arc<Session>, packet: &Packet) -> Result<(), HandlerError> {
        let requester_handle = packet.reader().read_u32()?;
        trade::refuse(ctx, session, requester_handle).await
    }
}

/// `TRADE_ADD_ITEM inventory_slot:u16 amount:u16`
pub struct TradeAddItemHandler;

#[async_trait]
impl PacketHandler for TradeAddItemHandler {
    fn packet_type(&self) -> u16 {
        inbound::TRADE_ADD_ITEM
    }

    async fn handle(&self, ctx: &ServerContext, session: &Arc<Session>, packet: &Packet) -> Result<(), HandlerError> {
        let mut reader = packet.reader();
        let inventory_slot = reader.read_u16()?;
        let amount = reader.read_u16()?;
        trade::add_item(ctx, session, inventory_slot, amount).await
    }
}

pub struct TradeConfirmHandler;

#[async_trait]
impl PacketHandler for TradeConfirmHandler {
    fn packet_type(&self) -> u16 {
        inbound::TRADE_CONFIRM
    }

    async fn handle(&self, ctx: &ServerContext, session: &Arc<Session>, _packet: &Packet) -> Result<(), HandlerError> {
        trade::confirm(ctx, session).await
    }
}

/// Cancelling when no trade is open does nothing.
pub struct TradeCancelHandler;

#[async_trait]
impl PacketHandler for TradeCancelHandler {
    fn packet_type(&self) -> u16 {
        inbound::TRADE_CANCEL
    }

    async fn handle(&self, ctx: &ServerContext, session: &Arc<Session>, _packet: &Packet) -> Result<(), HandlerError> {
        trade::cancel_for(ctx, session).await;
        Ok(())
    }
}
