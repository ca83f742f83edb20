//! Packet handlers, one type per packet.
//!
//! Handlers read their fields in wire order, mutate the session's character
//! under its lock, reply, and issue persistence commands last.

mod encyclopedia;
mod friend;
mod guild;
mod partner;
mod quest;
mod session;
mod trade;

pub use encyclopedia::EncyclopediaLoadHandler;
pub use friend::{FriendAddHandler, FriendDeleteHandler, FriendMemoHandler};
pub use guild::GuildMessageHandler;
pub use partner::RideUnlockHandler;
pub use quest::QuestGiveUpHandler;
pub use session::{JoinHandler, LoadingCompleteHandler, SetAwayHandler};
pub use trade::{
    TradeAcceptHandler, TradeAddItemHandler, TradeCancelHandler, TradeConfirmHandler,
    TradeRefuseHandler, TradeRequestHandler,
};

use crate::dispatch::HandlerRegistry;
use crate::error::RegistryError;

/// The full handler table for a hosting instance.
pub fn default_registry() -> Result<HandlerRegistry, RegistryError> {
    Ok(HandlerRegistry::builder()
        .register(JoinHandler)?
        .register(LoadingCompleteHandler)?
        .register(SetAwayHandler)?
        .register(TradeRequestHandler)?
        .register(TradeAcceptHandler)?
        .register(TradeRefuseHandler)?
        .register(TradeAddItemHandler)?
        .register(TradeConfirmHandler)?
        .register(TradeCancelHandler)?
        .register(FriendAddHandler)?
        .register(FriendDeleteHandler)?
        .register(FriendMemoHandler)?
        .register(GuildMessageHandler)?
        .register(QuestGiveUpHandler)?
        .register(RideUnlockHandler)?
        .register(EncyclopediaLoadHandler)?
        .build())
}
