use crate::context::ServerContext;
use crate::dispatch::PacketHandler;
use crate::error::HandlerError;
use crate::model::InventoryError;
use crate::persistence::PersistenceCommand;
use crate::protocol::{self, inbound};
use crate::session::Session;
use async_trait::async_trait;
use packet_codec::Packet;
use std::sync::Arc;
use tracing::debug;

/// `RIDE_UNLOCK partner_type:u32 inventory_slot:u16`
///
/// Consumes one unit from the slot. Repeating an unlock that already
/// happened only repeats the reply: nothing is consumed and nothing is
/// written.
pub struct RideUnlockHandler;

#[async_trait]
impl PacketHandler for RideUnlockHandler {
    fn packet_type(&self) -> u16 {
        inbound::RIDE_UNLOCK
    }

    async fn handle(&self, ctx: &ServerContext, session: &Arc<Session>, packet: &Packet) -> Result<(), HandlerError> {
        let mut reader = packet.reader();
        let partner_type = reader.read_u32()?;
        let inventory_slot = reader.read_u16()?;

        let inventory = {
            let mut character = session.character().await;
            if character.partner.can_ride(partner_type) {
                debug!(
                    character_id = session.character_id(),
                    partner_type, "ride already unlocked"
                );
                drop(character);
                session.send(protocol::ride_unlock(partner_type)?);
                return Ok(());
            }

            character
                .inventory
                .take(inventory_slot, 1)
                .map_err(|e| match e {
                    InventoryError::EmptySlot(_) | InventoryError::InvalidSlot(_) => {
                        HandlerError::validation("There is no item in that slot.")
                    }
                    other => HandlerError::validation(other.to_string()),
                })?;
            character.partner.unlock_ride(partner_type);
            character.inventory.clone()
        };

        session.send(protocol::ride_unlock(partner_type)?);

        let character_id = session.character_id();
        let items = ctx
            .persistence
            .execute(PersistenceCommand::UpdateItemList {
                character_id,
                inventory,
            })
            .await;
        let unlock = ctx
            .persistence
            .execute(PersistenceCommand::UnlockRide {
                character_id,
                partner_type,
            })
            .await;
        items?;
        unlock?;
        Ok(())
    }
}
