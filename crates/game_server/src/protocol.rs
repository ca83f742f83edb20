//! Packet type identifiers and outbound frame builders.
//!
//! Each builder serializes one frame exactly once; callers that deliver the
//! same frame to several sessions clone the returned [`Bytes`], which only
//! bumps a reference count.

use bytes::Bytes;
use packet_codec::{PacketError, PacketWriter, MAX_STRING_LEN};

/// Client to server packet types.
pub mod inbound {
    pub const JOIN: u16 = 1001;
    pub const LOADING_COMPLETE: u16 = 1002;
    pub const SET_AWAY: u16 = 1003;

    pub const TRADE_REQUEST: u16 = 1510;
    pub const TRADE_ACCEPT: u16 = 1511;
    pub const TRADE_REFUSE: u16 = 1512;
    pub const TRADE_ADD_ITEM: u16 = 1513;
    pub const TRADE_CONFIRM: u16 = 1514;
    pub const TRADE_CANCEL: u16 = 1515;

    pub const FRIEND_ADD: u16 = 2101;
    pub const FRIEND_DELETE: u16 = 2102;
    pub const FRIEND_MEMO: u16 = 2103;

    pub const GUILD_MESSAGE: u16 = 2201;

    pub const QUEST_GIVE_UP: u16 = 3001;
    pub const RIDE_UNLOCK: u16 = 3101;
    pub const ENCYCLOPEDIA_LOAD: u16 = 3201;
}

/// Server to client packet types.
pub mod outbound {
    pub const SYSTEM_MESSAGE: u16 = 100;
    pub const JOIN_ACCEPTED: u16 = 1001;

    pub const TRADE_REQUEST_SUCCESS: u16 = 1510;
    pub const TRADE_ACCEPT: u16 = 1511;
    pub const TRADE_ADD_ITEM: u16 = 1513;
    pub const TRADE_CONFIRM: u16 = 1514;
    pub const TRADE_CANCEL: u16 = 1515;
    pub const TRADE_REQUEST_ERROR: u16 = 1516;
    pub const TRADE_COMPLETE: u16 = 1517;

    pub const FRIEND_ADD: u16 = 2101;
    pub const FRIEND_DELETE: u16 = 2102;
    pub const FRIEND_MEMO: u16 = 2103;
    pub const FRIEND_CONNECT: u16 = 2104;
    pub const FRIEND_DISCONNECT: u16 = 2105;
    pub const FRIEND_NOT_FOUND: u16 = 2106;

    pub const GUILD_MESSAGE: u16 = 2201;
    pub const GUILD_MEMBER_ONLINE: u16 = 2202;

    pub const QUEST_GIVE_UP: u16 = 3001;
    pub const RIDE_UNLOCK: u16 = 3101;
    pub const ENCYCLOPEDIA: u16 = 3201;
}

/// Why a trade request was turned down, as sent to the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TradeRequestError {
    NotFound = 1,
    Loading = 2,
    NotReady = 3,
    Away = 4,
    Busy = 5,
}

impl TradeRequestError {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Longest prefix of `text` that fits a length-prefixed string field,
/// cut on a char boundary.
fn clamp_text(text: &str) -> &str {
    if text.len() <= MAX_STRING_LEN {
        return text;
    }
    let mut end = MAX_STRING_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Messages often quote client input, so overlong text is truncated
/// rather than refused.
pub fn system_message(text: &str) -> Result<Bytes, PacketError> {
    let mut w = PacketWriter::new(outbound::SYSTEM_MESSAGE);
    w.write_string(clamp_text(text))?;
    w.finish()
}

pub fn join_accepted(handle: u32) -> Result<Bytes, PacketError> {
    let mut w = PacketWriter::new(outbound::JOIN_ACCEPTED);
    w.write_u32(handle);
    w.finish()
}

fn handle_only(type_id: u16, handle: u32) -> Result<Bytes, PacketError> {
    let mut w = PacketWriter::new(type_id);
    w.write_u32(handle);
    w.finish()
}

pub fn trade_request_success(requester_handle: u32) -> Result<Bytes, PacketError> {
    handle_only(outbound::TRADE_REQUEST_SUCCESS, requester_handle)
}

pub fn trade_accept(counterpart_handle: u32) -> Result<Bytes, PacketError> {
    handle_only(outbound::TRADE_ACCEPT, counterpart_handle)
}

pub fn trade_add_item(
    mover_handle: u32,
    item_id: u32,
    amount: u16,
    trade_slot: u8,
    inventory_slot: u16,
) -> Result<Bytes, PacketError> {
    let mut w = PacketWriter::new(outbound::TRADE_ADD_ITEM);
    w.write_u32(mover_handle)
        .write_u32(item_id)
        .write_u16(amount)
        .write_u8(trade_slot)
        .write_u16(inventory_slot);
    w.finish()
}

pub fn trade_confirm(handle: u32) -> Result<Bytes, PacketError> {
    handle_only(outbound::TRADE_CONFIRM, handle)
}

pub fn trade_cancel(actor_handle: u32) -> Result<Bytes, PacketError> {
    handle_only(outbound::TRADE_CANCEL, actor_handle)
}

pub fn trade_request_error(reason: TradeRequestError) -> Result<Bytes, PacketError> {
    let mut w = PacketWriter::new(outbound::TRADE_REQUEST_ERROR);
    w.write_u8(reason.code());
    w.finish()
}

pub fn trade_complete() -> Result<Bytes, PacketError> {
    PacketWriter::new(outbound::TRADE_COMPLETE).finish()
}

pub fn friend_add(name: &str, status: u8) -> Result<Bytes, PacketError> {
    let mut w = PacketWriter::new(outbound::FRIEND_ADD);
    w.write_string(name)?.write_u8(status);
    w.finish()
}

fn name_only(type_id: u16, name: &str) -> Result<Bytes, PacketError> {
    let mut w = PacketWriter::new(type_id);
    w.write_string(name)?;
    w.finish()
}

pub fn friend_delete(name: &str) -> Result<Bytes, PacketError> {
    name_only(outbound::FRIEND_DELETE, name)
}

pub fn friend_memo(name: &str, memo: &str) -> Result<Bytes, PacketError> {
    let mut w = PacketWriter::new(outbound::FRIEND_MEMO);
    w.write_string(name)?.write_string(memo)?;
    w.finish()
}

pub fn friend_connect(name: &str) -> Result<Bytes, PacketError> {
    name_only(outbound::FRIEND_CONNECT, name)
}

pub fn friend_disconnect(name: &str) -> Result<Bytes, PacketError> {
    name_only(outbound::FRIEND_DISCONNECT, name)
}

pub fn friend_not_found(name: &str) -> Result<Bytes, PacketError> {
    name_only(outbound::FRIEND_NOT_FOUND, name)
}

pub fn guild_message(sender: &str, text: &str) -> Result<Bytes, PacketError> {
    let mut w = PacketWriter::with_capacity(outbound::GUILD_MESSAGE, sender.len() + text.len() + 2);
    w.write_string(sender)?.write_string(text)?;
    w.finish()
}

pub fn guild_member_online(name: &str, online: bool) -> Result<Bytes, PacketError> {
    let mut w = PacketWriter::new(outbound::GUILD_MEMBER_ONLINE);
    w.write_string(name)?.write_u8(online as u8);
    w.finish()
}

pub fn quest_give_up(quest_id: u16) -> Result<Bytes, PacketError> {
    let mut w = PacketWriter::new(outbound::QUEST_GIVE_UP);
    w.write_u16(quest_id);
    w.finish()
}

pub fn ride_unlock(partner_type: u32) -> Result<Bytes, PacketError> {
    handle_only(outbound::RIDE_UNLOCK, partner_type)
}

/// Entries beyond `u16::MAX` cannot be described by the count field.
pub fn encyclopedia<'a>(entries: impl ExactSizeIterator<Item = &'a u32>) -> Result<Bytes, PacketError> {
    let count = u16::try_from(entries.len())
        .map_err(|_| PacketError::Protocol(format!("{} encyclopedia entries", entries.len())))?;
    let mut w = PacketWriter::with_capacity(outbound::ENCYCLOPEDIA, 2 + 4 * count as usize);
    w.write_u16(count);
    for entry in entries {
        w.write_u32(*entry);
    }
    w.finish()
}
