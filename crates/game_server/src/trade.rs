//! Two-party staged item exchange.
//!
//! ```text
//! Idle --request--> Requested --accept--> Negotiating --both confirm--> Completed
//!                       |                      |
//!                       +---- refuse/cancel ---+--> Cancelled
//! ```
//!
//! Both connection workers of a trade act on the same [`TradeSession`]; its
//! state mutex serializes them. Lock order is the state mutex first, then
//! the character mutexes with the lower character id first. The per-session
//! trade slots are plain `std` mutexes, taken in ascending character id
//! order and never across an await.
//!
//! Staged items are copies. The main inventories are only touched at
//! completion, which works on clones of both inventories and commits them
//! together or not at all. Every abort goes through the cancel path.

use crate::context::ServerContext;
use crate::error::HandlerError;
use crate::model::{CharacterId, Inventory, Item};
use crate::persistence::PersistenceCommand;
use crate::protocol::{self, TradeRequestError};
use crate::session::{Session, SessionState};
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tracing::{debug, info, warn};

pub type TradeId = u64;

/// Handle reported as the actor when the server itself cancels a trade.
pub const SYSTEM_ACTOR: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradePhase {
    Requested,
    Negotiating,
    Completed,
    Cancelled,
}

impl TradePhase {
    pub fn is_finished(self) -> bool {
        matches!(self, TradePhase::Completed | TradePhase::Cancelled)
    }
}

/// A copy of inventory units offered in the trade window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedItem {
    pub trade_slot: u8,
    pub inventory_slot: u16,
    pub item: Item,
}

#[derive(Debug, Default)]
struct TradeSide {
    staged: Vec<StagedItem>,
    confirmed: bool,
}

impl TradeSide {
    fn staged_from(&self, inventory_slot: u16) -> u32 {
        self.staged
            .iter()
            .filter(|s| s.inventory_slot == inventory_slot)
            .map(|s| s.item.amount as u32)
            .sum()
    }
}

#[derive(Debug)]
pub struct TradeState {
    phase: TradePhase,
    sides: [TradeSide; 2],
    last_activity: Instant,
}

impl TradeState {
    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn phase(&self) -> TradePhase {
        self.phase
    }

    pub fn staged(&self, side: usize) -> &[StagedItem] {
        &self.sides[side].staged
    }

    pub fn confirmed(&self, side: usize) -> bool {
        self.sides[side].confirmed
    }
}

#[derive(Debug)]
pub struct Participant {
    pub character_id: CharacterId,
    pub handle: u32,
    session: Weak<Session>,
}

impl Participant {
    fn new(session: &Arc<Session>) -> Self {
        Self {
            character_id: session.character_id(),
            handle: session.handle(),
            session: Arc::downgrade(session),
        }
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.upgrade()
    }

    /// Vanished sessions are skipped.
    fn send(&self, frame: Bytes) {
        if let Some(session) = self.session() {
            session.send(frame);
        }
    }
}

#[derive(Debug)]
pub struct TradeSession {
    id: TradeId,
    requester: Participant,
    target: Participant,
    state: Mutex<TradeState>,
}

/// Side index of the requester in [`TradeState::staged`].
pub const REQUESTER: usize = 0;
pub const TARGET: usize = 1;

impl TradeSession {
    pub fn id(&self) -> TradeId {
        self.id
    }

    pub fn requester(&self) -> &Participant {
        &self.requester
    }

    pub fn target(&self) -> &Participant {
        &self.target
    }

    pub async fn state(&self) -> MutexGuard<'_, TradeState> {
        self.state.lock().await
    }

    fn side_of(&self, character_id: CharacterId) -> Option<usize> {
        if character_id == self.requester.character_id {
            Some(REQUESTER)
        } else if character_id == self.target.character_id {
            Some(TARGET)
        } else {
            None
        }
    }

    fn send_both(&self, frame: Bytes) {
        self.requester.send(frame.clone());
        self.target.send(frame);
    }

    /// Participants in ascending character id order.
    fn ordered(&self) -> [&Participant; 2] {
        if self.requester.character_id < self.target.character_id {
            [&self.requester, &self.target]
        } else {
            [&self.target, &self.requester]
        }
    }

    /// Moves the trade to a terminal phase and unbinds both sessions.
    /// Returns `false` if it had already finished.
    fn finish_locked(&self, ctx: &ServerContext, state: &mut TradeState, phase: TradePhase) -> bool {
        if state.phase.is_finished() {
            return false;
        }
        state.phase = phase;
        for side in state.sides.iter_mut() {
            side.staged.clear();
            side.confirmed = false;
        }

        let sessions: Vec<Arc<Session>> = self.ordered().iter().filter_map(|p| p.session()).collect();
        for session in &sessions {
            let mut slot = session.trade_slot();
            if slot.as_ref().is_some_and(|t| t.id == self.id) {
                *slot = None;
            }
        }
        ctx.trades.remove(self.id);
        true
    }

    fn cancel_locked(&self, ctx: &ServerContext, state: &mut TradeState, actor_handle: u32) -> bool {
        if !self.finish_locked(ctx, state, TradePhase::Cancelled) {
            return false;
        }
        match protocol::trade_cancel(actor_handle) {
            Ok(frame) => self.send_both(frame),
            Err(e) => warn!(trade_id = self.id, "could not encode trade cancel: {}", e),
        }
        info!(trade_id = self.id, actor_handle, "trade cancelled");
        true
    }
}

/// Clears both sides and notifies both participants.
///
/// Safe to call from either side, from teardown and from the idle sweeper;
/// only the first call has any effect.
pub async fn cancel(ctx: &ServerContext, trade: &Arc<TradeSession>, actor_handle: u32) -> bool {
    let mut state = trade.state.lock().await;
    trade.cancel_locked(ctx, &mut state, actor_handle)
}

/// Active trades by id, used by the idle sweeper.
#[derive(Debug, Default)]
pub struct TradeRegistry {
    trades: DashMap<TradeId, Arc<TradeSession>>,
    next_id: AtomicU64,
}

impl TradeRegistry {
    fn allocate_id(&self) -> TradeId {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn insert(&self, trade: Arc<TradeSession>) {
        self.trades.insert(trade.id, trade);
    }

    fn remove(&self, id: TradeId) {
        self.trades.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<TradeSession>> {
        self.trades.iter().map(|entry| entry.value().clone()).collect()
    }
}

fn reply(session: &Session, frame: Result<Bytes, packet_codec::PacketError>) -> Result<(), HandlerError> {
    session.send(frame?);
    Ok(())
}

/// Binds a new trade to both sessions and registers it.
///
/// A teardown that ran before the slots were bound found nothing to cancel,
/// so a participant that closed meanwhile unbinds the trade again.
async fn bind(
    ctx: &ServerContext,
    requester: &Arc<Session>,
    target: &Arc<Session>,
) -> Result<Arc<TradeSession>, TradeRequestError> {
    let trade = Arc::new(TradeSession {
        id: ctx.trades.allocate_id(),
        requester: Participant::new(requester),
        target: Participant::new(target),
        state: Mutex::new(TradeState {
            phase: TradePhase::Requested,
            sides: Default::default(),
            last_activity: Instant::now(),
        }),
    });

    {
        let (first, second) = if requester.character_id() < target.character_id() {
            (requester, target)
        } else {
            (target, requester)
        };
        let mut first_slot = first.trade_slot();
        let mut second_slot = second.trade_slot();
        if first_slot.is_some() || second_slot.is_some() {
            return Err(TradeRequestError::Busy);
        }
        *first_slot = Some(trade.clone());
        *second_slot = Some(trade.clone());
        ctx.trades.insert(trade.clone());
    }

    if !(requester.is_connected() && target.is_connected()) {
        let mut state = trade.state.lock().await;
        trade.finish_locked(ctx, &mut state, TradePhase::Cancelled);
        debug!(trade_id = trade.id, "participant closed while the trade was bound");
        return Err(TradeRequestError::NotFound);
    }
    Ok(trade)
}

/// `TRADE_REQUEST`: pairs `requester` with the session behind `target_handle`
/// on the requester's channel.
pub async fn request(
    ctx: &ServerContext,
    requester: &Arc<Session>,
    target_handle: u32,
) -> Result<(), HandlerError> {
    let rejection = |reason: TradeRequestError| {
        debug!(
            character_id = requester.character_id(),
            target_handle,
            ?reason,
            "trade request rejected"
        );
        reply(requester, protocol::trade_request_error(reason))
    };

    if requester.state() != SessionState::Ready {
        return rejection(TradeRequestError::NotReady);
    }
    let target = match ctx
        .directory
        .find_by_handle_and_channel(target_handle, requester.channel())
        .await
    {
        Some(target) if target.character_id() != requester.character_id() => target,
        _ => return rejection(TradeRequestError::NotFound),
    };
    if target.state() == SessionState::Loading {
        return rejection(TradeRequestError::Loading);
    }
    if target.is_away() {
        return rejection(TradeRequestError::Away);
    }

    let trade = match bind(ctx, requester, &target).await {
        Ok(trade) => trade,
        Err(reason) => return rejection(reason),
    };

    info!(
        trade_id = trade.id,
        requester = requester.character_id(),
        target = target.character_id(),
        "trade requested"
    );
    reply(&target, protocol::trade_request_success(requester.handle()))
}

fn current_trade(session: &Session) -> Result<Arc<TradeSession>, HandlerError> {
    session
        .trade()
        .ok_or_else(|| HandlerError::validation("You are not trading."))
}

/// `TRADE_ACCEPT` from the target.
pub async fn accept(
    ctx: &ServerContext,
    session: &Arc<Session>,
    requester_handle: u32,
) -> Result<(), HandlerError> {
    let trade = current_trade(session)?;
    if trade.target.character_id != session.character_id() || trade.requester.handle != requester_handle {
        return Err(HandlerError::validation("There is no such trade request."));
    }

    let mut state = trade.state.lock().await;
    if state.phase != TradePhase::Requested {
        return Err(HandlerError::validation("The trade request is no longer pending."));
    }
    if !trade.requester.session().is_some_and(|s| s.is_connected()) {
        trade.cancel_locked(ctx, &mut state, SYSTEM_ACTOR);
        return Err(HandlerError::validation("The other player has left."));
    }
    state.phase = TradePhase::Negotiating;
    state.touch();
    drop(state);

    trade.requester.send(protocol::trade_accept(trade.target.handle)?);
    trade.target.send(protocol::trade_accept(trade.requester.handle)?);
    debug!(trade_id = trade.id, "trade negotiating");
    Ok(())
}

/// `TRADE_REFUSE`: the target declines. Refusing nothing is a no-op.
pub async fn refuse(
    ctx: &ServerContext,
    session: &Arc<Session>,
    requester_handle: u32,
) -> Result<(), HandlerError> {
    let Some(trade) = session.trade() else {
        return Ok(());
    };
    if trade.requester.handle != requester_handle {
        debug!(
            trade_id = trade.id,
            requester_handle, "refusal names a different requester"
        );
    }
    cancel(ctx, &trade, session.handle()).await;
    Ok(())
}

/// `TRADE_ADD_ITEM`: stages a copy of `amount` units from `inventory_slot`.
///
/// Asking for more than the slot holds, counting what is already staged
/// from it, is a duplication attempt and nothing is staged.
pub async fn add_item(
    ctx: &ServerContext,
    session: &Arc<Session>,
    inventory_slot: u16,
    amount: u16,
) -> Result<(), HandlerError> {
    let trade = current_trade(session)?;
    let side = trade
        .side_of(session.character_id())
        .ok_or_else(|| HandlerError::Internal("session bound to a foreign trade".into()))?;

    let mut state = trade.state.lock().await;
    if state.phase != TradePhase::Negotiating {
        return Err(HandlerError::validation("The trade has not been accepted yet."));
    }
    if amount == 0 {
        return Err(HandlerError::validation("Choose at least one item."));
    }

    let staged = {
        let character = session.character().await;
        let item = character
            .inventory
            .get(inventory_slot)
            .ok_or_else(|| HandlerError::validation("That slot is empty."))?;

        let already = state.sides[side].staged_from(inventory_slot);
        if already + amount as u32 > item.amount as u32 {
            return Err(HandlerError::security(format!(
                "tried to stage {amount} from slot {inventory_slot} holding {} ({already} already staged)",
                item.amount
            )));
        }
        if state.sides[side].staged.len() >= ctx.settings.trade_slots as usize {
            return Err(HandlerError::validation("The trade window is full."));
        }

        StagedItem {
            trade_slot: state.sides[side].staged.len() as u8,
            inventory_slot,
            item: Item {
                amount,
                ..item.clone()
            },
        }
    };

    let frame = protocol::trade_add_item(
        session.handle(),
        staged.item.item_id,
        amount,
        staged.trade_slot,
        inventory_slot,
    )?;
    state.sides[side].staged.push(staged);
    for s in state.sides.iter_mut() {
        s.confirmed = false;
    }
    state.touch();
    drop(state);

    trade.send_both(frame);
    Ok(())
}

/// `TRADE_CONFIRM`: completes the trade once both sides have confirmed.
pub async fn confirm(ctx: &ServerContext, session: &Arc<Session>) -> Result<(), HandlerError> {
    let trade = current_trade(session)?;
    let side = trade
        .side_of(session.character_id())
        .ok_or_else(|| HandlerError::Internal("session bound to a foreign trade".into()))?;

    let mut state = trade.state.lock().await;
    if state.phase != TradePhase::Negotiating {
        return Err(HandlerError::validation("The trade has not been accepted yet."));
    }
    state.sides[side].confirmed = true;
    state.touch();
    trade.send_both(protocol::trade_confirm(session.handle())?);

    if state.sides.iter().all(|s| s.confirmed) {
        complete(ctx, &trade, &mut state).await?;
    }
    Ok(())
}

/// Applies the staged transfers to clones of both inventories.
fn transfer(
    mut from_requester: Inventory,
    mut from_target: Inventory,
    state: &TradeState,
) -> Result<(Inventory, Inventory), String> {
    let take_all = |inventory: &mut Inventory, staged: &[StagedItem]| -> Result<Vec<Item>, String> {
        staged
            .iter()
            .map(|s| {
                let held = inventory
                    .get(s.inventory_slot)
                    .map(|i| (i.item_id, i.expires_at));
                if held != Some((s.item.item_id, s.item.expires_at)) {
                    return Err(format!("slot {} no longer holds the staged item", s.inventory_slot));
                }
                inventory.take(s.inventory_slot, s.item.amount).map_err(|e| e.to_string())
            })
            .collect()
    };

    let to_target = take_all(&mut from_requester, &state.sides[REQUESTER].staged)?;
    let to_requester = take_all(&mut from_target, &state.sides[TARGET].staged)?;
    for item in to_target {
        from_target.insert(item).map_err(|e| format!("target: {e}"))?;
    }
    for item in to_requester {
        from_requester.insert(item).map_err(|e| format!("requester: {e}"))?;
    }
    Ok((from_requester, from_target))
}

async fn complete(
    ctx: &ServerContext,
    trade: &Arc<TradeSession>,
    state: &mut TradeState,
) -> Result<(), HandlerError> {
    let sessions = (trade.requester.session(), trade.target.session());
    let (Some(requester), Some(target)) = sessions else {
        trade.cancel_locked(ctx, state, SYSTEM_ACTOR);
        return Ok(());
    };
    if !requester.is_connected() || !target.is_connected() {
        trade.cancel_locked(ctx, state, SYSTEM_ACTOR);
        return Ok(());
    }

    let (requester_inventory, target_inventory) = {
        let (mut requester_char, mut target_char) = if requester.character_id() < target.character_id() {
            let r = requester.character().await;
            let t = target.character().await;
            (r, t)
        } else {
            let t = target.character().await;
            let r = requester.character().await;
            (r, t)
        };

        match transfer(
            requester_char.inventory.clone(),
            target_char.inventory.clone(),
            state,
        ) {
            Ok((r, t)) => {
                requester_char.inventory = r;
                target_char.inventory = t;
                (
                    requester_char.inventory.clone(),
                    target_char.inventory.clone(),
                )
            }
            Err(reason) => {
                drop((requester_char, target_char));
                warn!(trade_id = trade.id, "trade completion aborted: {}", reason);
                trade.cancel_locked(ctx, state, SYSTEM_ACTOR);
                return Ok(());
            }
        }
    };

    trade.finish_locked(ctx, state, TradePhase::Completed);
    trade.send_both(protocol::trade_complete()?);
    info!(
        trade_id = trade.id,
        requester = trade.requester.character_id,
        target = trade.target.character_id,
        "🤝 trade completed"
    );

    let requester_result = ctx
        .persistence
        .execute(PersistenceCommand::UpdateItemList {
            character_id: trade.requester.character_id,
            inventory: requester_inventory,
        })
        .await;
    let target_result = ctx
        .persistence
        .execute(PersistenceCommand::UpdateItemList {
            character_id: trade.target.character_id,
            inventory: target_inventory,
        })
        .await;
    requester_result?;
    target_result?;
    Ok(())
}

/// `TRADE_CANCEL` from a participant, or teardown of a session.
pub async fn cancel_for(ctx: &ServerContext, session: &Session) -> bool {
    match session.trade() {
        Some(trade) => cancel(ctx, &trade, session.handle()).await,
        None => false,
    }
}

/// Cancels every trade idle for at least `timeout`.
pub async fn sweep_idle(ctx: &ServerContext, timeout: Duration) -> usize {
    let mut cancelled = 0;
    for trade in ctx.trades.snapshot() {
        let mut state = trade.state.lock().await;
        if state.last_activity.elapsed() >= timeout && trade.cancel_locked(ctx, &mut state, SYSTEM_ACTOR) {
            cancelled += 1;
        }
    }
    if cancelled > 0 {
        info!("⏱️ Cancelled {} idle trade(s)", cancelled);
    }
    cancelled
}

/// Runs [`sweep_idle`] on the configured interval until shutdown.
pub async fn run_idle_sweeper(ctx: Arc<ServerContext>, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(ctx.settings.trade_sweep_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sweep_idle(&ctx, ctx.settings.trade_idle_timeout).await;
            }
            _ = shutdown.recv() => break,
        }
    }
    debug!("trade sweeper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameSettings;
    use crate::model::Character;
    use crate::persistence::MemoryStore;
    use crate::session::Instance;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Player {
        session: Arc<Session>,
        rx: UnboundedReceiver<Bytes>,
    }

    impl Player {
        fn drain(&mut self) -> Vec<u16> {
            let mut types = Vec::new();
            while let Ok(frame) = self.rx.try_recv() {
                types.push(u16::from_le_bytes([frame[2], frame[3]]));
            }
            types
        }
    }

    async fn player(
        ctx: &ServerContext,
        store: &MemoryStore,
        id: CharacterId,
        items: &[(u16, Item)],
    ) -> Player {
        let mut character = Character::new(id, format!("p{id}"), 6);
        character.inventory = Inventory::from_slots(6, items.iter().cloned()).unwrap();
        store.insert_character(character.clone());

        let (session, rx) = Session::new(id as u32 + 100, 1, Instance::Map, character);
        session.mark_ready();
        ctx.directory.register(&session).await.unwrap();
        Player { session, rx }
    }

    fn context() -> (ServerContext, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::recording());
        (ServerContext::new(store.clone(), GameSettings::default()), store)
    }

    async fn negotiating(ctx: &ServerContext, a: &mut Player, b: &mut Player) -> Arc<TradeSession> {
        request(ctx, &a.session, b.session.handle()).await.unwrap();
        accept(ctx, &b.session, a.session.handle()).await.unwrap();
        a.drain();
        b.drain();
        a.session.trade().unwrap()
    }

    #[tokio::test]
    async fn busy_participant_cannot_be_requested() {
        let (ctx, store) = context();
        let mut a = player(&ctx, &store, 1, &[]).await;
        let b = player(&ctx, &store, 2, &[]).await;
        let c = player(&ctx, &store, 3, &[]).await;

        request(&ctx, &a.session, b.session.handle()).await.unwrap();
        request(&ctx, &c.session, b.session.handle()).await.unwrap();

        assert!(c.session.trade().is_none());
        assert_eq!(b.session.trade().unwrap().requester().character_id, 1);
        assert!(a.drain().is_empty());
    }

    #[tokio::test]
    async fn target_closing_during_binding_leaves_nobody_trading() {
        let (ctx, store) = context();
        let mut a = player(&ctx, &store, 1, &[]).await;
        let b = player(&ctx, &store, 2, &[]).await;
        let mut c = player(&ctx, &store, 3, &[]).await;

        // teardown already ran and found no trade to cancel
        b.session.disconnect();
        assert!(!cancel_for(&ctx, &b.session).await);

        assert_eq!(
            bind(&ctx, &a.session, &b.session).await.unwrap_err(),
            TradeRequestError::NotFound
        );
        assert!(!a.session.is_trading());
        assert!(!b.session.is_trading());
        assert!(ctx.trades.is_empty());
        assert!(a.drain().is_empty());

        request(&ctx, &a.session, c.session.handle()).await.unwrap();
        assert_eq!(c.drain(), vec![protocol::outbound::TRADE_REQUEST_SUCCESS]);
        assert_eq!(a.session.trade().unwrap().target().character_id, 3);
    }

    #[tokio::test]
    async fn teardown_after_binding_unregisters_the_trade() {
        let (ctx, store) = context();
        let mut a = player(&ctx, &store, 1, &[]).await;
        let b = player(&ctx, &store, 2, &[]).await;

        request(&ctx, &a.session, b.session.handle()).await.unwrap();
        b.session.disconnect();
        assert!(cancel_for(&ctx, &b.session).await);

        assert!(!a.session.is_trading());
        assert!(ctx.trades.is_empty());
        assert_eq!(a.drain(), vec![protocol::outbound::TRADE_CANCEL]);
    }

    #[tokio::test]
    async fn completion_moves_staged_items() {
        let (ctx, store) = context();
        let mut a = player(&ctx, &store, 1, &[(0, Item::new(500, 3))]).await;
        let mut b = player(&ctx, &store, 2, &[(2, Item::new(600, 1))]).await;
        negotiating(&ctx, &mut a, &mut b).await;

        add_item(&ctx, &a.session, 0, 2).await.unwrap();
        add_item(&ctx, &b.session, 2, 1).await.unwrap();
        confirm(&ctx, &a.session).await.unwrap();
        confirm(&ctx, &b.session).await.unwrap();

        let a_inv = a.session.character().await.inventory.clone();
        let b_inv = b.session.character().await.inventory.clone();
        assert_eq!((a_inv.count(500), a_inv.count(600)), (1, 1));
        assert_eq!((b_inv.count(500), b_inv.count(600)), (2, 0));
        assert!(a.drain().contains(&protocol::outbound::TRADE_COMPLETE));
        assert!(!a.session.is_trading() && !b.session.is_trading());
        assert!(ctx.trades.is_empty());

        let updates = store
            .executed()
            .into_iter()
            .filter(|c| matches!(c, PersistenceCommand::UpdateItemList { .. }))
            .count();
        assert_eq!(updates, 2);
    }

    #[tokio::test]
    async fn completion_aborts_when_receiver_is_full() {
        let (ctx, store) = context();
        let full: Vec<(u16, Item)> = (0..6).map(|s| (s, Item::new(900 + s as u32, 1))).collect();
        let mut a = player(&ctx, &store, 1, &[(0, Item::new(500, 3))]).await;
        let mut b = player(&ctx, &store, 2, &full).await;
        negotiating(&ctx, &mut a, &mut b).await;
        let before = (
            a.session.character().await.inventory.clone(),
            b.session.character().await.inventory.clone(),
        );

        add_item(&ctx, &a.session, 0, 3).await.unwrap();
        confirm(&ctx, &a.session).await.unwrap();
        confirm(&ctx, &b.session).await.unwrap();

        assert_eq!(a.session.character().await.inventory, before.0);
        assert_eq!(b.session.character().await.inventory, before.1);
        assert!(b.drain().contains(&protocol::outbound::TRADE_CANCEL));
        assert!(!a.session.is_trading());
        assert!(store.executed().is_empty());
    }

    #[tokio::test]
    async fn adding_an_item_resets_confirmations() {
        let (ctx, store) = context();
        let mut a = player(&ctx, &store, 1, &[(0, Item::new(500, 3))]).await;
        let mut b = player(&ctx, &store, 2, &[]).await;
        let trade = negotiating(&ctx, &mut a, &mut b).await;

        confirm(&ctx, &b.session).await.unwrap();
        add_item(&ctx, &a.session, 0, 1).await.unwrap();

        let state = trade.state().await;
        assert!(!state.confirmed(REQUESTER) && !state.confirmed(TARGET));
        assert_eq!(state.staged(REQUESTER).len(), 1);
    }

    #[tokio::test]
    async fn repeated_staging_counts_against_owned_amount() {
        let (ctx, store) = context();
        let mut a = player(&ctx, &store, 1, &[(0, Item::new(500, 3))]).await;
        let mut b = player(&ctx, &store, 2, &[]).await;
        negotiating(&ctx, &mut a, &mut b).await;

        add_item(&ctx, &a.session, 0, 2).await.unwrap();
        let err = add_item(&ctx, &a.session, 0, 2).await.unwrap_err();
        assert!(matches!(err, HandlerError::Security(_)));
    }

    #[tokio::test]
    async fn idle_trades_are_swept() {
        let (ctx, store) = context();
        let mut a = player(&ctx, &store, 1, &[]).await;
        let mut b = player(&ctx, &store, 2, &[]).await;
        negotiating(&ctx, &mut a, &mut b).await;

        assert_eq!(sweep_idle(&ctx, Duration::from_secs(3600)).await, 0);
        assert_eq!(sweep_idle(&ctx, Duration::ZERO).await, 1);
        assert!(!a.session.is_trading() && !b.session.is_trading());
        assert_eq!(a.drain(), vec![protocol::outbound::TRADE_CANCEL]);
        assert_eq!(b.drain(), vec![protocol::outbound::TRADE_CANCEL]);
    }
}
