//! A room: seats, dealer rotation, and the hand loop, grounded in
//! `game_room.py`'s `GameRoom` and the teacher's `table::actor::TableActor`
//! / `table::TableHandle` mailbox pattern (those two files are gone, but the
//! shape — an owned loop driven by an mpsc mailbox, talked to through a
//! cloneable `Handle` — is unchanged).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::db::repository::{HandRecord, PlayerSettlement, ProfileRepository};
use crate::error::{GameError, SeatError};
use crate::event_bus::{EventBus, GameSubscriber};
use crate::hand_engine::HandEngine;
use crate::messages::{OutboundEvent, PlayerDto, RankingEntryDto, RoomSubEvent};
use crate::player::PlayerEndpoint;
use crate::queue::Channel;
use crate::seat_table::SeatTable;

/// Seats per room (spec §3).
pub const TABLE_CAPACITY: usize = 9;
/// Delay between hands so disconnect/ready sweeps have a window to settle
/// (spec §4.7 "liveness ping sweep ... readiness sweep").
const BETWEEN_HANDS_PAUSE: Duration = Duration::from_millis(500);
/// Rows sent in an `UpdateRankingData` broadcast (spec §6).
const RANKING_LIMIT: i64 = 10;

/// A room's rule set for the hand it's about to deal (spec §9 "polymorphism
/// of game mode"): currently just blind sizes, but the seam a future
/// non-holdem variant plugs into. Grounded in `game_room_factory.py`'s
/// `GameRoomFactory` and `holdem_poker_game_factory.py`'s
/// `HoldemPokerGameFactory.create_game`.
pub trait GameFactory: Send + Sync {
    fn small_blind(&self) -> u64;
    fn big_blind(&self) -> u64;
}

/// The only mode this crate deals today: fixed-limit Texas Hold'em blinds.
pub struct HoldemGameFactory {
    pub small_blind: u64,
    pub big_blind: u64,
}

impl GameFactory for HoldemGameFactory {
    fn small_blind(&self) -> u64 {
        self.small_blind
    }

    fn big_blind(&self) -> u64 {
        self.big_blind
    }
}

/// Turns raised events into channel sends, broadcasting unless
/// [`OutboundEvent::target`] names one recipient, and keeps a replay log
/// that clears whenever a hand ends (spec §4.7).
pub struct RoomSubscriber {
    channels: Arc<Mutex<HashMap<String, Channel>>>,
    log: Arc<Mutex<Vec<OutboundEvent>>>,
}

impl RoomSubscriber {
    fn new(channels: Arc<Mutex<HashMap<String, Channel>>>) -> Self {
        Self {
            channels,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn tail(&self) -> Vec<OutboundEvent> {
        self.log.lock().await.clone()
    }
}

#[async_trait]
impl GameSubscriber for RoomSubscriber {
    async fn on_event(&self, event: &OutboundEvent) {
        {
            let mut log = self.log.lock().await;
            if event.is_game_over() {
                log.clear();
            } else {
                log.push(event.clone());
            }
        }

        let channels = self.channels.lock().await;
        match event.target() {
            Some(target) => {
                if let Some(channel) = channels.get(target) {
                    let _ = channel.send(event).await;
                }
            }
            None => {
                for channel in channels.values() {
                    let _ = channel.send(event).await;
                }
            }
        }
    }
}

/// Public or invite-only (spec §4.7, §4.8): a private room is never offered
/// to the lobby's public matchmaking pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomMode {
    Public,
    Private,
}

pub struct Room {
    pub id: String,
    mode: RoomMode,
    seats: SeatTable,
    channels: Arc<Mutex<HashMap<String, Channel>>>,
    events: EventBus,
    subscriber: Arc<RoomSubscriber>,
    dealer_id: Option<String>,
    factory: Box<dyn GameFactory>,
    repository: Arc<dyn ProfileRepository>,
    /// Cleared by `RoomHandle::spawn` the moment the hand loop gives up on a
    /// `GameError`; a deactivated room's handle still accepts messages, but
    /// nothing drains them once the owning task has returned.
    active: bool,
    /// Guards mode switching: a switch mid-hand would change blinds out from
    /// under a street already in progress (spec §4.7 "owner & mode
    /// switching").
    hand_in_progress: bool,
}

impl Room {
    pub fn new(
        id: impl Into<String>,
        mode: RoomMode,
        small_blind: u64,
        big_blind: u64,
        repository: Arc<dyn ProfileRepository>,
    ) -> Self {
        let channels = Arc::new(Mutex::new(HashMap::new()));
        let subscriber = Arc::new(RoomSubscriber::new(channels.clone()));
        let mut events = EventBus::new();
        events.subscribe(subscriber.clone());

        Self {
            id: id.into(),
            mode,
            seats: SeatTable::new(TABLE_CAPACITY),
            channels,
            events,
            subscriber,
            dealer_id: None,
            factory: Box::new(HoldemGameFactory { small_blind, big_blind }),
            repository,
            active: true,
            hand_in_progress: false,
        }
    }

    pub fn mode(&self) -> RoomMode {
        self.mode
    }

    pub fn owner_id(&self) -> Option<&str> {
        self.seats.owner_id()
    }

    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn hand_in_progress(&self) -> bool {
        self.hand_in_progress
    }

    /// Swaps the room's `GameFactory` between hands. Refused mid-hand, and
    /// only the room's current owner may request it (spec §4.7).
    pub fn request_mode_switch(
        &mut self,
        requester_id: &str,
        factory: Box<dyn GameFactory>,
    ) -> Result<(), GameError> {
        if self.seats.owner_id() != Some(requester_id) {
            return Err(GameError::NotOwner);
        }
        if self.hand_in_progress {
            return Err(GameError::ModeSwitchRefused);
        }
        self.factory = factory;
        Ok(())
    }

    /// Seats a new endpoint, or — if `endpoint`'s id is already seated (a
    /// reconnect under a fresh `session_id`) — rebinds its channel in place
    /// instead of erroring out (spec §4.3, S6): identity, chips, seat index,
    /// and `loan_count` all survive untouched.
    pub async fn add_player(&mut self, endpoint: PlayerEndpoint) -> Result<(), SeatError> {
        let id = endpoint.id().to_string();
        if self.seats.get(&id).is_some() {
            return self.rejoin_player(&id, endpoint.channel_for_mirror()).await;
        }

        let channel = endpoint.channel_for_mirror();
        let was_owner = self.seats.owner_id().map(str::to_string);
        self.seats.add(endpoint)?;
        self.channels.lock().await.insert(id.clone(), channel.clone());
        self.replay_tail_to(&id, &channel).await;
        self.announce(RoomSubEvent::PlayerAdded).await;
        if self.seats.owner_id().map(str::to_string) != was_owner {
            self.announce(RoomSubEvent::RoomOwnerAssigned).await;
        }
        Ok(())
    }

    pub async fn remove_player(&mut self, id: &str) -> Result<(), SeatError> {
        self.seats.remove(id)?;
        self.channels.lock().await.remove(id);
        self.announce(RoomSubEvent::PlayerRemoved).await;
        Ok(())
    }

    pub async fn rejoin_player(&mut self, id: &str, new_channel: Channel) -> Result<(), SeatError> {
        self.channels.lock().await.insert(id.to_string(), new_channel.clone());
        self.seats.rejoin(id, new_channel.clone())?;
        self.replay_tail_to(id, &new_channel).await;
        self.announce(RoomSubEvent::PlayerRejoined).await;
        Ok(())
    }

    /// Replays the in-flight hand's event log to one late-joining or
    /// rejoining id (spec §4.7), so it sees the cards/pots/actions it missed
    /// instead of catching the game mid-stream with no context. Events
    /// targeted at someone else are skipped.
    async fn replay_tail_to(&self, id: &str, channel: &Channel) {
        for event in self.subscriber.tail().await {
            if let Some(target) = event.target() {
                if target != id {
                    continue;
                }
            }
            let _ = channel.send(&event).await;
        }
    }

    async fn announce(&self, sub_event: RoomSubEvent) {
        let players: Vec<PlayerDto> = self
            .seats
            .endpoints()
            .map(|e| PlayerDto::new(e.id(), &e.player.display_name, e.player.chips))
            .collect();
        let player_ids = self
            .seats
            .seated_ids()
            .into_iter()
            .map(Some)
            .collect::<Vec<_>>();
        self.events
            .raise(OutboundEvent::RoomUpdate {
                sub_event,
                room_id: self.id.clone(),
                players,
                player_ids,
                player_id: self.seats.owner_id().map(str::to_string),
            })
            .await;
    }

    /// Pings every seat, marks the unresponsive dead, refreshes readiness,
    /// and — if at least two seats are ready — rotates the dealer and plays
    /// one hand. Returns `Ok(false)` when fewer than two seats are ready
    /// (the caller should pause and retry).
    pub async fn run_one_hand(&mut self) -> Result<bool, GameError> {
        self.sweep_liveness().await;
        self.sweep_readiness().await;

        let ready_count = self.seats.endpoints().filter(|e| e.player.ready).count();
        if ready_count < 2 {
            return Ok(false);
        }

        self.rotate_dealer();
        let Some(dealer_id) = self.dealer_id.clone() else {
            return Ok(false);
        };

        let round = self.seats.round(&dealer_id);
        let pre_loan_counts: HashMap<String, u32> = round
            .iter()
            .map(|id| (id.clone(), self.seats.get(id).map(|e| e.player.loan_count).unwrap_or(0)))
            .collect();

        log::debug!("room {}: starting a hand, dealer={dealer_id}", self.id);
        self.hand_in_progress = true;
        let small_blind = self.factory.small_blind();
        let big_blind = self.factory.big_blind();
        let mut engine = HandEngine::new(&mut self.seats, &self.events, dealer_id, small_blind, big_blind);
        let summary = engine.play().await;
        self.hand_in_progress = false;
        let summary = summary?;
        log::info!("room {}: hand {} settled, {} pot(s)", self.id, summary.game_id, summary.pots.len());

        for endpoint in self.seats.endpoints_mut() {
            endpoint.player.apply_loan_refund();
        }

        // Every seated participant gets a settlement row, winners and
        // losers alike — a loser's debited stack and a refunded loan both
        // need to reach the persisted profile, not just a winner's payout.
        let settlements: Vec<PlayerSettlement> = summary
            .starting_chips
            .iter()
            .map(|(id, starting)| {
                let (final_chips, final_loans) = self
                    .seats
                    .get(id)
                    .map(|e| (e.player.chips, e.player.loan_count))
                    .unwrap_or((*starting, pre_loan_counts.get(id).copied().unwrap_or(0)));
                let pre_loans = pre_loan_counts.get(id).copied().unwrap_or(0);
                PlayerSettlement {
                    player_id: id.clone(),
                    chip_delta: final_chips as i64 - *starting as i64,
                    loan_delta: final_loans as i64 - pre_loans as i64,
                    hands_delta: 1,
                }
            })
            .collect();

        self.evict_timed_out_seats().await;

        let persisted = self
            .repository
            .persist_hand(&HandRecord {
                game_id: summary.game_id,
                room_id: self.id.clone(),
                settlements,
            })
            .await;

        if persisted.is_ok() {
            if let Ok(ranking) = self.repository.fetch_ranking(RANKING_LIMIT).await {
                let ranking = ranking
                    .into_iter()
                    .map(|r| RankingEntryDto {
                        name: r.display_name,
                        chips: r.chips,
                        hands_played: r.hands_played,
                    })
                    .collect();
                self.events.raise(OutboundEvent::UpdateRankingData { ranking }).await;
            }
        }

        tokio::time::sleep(BETWEEN_HANDS_PAUSE).await;
        Ok(true)
    }

    /// Evicts every seat `HandEngine::play` flagged as having timed out
    /// mid-hand (spec §4.6, S5). Their settled stack is already committed to
    /// `Player.chips` by the time this runs, so eviction loses no chips.
    async fn evict_timed_out_seats(&mut self) {
        let timed_out: Vec<String> = self
            .seats
            .endpoints_mut()
            .filter(|e| e.take_timed_out())
            .map(|e| e.id().to_string())
            .collect();
        for id in &timed_out {
            let _ = self.seats.remove(id);
            self.channels.lock().await.remove(id);
        }
        if !timed_out.is_empty() {
            self.announce(RoomSubEvent::PlayerRemoved).await;
        }
    }

    async fn sweep_liveness(&mut self) {
        for endpoint in self.seats.endpoints_mut() {
            if endpoint.is_connected() {
                endpoint.ping().await;
            }
        }
    }

    async fn sweep_readiness(&mut self) {
        for endpoint in self.seats.endpoints_mut() {
            if endpoint.is_connected() {
                endpoint.refresh_ready().await;
            }
        }
    }

    /// Advances the dealer button to the next occupied seat after the
    /// current dealer, or the first seated player if there is no dealer
    /// yet (spec §4.6 "the button then rotates to the next occupied seat").
    fn rotate_dealer(&mut self) {
        let seated = self.seats.seated_ids();
        if seated.is_empty() {
            self.dealer_id = None;
            return;
        }
        self.dealer_id = match &self.dealer_id {
            Some(current) if seated.contains(current) => {
                let pos = seated.iter().position(|id| id == current).unwrap();
                Some(seated[(pos + 1) % seated.len()].clone())
            }
            _ => Some(seated[0].clone()),
        };
    }

    pub async fn event_log(&self) -> Vec<OutboundEvent> {
        self.subscriber.tail().await
    }
}

/// Control messages a `RoomHandle` sends to the room's owning task.
pub enum RoomMessage {
    AddPlayer(PlayerEndpoint),
    RemovePlayer(String),
    SwitchMode {
        requester_id: String,
        factory: Box<dyn GameFactory>,
        reply: tokio::sync::oneshot::Sender<Result<(), GameError>>,
    },
    Shutdown,
}

/// A cloneable front for a `Room` running in its own task, mirroring the
/// teacher's `TableHandle` (`table::TableHandle`, now removed but the
/// pattern is preserved here).
#[derive(Clone)]
pub struct RoomHandle {
    sender: mpsc::Sender<RoomMessage>,
}

impl RoomHandle {
    /// Spawns `room`'s hand loop on its own task and returns a handle to it.
    /// The loop calls `run_one_hand` repeatedly, draining `mailbox` for
    /// control messages between hands.
    pub fn spawn(mut room: Room) -> Self {
        let (sender, mut mailbox) = mpsc::channel(32);
        tokio::spawn(async move {
            loop {
                while let Ok(message) = mailbox.try_recv() {
                    match message {
                        RoomMessage::AddPlayer(endpoint) => {
                            let _ = room.add_player(endpoint).await;
                        }
                        RoomMessage::RemovePlayer(id) => {
                            let _ = room.remove_player(&id).await;
                        }
                        RoomMessage::SwitchMode { requester_id, factory, reply } => {
                            let result = room.request_mode_switch(&requester_id, factory);
                            let _ = reply.send(result);
                        }
                        RoomMessage::Shutdown => return,
                    }
                }
                if room.is_empty() {
                    match mailbox.recv().await {
                        Some(RoomMessage::AddPlayer(endpoint)) => {
                            let _ = room.add_player(endpoint).await;
                        }
                        Some(RoomMessage::Shutdown) | None => return,
                        Some(_) => {}
                    }
                    continue;
                }
                match room.run_one_hand().await {
                    Ok(false) => tokio::time::sleep(BETWEEN_HANDS_PAUSE).await,
                    Ok(true) => {}
                    Err(error) => {
                        log::warn!("room {}: hand loop terminating: {error}", room.id);
                        room.active = false;
                        break;
                    }
                }
            }
        });
        Self { sender }
    }

    pub async fn add_player(&self, endpoint: PlayerEndpoint) {
        let _ = self.sender.send(RoomMessage::AddPlayer(endpoint)).await;
    }

    pub async fn remove_player(&self, id: impl Into<String>) {
        let _ = self.sender.send(RoomMessage::RemovePlayer(id.into())).await;
    }

    /// Requests a between-hands mode switch (spec §4.7). Resolves once the
    /// room's owning task has applied or refused it; `RoomUnavailable` if the
    /// room's task has already exited.
    pub async fn request_mode_switch(
        &self,
        requester_id: impl Into<String>,
        factory: Box<dyn GameFactory>,
    ) -> Result<(), GameError> {
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RoomMessage::SwitchMode {
                requester_id: requester_id.into(),
                factory,
                reply,
            })
            .await
            .map_err(|_| GameError::RoomUnavailable)?;
        rx.await.map_err(|_| GameError::RoomUnavailable)?
    }

    pub async fn shutdown(&self) {
        let _ = self.sender.send(RoomMessage::Shutdown).await;
    }
}
