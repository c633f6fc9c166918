//! Connection intake and room matchmaking (spec §4.8), grounded in
//! `original_source/poker/game_server.py`'s `GameServer._join_room`:
//! a room id routes to that private room (created on first reference); no
//! id joins the first public room with an open seat, or a fresh one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::broker::Broker;
use crate::db::repository::ProfileRepository;
use crate::error::{GameError, SeatError};
use crate::messages::PlayerDto;
use crate::player::{DisplayName, Player, PlayerEndpoint};
use crate::queue::Channel;
use crate::room::{Room, RoomHandle, RoomMode, TABLE_CAPACITY};

struct RoomEntry {
    handle: RoomHandle,
    mode: RoomMode,
    seats: Arc<AtomicUsize>,
}

/// Lobby-wide settings every room is created with (spec §3 "a room's blinds
/// are fixed at creation").
pub struct LobbyConfig {
    pub small_blind: u64,
    pub big_blind: u64,
    pub starting_chips: u64,
}

/// What `Lobby::connect` hands back to the caller once a player is seated:
/// the room it landed in, and the DTO the WebSocket edge acks the connect
/// with (spec §6 `{type: connect, server_id, player}`).
pub struct ConnectOutcome {
    pub room_id: String,
    pub player: PlayerDto,
}

pub struct Lobby {
    rooms: tokio::sync::Mutex<HashMap<String, RoomEntry>>,
    broker: Arc<dyn Broker>,
    repository: Arc<dyn ProfileRepository>,
    config: LobbyConfig,
    server_id: String,
}

impl Lobby {
    pub fn new(broker: Arc<dyn Broker>, repository: Arc<dyn ProfileRepository>, config: LobbyConfig) -> Self {
        Self {
            rooms: tokio::sync::Mutex::new(HashMap::new()),
            broker,
            repository,
            config,
            server_id: Uuid::new_v4().to_string(),
        }
    }

    /// This process's identity in the `connect` ack (spec §6), stable for
    /// the lifetime of the lobby.
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Resolves `player_id`'s profile (creating one at the configured
    /// starting stack on first connection), binds its channel, and routes
    /// it into `room_id` if given, or the public matchmaking pool.
    pub async fn connect(
        &self,
        player_id: &str,
        display_name: &str,
        session_id: &str,
        room_id: Option<String>,
    ) -> Result<ConnectOutcome, GameError> {
        let profile = self
            .repository
            .ensure_profile(player_id, display_name, self.config.starting_chips)
            .await
            .map_err(|e| GameError::Repository(e.to_string()))?;

        let channel = Channel::named(self.broker.clone(), player_id, session_id);
        let display = DisplayName::new(&profile.display_name);
        let mut player = Player::new(player_id, display.clone(), profile.chips);
        player.loan_count = profile.loan_count as u32;
        let player_dto = PlayerDto::new(player_id, &display, profile.chips);
        let endpoint = PlayerEndpoint::new(player, channel);

        let joined_room_id = match room_id {
            Some(id) => self.join_private_room(id, endpoint).await?,
            None => self.join_public_room(endpoint).await?,
        };
        Ok(ConnectOutcome {
            room_id: joined_room_id,
            player: player_dto,
        })
    }

    async fn join_private_room(&self, room_id: String, endpoint: PlayerEndpoint) -> Result<String, GameError> {
        let mut rooms = self.rooms.lock().await;
        let entry = rooms.entry(room_id.clone()).or_insert_with(|| {
            Self::spawn_room(&room_id, RoomMode::Private, &self.config, self.repository.clone())
        });
        entry.seats.fetch_add(1, Ordering::SeqCst);
        entry.handle.add_player(endpoint).await;
        Ok(room_id)
    }

    async fn join_public_room(&self, endpoint: PlayerEndpoint) -> Result<String, GameError> {
        let mut rooms = self.rooms.lock().await;
        for (id, entry) in rooms.iter() {
            if entry.mode == RoomMode::Public && entry.seats.load(Ordering::SeqCst) < TABLE_CAPACITY {
                entry.seats.fetch_add(1, Ordering::SeqCst);
                entry.handle.add_player(endpoint).await;
                return Ok(id.clone());
            }
        }

        let room_id = Uuid::new_v4().to_string();
        log::info!("lobby: opening public room {room_id}");
        let entry = Self::spawn_room(&room_id, RoomMode::Public, &self.config, self.repository.clone());
        entry.seats.fetch_add(1, Ordering::SeqCst);
        entry.handle.add_player(endpoint).await;
        rooms.insert(room_id.clone(), entry);
        Ok(room_id)
    }

    pub async fn disconnect(&self, room_id: &str, player_id: &str) -> Result<(), SeatError> {
        let rooms = self.rooms.lock().await;
        if let Some(entry) = rooms.get(room_id) {
            entry.seats.fetch_sub(1, Ordering::SeqCst);
            entry.handle.remove_player(player_id).await;
        }
        Ok(())
    }

    fn spawn_room(
        room_id: &str,
        mode: RoomMode,
        config: &LobbyConfig,
        repository: Arc<dyn ProfileRepository>,
    ) -> RoomEntry {
        let room = Room::new(room_id, mode, config.small_blind, config.big_blind, repository);
        RoomEntry {
            handle: RoomHandle::spawn(room),
            mode,
            seats: Arc::new(AtomicUsize::new(0)),
        }
    }
}
