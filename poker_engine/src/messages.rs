//! Wire message types (spec §6): JSON objects tagged by `message_type`
//! (inbound) or `event` (outbound), mirroring the teacher's
//! `net::messages::UserCommand` tagged-enum convention.

use serde::{Deserialize, Serialize};

use crate::card::Card;
use crate::player::DisplayName;
use crate::score::Score;

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectPlayer {
    pub id: String,
    pub name: String,
}

/// Messages a client may send (spec §6).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "message_type", rename_all = "kebab-case")]
pub enum InboundMessage {
    Connect {
        timeout_epoch: i64,
        session_id: String,
        player: ConnectPlayer,
        room_id: Option<String>,
    },
    /// `bet`: -1 fold, 0 check, >0 call/raise amount.
    Bet {
        bet: i64,
    },
    Pong,
    #[serde(rename = "ready-state-change")]
    ReadyStateChange {
        ready: bool,
    },
    Disconnect,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum BetType {
    Check,
    Call,
    Raise,
    AllIn,
    Blind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoomSubEvent {
    PlayerAdded,
    PlayerRejoined,
    PlayerRemoved,
    RoomOwnerAssigned,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayerDto {
    pub id: String,
    pub display_name: String,
    pub chips: u64,
}

impl PlayerDto {
    pub fn new(id: impl Into<String>, display_name: &DisplayName, chips: u64) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.to_string(),
            chips,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreDto {
    pub category: u8,
    pub cards: Vec<Card>,
}

impl From<&Score> for ScoreDto {
    fn from(score: &Score) -> Self {
        Self {
            category: score.category as u8,
            cards: score.cards.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PotDto {
    pub amount: u64,
    pub eligible: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankingEntryDto {
    pub name: String,
    pub chips: u64,
    pub hands_played: u64,
}

/// Events the engine broadcasts (spec §6), tagged by `event`. `target`
/// designates a single-recipient event (the room re-dispatches to only that
/// endpoint instead of broadcasting); `None` means broadcast to every seat.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum OutboundEvent {
    Connect {
        server_id: String,
        player: PlayerDto,
    },
    RoomUpdate {
        sub_event: RoomSubEvent,
        room_id: String,
        players: Vec<PlayerDto>,
        player_ids: Vec<Option<String>>,
        player_id: Option<String>,
    },
    NewGame {
        game_id: String,
    },
    CardsAssignment {
        target: String,
        game_id: String,
        cards: Vec<Card>,
        score: ScoreDto,
    },
    Bet {
        game_id: String,
        player: String,
        amount: u64,
        bet_type: BetType,
    },
    PlayerAction {
        target: String,
        game_id: String,
        min_bet: u64,
        max_bet: u64,
        timeout: u64,
        timeout_date: i64,
    },
    Fold {
        game_id: String,
        player: String,
    },
    DeadPlayer {
        game_id: String,
        player: String,
    },
    PotsUpdate {
        game_id: String,
        pots: Vec<PotDto>,
    },
    SharedCards {
        game_id: String,
        cards: Vec<Card>,
    },
    Showdown {
        game_id: String,
        hands: Vec<(String, Vec<Card>, ScoreDto)>,
    },
    WinnerDesignation {
        game_id: String,
        pot: PotDto,
        winners: Vec<String>,
        share: u64,
        upcoming_pots: Vec<PotDto>,
    },
    GameOver {
        game_id: String,
        reason: String,
    },
    UpdateRankingData {
        ranking: Vec<RankingEntryDto>,
    },
    Error {
        target: String,
        error: String,
    },
}

impl OutboundEvent {
    /// Single-recipient id, if this event is targeted rather than broadcast.
    pub fn target(&self) -> Option<&str> {
        match self {
            OutboundEvent::CardsAssignment { target, .. }
            | OutboundEvent::PlayerAction { target, .. }
            | OutboundEvent::Error { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Whether the room's event-log tail should clear after this event
    /// (spec §4.7: "the log is cleared on game-over").
    pub fn is_game_over(&self) -> bool {
        matches!(self, OutboundEvent::GameOver { .. })
    }
}
