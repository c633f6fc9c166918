//! Error kinds shared across the engine and its session fabric.

use thiserror::Error;

/// Failures from the message-queue broker itself (transport fault), as
/// opposed to a malformed or late message.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("queue '{0}' does not exist")]
    NoSuchQueue(String),
    #[error("broker transport failure: {0}")]
    Transport(String),
}

/// Failures surfaced by a `Channel`'s `send`/`recv`.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("deadline reached while waiting for a message")]
    Timeout,
    #[error("message was not valid JSON or did not match the expected schema: {0}")]
    FormatError(String),
    #[error(transparent)]
    Broker(#[from] BrokerError),
    /// The peer sent an explicit `{type: disconnect}` envelope. Engine code
    /// treats this uniformly with any other peer loss.
    #[error("peer disconnected")]
    Disconnected,
}

/// Seat-table admission failures.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum SeatError {
    #[error("room is full")]
    RoomFull,
    #[error("player '{0}' already seated")]
    Duplicate(String),
    #[error("player '{0}' is not seated")]
    UnknownPlayer(String),
}

/// Engine-level precondition violations. A `GameError` ends the current hand
/// and then the room's hand loop.
#[derive(Debug, Error)]
pub enum GameError {
    #[error("at least two players needed to start a new hand")]
    NotEnoughPlayers,
    #[error("side-pot construction did not consume the full ledger (spare={0})")]
    InvalidBets(i64),
    #[error("no players left to award a pot to")]
    NoPlayersLeft,
    #[error(transparent)]
    Seat(#[from] SeatError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("profile repository error: {0}")]
    Repository(String),
    #[error("a mode switch is refused while a hand is in progress")]
    ModeSwitchRefused,
    #[error("only the room's owner may request a mode switch")]
    NotOwner,
    #[error("room is no longer running")]
    RoomUnavailable,
}
