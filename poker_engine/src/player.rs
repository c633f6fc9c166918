//! `Player` and `PlayerEndpoint` (spec §3, §4.2).

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;

use crate::error::ChannelError;
use crate::queue::Channel;

/// Reply window for `ping` (spec §4.2, §5).
pub const PING_TIMEOUT: Duration = Duration::from_secs(2);
/// Reply window for `refresh_ready` (spec §4.2, §5).
pub const READY_TIMEOUT: Duration = Duration::from_secs(2);

const MAX_DISPLAY_NAME_LEN: usize = 32;

/// A sanitized display name: whitespace runs collapse to `_` and length is
/// capped, both on construction and on deserialization, so a malformed
/// client payload can never carry an unprintable or oversized name. Grounded
/// in the teacher's `Username` newtype (`private_poker::game::entities`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DisplayName(String);

impl DisplayName {
    pub fn new(raw: impl AsRef<str>) -> Self {
        let sanitized: String = raw
            .as_ref()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_");
        let truncated = sanitized.chars().take(MAX_DISPLAY_NAME_LEN).collect();
        Self(truncated)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for DisplayName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(DisplayName::new(raw))
    }
}

/// A seated player's identity and chip state (spec §3). Invariants: `chips`
/// never negative; `take(0)` is a legal no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub display_name: DisplayName,
    pub chips: u64,
    pub loan_count: u32,
    pub ready: bool,
}

impl Player {
    pub fn new(id: impl Into<String>, display_name: DisplayName, chips: u64) -> Self {
        Self {
            id: id.into(),
            display_name,
            chips,
            loan_count: 0,
            ready: false,
        }
    }

    /// Deducts `n` chips. Requires `n <= chips`; `take(0)` always succeeds.
    pub fn take(&mut self, n: u64) -> Result<(), InsufficientChips> {
        if n > self.chips {
            return Err(InsufficientChips {
                requested: n,
                available: self.chips,
            });
        }
        self.chips -= n;
        Ok(())
    }

    pub fn add_chips(&mut self, n: u64) {
        self.chips += n;
    }

    /// Repays loans out of a hand's winnings: every full [`LOAN_AMOUNT`] held
    /// above one loan's worth of chips clears one outstanding loan, until
    /// either the excess or the loan count runs out.
    pub fn apply_loan_refund(&mut self) {
        if self.loan_count == 0 || self.chips <= LOAN_AMOUNT {
            return;
        }
        let refundable = (self.chips - LOAN_AMOUNT) / LOAN_AMOUNT;
        let refunds = refundable.min(self.loan_count as u64) as u32;
        self.chips -= refunds as u64 * LOAN_AMOUNT;
        self.loan_count -= refunds;
    }
}

/// Fixed loan size granted when a seat can't cover its blind (spec §4.6).
pub const LOAN_AMOUNT: u64 = 1000;

#[derive(Debug, thiserror::Error)]
#[error("requested {requested} chips but only {available} available")]
pub struct InsufficientChips {
    pub requested: u64,
    pub available: u64,
}

/// Engine-side handle to a seated player: identity, chip state, and the
/// `Channel` it communicates through (spec §3, §4.2).
pub struct PlayerEndpoint {
    pub player: Player,
    channel: Channel,
    connected: bool,
    timed_out: bool,
}

impl PlayerEndpoint {
    pub fn new(player: Player, channel: Channel) -> Self {
        Self {
            player,
            channel,
            connected: true,
            timed_out: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.player.id
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// A clone of the endpoint's channel, for callers that mirror channels
    /// outside the `SeatTable` (e.g. `Room`'s event-fanout subscriber).
    pub fn channel_for_mirror(&self) -> Channel {
        self.channel.clone()
    }

    /// Rebinds the queues on reconnection. Identity and chips are preserved;
    /// the old channel is simply dropped (its queues self-collect via TTL).
    pub fn update_channel(&mut self, new_channel: Channel) {
        self.channel = new_channel;
        self.connected = true;
    }

    pub async fn send(&self, msg: &impl Serialize) -> Result<(), ChannelError> {
        self.channel.send(msg).await.map_err(ChannelError::from)
    }

    /// Sends `msg`, swallowing any broker error (spec §4.2 `try_send`).
    pub async fn try_send(&self, msg: &impl Serialize) -> bool {
        self.send(msg).await.is_ok()
    }

    pub async fn recv(&self, deadline: Instant) -> Result<serde_json::Value, ChannelError> {
        self.channel.recv(deadline).await
    }

    /// Sends `{type: ping}` and expects `{type: pong}` within `PING_TIMEOUT`.
    /// On failure marks the endpoint disconnected.
    pub async fn ping(&mut self) -> bool {
        if self.send(&json!({"type": "ping"})).await.is_err() {
            self.connected = false;
            return false;
        }
        let deadline = Instant::now() + PING_TIMEOUT;
        match self.recv(deadline).await {
            Ok(value) if value.get("type").and_then(|v| v.as_str()) == Some("pong") => true,
            _ => {
                self.connected = false;
                false
            }
        }
    }

    /// Sends `{type: ping-state}` and updates `ready` from the client's
    /// `{type: ready-state-change, ready}` reply.
    pub async fn refresh_ready(&mut self) -> bool {
        if self.send(&json!({"type": "ping-state"})).await.is_err() {
            return false;
        }
        let deadline = Instant::now() + READY_TIMEOUT;
        match self.recv(deadline).await {
            Ok(value) if value.get("type").and_then(|v| v.as_str()) == Some("ready-state-change") => {
                if let Some(ready) = value.get("ready").and_then(|v| v.as_bool()) {
                    self.player.ready = ready;
                    return true;
                }
                false
            }
            _ => false,
        }
    }

    pub fn disconnect(&mut self) {
        self.connected = false;
    }

    /// Marks a seat dead after it missed its action window mid-hand (spec
    /// §4.6, S5): disconnected, and flagged for the room to evict once the
    /// hand's chip settlement has run.
    pub fn mark_timed_out(&mut self) {
        self.connected = false;
        self.timed_out = true;
    }

    /// Consumes the timeout flag, returning whether it was set. The room
    /// calls this once per hand to decide which seats to evict.
    pub fn take_timed_out(&mut self) -> bool {
        std::mem::replace(&mut self.timed_out, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use std::sync::Arc;

    fn paired_channels() -> (Channel, Channel) {
        let broker: Arc<dyn crate::broker::Broker> = Arc::new(InMemoryBroker::default());
        let server = Channel::named(broker, "p1", "s1");
        let client = Channel::new(server.outbound.clone(), server.inbound.clone());
        (server, client)
    }

    #[test]
    fn display_name_collapses_whitespace_and_truncates() {
        let name = DisplayName::new("  hello   world  ");
        assert_eq!(name.as_str(), "hello_world");

        let long = "x".repeat(100);
        let name = DisplayName::new(&long);
        assert_eq!(name.as_str().len(), MAX_DISPLAY_NAME_LEN);
    }

    #[test]
    fn take_zero_is_always_legal() {
        let mut player = Player::new("p1", DisplayName::new("a"), 0);
        assert!(player.take(0).is_ok());
    }

    #[test]
    fn take_more_than_available_fails() {
        let mut player = Player::new("p1", DisplayName::new("a"), 10);
        assert!(player.take(11).is_err());
        assert_eq!(player.chips, 10);
    }

    /// Scenario S4: two loans of 1000 worth of winnings refund, leaving one
    /// loan outstanding.
    #[test]
    fn loan_refund_clears_one_loan_per_full_thousand_above_the_first() {
        let mut player = Player::new("a", DisplayName::new("a"), 3200);
        player.loan_count = 3;
        player.apply_loan_refund();
        assert_eq!(player.chips, 1200);
        assert_eq!(player.loan_count, 1);
    }

    #[test]
    fn loan_refund_is_capped_by_outstanding_loan_count() {
        let mut player = Player::new("a", DisplayName::new("a"), 10_000);
        player.loan_count = 1;
        player.apply_loan_refund();
        assert_eq!(player.chips, 9_000);
        assert_eq!(player.loan_count, 0);
    }

    #[test]
    fn loan_refund_is_a_no_op_below_the_threshold() {
        let mut player = Player::new("a", DisplayName::new("a"), 1000);
        player.loan_count = 1;
        player.apply_loan_refund();
        assert_eq!(player.chips, 1000);
        assert_eq!(player.loan_count, 1);
    }

    #[tokio::test]
    async fn ping_succeeds_when_client_replies_pong() {
        let (server, client) = paired_channels();
        let mut endpoint = PlayerEndpoint::new(Player::new("p1", DisplayName::new("a"), 100), server);

        let responder = tokio::spawn(async move {
            let deadline = Instant::now() + Duration::from_millis(500);
            let _ = client.recv(deadline).await.unwrap();
            client.send(&json!({"type": "pong"})).await.unwrap();
        });
        assert!(endpoint.ping().await);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn ping_marks_disconnected_on_timeout() {
        let (server, _client) = paired_channels();
        let mut endpoint = PlayerEndpoint::new(Player::new("p1", DisplayName::new("a"), 100), server);
        assert!(!endpoint.ping().await);
        assert!(!endpoint.is_connected());
    }
}
