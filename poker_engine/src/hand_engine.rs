//! One hand from blinds through payout (spec §4.6), grounded in
//! `poker_game.py`'s `PokerGame` / `GameBetHandler` / `GameWinnersDetector`
//! and `texas_holdem/*`.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::bet_rounder::{BetRounder, BetsLedger};
use crate::card::{Card, Deck};
use crate::error::GameError;
use crate::event_bus::EventBus;
use crate::messages::{BetType, InboundMessage, OutboundEvent, PotDto, ScoreDto};
use crate::player::LOAN_AMOUNT;
use crate::pot_builder::{Pot, PotBuilder};
use crate::score::{self, Score};
use crate::seat_table::{ActivePlayerSet, SeatTable};

/// Window a seat gets to act before it is auto-folded (spec §4.6, §5).
pub const ACTION_TIMEOUT: Duration = Duration::from_secs(20);

/// Streets in play order. `blind_round` marks the one street where blinds
/// are posted before the first voluntary action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Street {
    PreFlop,
    Flop,
    Turn,
    River,
}

impl Street {
    fn community_count(self) -> usize {
        match self {
            Street::PreFlop => 0,
            Street::Flop => 3,
            Street::Turn => 1,
            Street::River => 1,
        }
    }
}

/// Settles a hand's chip movement: what each pot paid out, and who was
/// extended a loan to stay in the hand (spec §4.6 "a seat short of its
/// blind is loaned the difference rather than sitting out").
pub struct HandSummary {
    pub game_id: String,
    pub pots: Vec<Pot>,
    pub payouts: HashMap<String, u64>,
    pub loans: HashMap<String, u64>,
    /// Each seated participant's chip count at the moment the hand started,
    /// before blind loans are extended — the baseline `persist_hand` needs
    /// to compute a signed chip delta for losers, not just winners.
    pub starting_chips: HashMap<String, u64>,
}

pub struct HandEngine<'a> {
    seats: &'a mut SeatTable,
    events: &'a EventBus,
    dealer_id: String,
    small_blind: u64,
    big_blind: u64,
    action_timeout: Duration,
}

impl<'a> HandEngine<'a> {
    pub fn new(
        seats: &'a mut SeatTable,
        events: &'a EventBus,
        dealer_id: String,
        small_blind: u64,
        big_blind: u64,
    ) -> Self {
        Self {
            seats,
            events,
            dealer_id,
            small_blind,
            big_blind,
            action_timeout: ACTION_TIMEOUT,
        }
    }

    /// Overrides the per-action window, e.g. so a test can drive S5's
    /// silent-timeout eviction without sleeping the real 20 seconds.
    pub fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }

    /// Runs the whole hand: loans, deal, four streets of betting, showdown,
    /// payout. Disconnected seats are dealt in (so their chips still form
    /// pots) but are marked dead and auto-folded on their turn.
    pub async fn play(&mut self) -> Result<HandSummary, GameError> {
        let game_id = Uuid::new_v4().to_string();
        let round = self.seats.round(&self.dealer_id);
        if round.len() < 2 {
            return Err(GameError::NotEnoughPlayers);
        }

        let starting_chips: HashMap<String, u64> = round
            .iter()
            .map(|id| (id.clone(), self.seats.get(id).map(|e| e.player.chips).unwrap_or(0)))
            .collect();

        let dead: HashSet<String> = round
            .iter()
            .filter(|id| !self.seats.get(id).map(|e| e.is_connected()).unwrap_or(false))
            .cloned()
            .collect();

        let mut loans = HashMap::new();
        self.extend_blind_loans(&round, &mut loans);

        let mut deck = Deck::new();
        let mut hole_cards: HashMap<String, Vec<Card>> = HashMap::new();
        for id in &round {
            hole_cards.insert(id.clone(), deck.pop(2));
        }
        let mut community: Vec<Card> = Vec::new();

        let mut stacks: HashMap<String, u64> = round
            .iter()
            .map(|id| (id.clone(), self.seats.get(id).map(|e| e.player.chips).unwrap_or(0)))
            .collect();
        let mut hand_ledger = BetsLedger::default();
        let mut active = ActivePlayerSet::new(round.clone());
        for id in &dead {
            active.mark_dead(id);
        }

        self.events
            .raise(OutboundEvent::NewGame {
                game_id: game_id.clone(),
            })
            .await;
        for id in &round {
            self.events
                .raise(OutboundEvent::CardsAssignment {
                    target: id.clone(),
                    game_id: game_id.clone(),
                    cards: hole_cards[id].clone(),
                    score: ScoreDto::from(&score::evaluate(hole_cards[id].clone())),
                })
                .await;
        }

        for street in [Street::PreFlop, Street::Flop, Street::Turn, Street::River] {
            let blind_round = street == Street::PreFlop;
            community.extend(deck.pop(street.community_count()));
            if !community.is_empty() && !blind_round {
                self.events
                    .raise(OutboundEvent::SharedCards {
                        game_id: game_id.clone(),
                        cards: community.clone(),
                    })
                    .await;
            }

            if active.count_active() <= 1 {
                break;
            }

            self.run_betting_round(&game_id, &round, blind_round, &mut stacks, &mut hand_ledger, &mut active)
                .await?;

            let pots = PotBuilder::build(&hand_ledger, active.folded_ids())?;
            self.events
                .raise(OutboundEvent::PotsUpdate {
                    game_id: game_id.clone(),
                    pots: pots
                        .iter()
                        .map(|p| PotDto {
                            amount: p.amount,
                            eligible: p.eligible.clone(),
                        })
                        .collect(),
                })
                .await;
        }

        let pots = PotBuilder::build(&hand_ledger, active.folded_ids())?;
        let payouts = self
            .pay_out(&game_id, &pots, &round, &hole_cards, &community, active.folded_ids())
            .await;

        // Commit the hand's net effect: each seat ends at its post-betting
        // stack plus whatever it won back from the pots it was eligible for.
        for id in &round {
            if let Some(endpoint) = self.seats.get_mut(id) {
                let stack = stacks.get(id).copied().unwrap_or(0);
                let payout = payouts.get(id).copied().unwrap_or(0);
                endpoint.player.chips = stack + payout;
            }
        }

        self.events
            .raise(OutboundEvent::GameOver {
                game_id: game_id.clone(),
                reason: "hand complete".to_string(),
            })
            .await;

        Ok(HandSummary {
            game_id,
            pots,
            payouts,
            loans,
            starting_chips,
        })
    }

    /// A seat that can't cover the blind owed is granted a fixed
    /// `LOAN_AMOUNT`-chip loan before posting (spec §4.6, S3): it plays the
    /// hand, and `loan_count` tracks the debt for `apply_loan_refund` to
    /// reconcile out of future winnings.
    fn extend_blind_loans(&mut self, round: &[String], loans: &mut HashMap<String, u64>) {
        if round.is_empty() {
            return;
        }
        let n = round.len();
        let sb_id = &round[n - 1];
        let bb_id = &round[0];
        for (id, owed) in [(sb_id, self.small_blind), (bb_id, self.big_blind)] {
            if let Some(endpoint) = self.seats.get_mut(id) {
                if endpoint.player.chips < owed {
                    endpoint.player.add_chips(LOAN_AMOUNT);
                    endpoint.player.loan_count += 1;
                    loans.insert(id.clone(), LOAN_AMOUNT);
                }
            }
        }
    }

    async fn run_betting_round(
        &mut self,
        game_id: &str,
        round: &[String],
        blind_round: bool,
        stacks: &mut HashMap<String, u64>,
        hand_ledger: &mut BetsLedger,
        active: &mut ActivePlayerSet,
    ) -> Result<(), GameError> {
        let dead: HashSet<String> = round.iter().filter(|id| active.is_dead(id)).cloned().collect();
        let mut rounder = BetRounder::new(
            round.to_vec(),
            blind_round,
            self.small_blind,
            self.big_blind,
            stacks.clone(),
            dead.clone(),
        );
        for id in active.folded_ids() {
            if !dead.contains(id) {
                rounder.fold(id);
            }
        }

        while let Some(actor) = rounder.current_actor().map(str::to_string) {
            let min_bet = rounder.min_bet(&actor);
            let max_bet = rounder.max_bet(&actor);
            let timeout_date = (chrono_now_epoch_ms()) + self.action_timeout.as_millis() as i64;
            self.events
                .raise(OutboundEvent::PlayerAction {
                    target: actor.clone(),
                    game_id: game_id.to_string(),
                    min_bet,
                    max_bet,
                    timeout: self.action_timeout.as_secs(),
                    timeout_date,
                })
                .await;

            let decision = self.await_action(&actor, Instant::now() + self.action_timeout).await;
            match decision {
                Some(bet) if bet < 0 => {
                    rounder.fold(&actor);
                    active.fold(&actor);
                    self.events
                        .raise(OutboundEvent::Fold {
                            game_id: game_id.to_string(),
                            player: actor.clone(),
                        })
                        .await;
                }
                Some(bet) => {
                    let prior_bet = rounder.current_bet();
                    let total = rounder.ledger().committed(&actor) + bet.max(0) as u64;
                    let stack_before = rounder.stack(&actor);
                    if rounder.submit(&actor, total).is_err() {
                        // Illegal action: treat as a fold rather than stall the hand.
                        rounder.fold(&actor);
                        active.fold(&actor);
                    } else {
                        let went_all_in = rounder.stack(&actor) == 0 && stack_before > 0;
                        let bet_type = if went_all_in {
                            BetType::AllIn
                        } else if total > prior_bet {
                            BetType::Raise
                        } else if bet == 0 {
                            BetType::Check
                        } else {
                            BetType::Call
                        };
                        self.events
                            .raise(OutboundEvent::Bet {
                                game_id: game_id.to_string(),
                                player: actor.clone(),
                                amount: total,
                                bet_type,
                            })
                            .await;
                    }
                }
                None => {
                    // No reply within the window (spec §4.6, S5): the seat
                    // is marked dead for the room to evict after settlement,
                    // privately told why, and folded out of this hand.
                    if let Some(endpoint) = self.seats.get_mut(&actor) {
                        endpoint.mark_timed_out();
                    }
                    rounder.fold(&actor);
                    active.mark_dead(&actor);
                    self.events
                        .raise(OutboundEvent::Error {
                            target: actor.clone(),
                            error: "player-action timed out".to_string(),
                        })
                        .await;
                    self.events
                        .raise(OutboundEvent::DeadPlayer {
                            game_id: game_id.to_string(),
                            player: actor.clone(),
                        })
                        .await;
                }
            }
        }

        for id in round {
            let delta = rounder.ledger().committed(id);
            if delta > 0 {
                let cumulative = hand_ledger.committed(id) + delta;
                hand_ledger.set(id, cumulative);
            }
            stacks.insert(id.clone(), rounder.stack(id));
        }
        Ok(())
    }

    async fn await_action(&self, id: &str, deadline: Instant) -> Option<i64> {
        let endpoint = self.seats.get(id)?;
        if !endpoint.is_connected() {
            return None;
        }
        let value = endpoint.recv(deadline).await.ok()?;
        let message: InboundMessage = serde_json::from_value(value).ok()?;
        match message {
            InboundMessage::Bet { bet } => Some(bet),
            InboundMessage::Disconnect => None,
            _ => None,
        }
    }

    async fn pay_out(
        &mut self,
        game_id: &str,
        pots: &[Pot],
        round: &[String],
        hole_cards: &HashMap<String, Vec<Card>>,
        community: &[Card],
        folded: &HashSet<String>,
    ) -> HashMap<String, u64> {
        let mut payouts: HashMap<String, u64> = HashMap::new();
        let contenders: Vec<&String> = round.iter().filter(|id| !folded.contains(*id)).collect();

        if contenders.len() == 1 {
            let winner = contenders[0].clone();
            let total: u64 = pots.iter().map(|p| p.amount).sum();
            *payouts.entry(winner).or_insert(0) += total;
            return payouts;
        }

        let scores: HashMap<String, Score> = contenders
            .iter()
            .map(|id| {
                let mut cards = hole_cards.get(id.as_str()).cloned().unwrap_or_default();
                cards.extend_from_slice(community);
                ((*id).clone(), score::evaluate(cards))
            })
            .collect();

        self.events
            .raise(OutboundEvent::Showdown {
                game_id: game_id.to_string(),
                hands: contenders
                    .iter()
                    .map(|id| {
                        let score = &scores[id.as_str()];
                        ((*id).clone(), score.cards.clone(), ScoreDto::from(score))
                    })
                    .collect(),
            })
            .await;

        for (index, pot) in pots.iter().enumerate() {
            let mut best: Option<&Score> = None;
            let mut winners: Vec<String> = Vec::new();
            for id in &pot.eligible {
                let Some(score) = scores.get(id) else { continue };
                match best {
                    None => {
                        best = Some(score);
                        winners = vec![id.clone()];
                    }
                    Some(current) if score > current => {
                        best = Some(score);
                        winners = vec![id.clone()];
                    }
                    Some(current) if score == current => {
                        winners.push(id.clone());
                    }
                    _ => {}
                }
            }
            if winners.is_empty() {
                continue;
            }
            let share = pot.amount / winners.len() as u64;
            let remainder = pot.amount % winners.len() as u64;
            for (i, id) in winners.iter().enumerate() {
                let extra = if i == 0 { remainder } else { 0 };
                *payouts.entry(id.clone()).or_insert(0) += share + extra;
            }

            let upcoming: Vec<PotDto> = pots[index + 1..]
                .iter()
                .map(|p| PotDto {
                    amount: p.amount,
                    eligible: p.eligible.clone(),
                })
                .collect();
            self.events
                .raise(OutboundEvent::WinnerDesignation {
                    game_id: game_id.to_string(),
                    pot: PotDto {
                        amount: pot.amount,
                        eligible: pot.eligible.clone(),
                    },
                    winners,
                    share,
                    upcoming_pots: upcoming,
                })
                .await;
        }

        payouts
    }
}

/// Wall-clock epoch milliseconds for `timeout_date` payloads. Kept as a free
/// function so tests never depend on real time passing.
fn chrono_now_epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use crate::player::{DisplayName, Player, PlayerEndpoint};
    use crate::queue::Channel;
    use serde_json::json;
    use std::sync::Arc;

    fn seated_pair(chips_a: u64, chips_b: u64) -> (SeatTable, Channel, Channel) {
        let broker: Arc<dyn crate::broker::Broker> = Arc::new(InMemoryBroker::default());
        let mut table = SeatTable::new(4);

        let server_a = Channel::named(broker.clone(), "a", "s");
        let client_a = Channel::new(server_a.outbound.clone(), server_a.inbound.clone());
        table
            .add(PlayerEndpoint::new(Player::new("a", DisplayName::new("a"), chips_a), server_a))
            .unwrap();

        let server_b = Channel::named(broker, "b", "s");
        let client_b = Channel::new(server_b.outbound.clone(), server_b.inbound.clone());
        table
            .add(PlayerEndpoint::new(Player::new("b", DisplayName::new("b"), chips_b), server_b))
            .unwrap();

        (table, client_a, client_b)
    }

    fn seated_trio(chips_a: u64, chips_b: u64, chips_c: u64) -> (SeatTable, Channel, Channel, Channel) {
        let broker: Arc<dyn crate::broker::Broker> = Arc::new(InMemoryBroker::default());
        let mut table = SeatTable::new(4);

        let server_a = Channel::named(broker.clone(), "a", "s");
        let client_a = Channel::new(server_a.outbound.clone(), server_a.inbound.clone());
        table
            .add(PlayerEndpoint::new(Player::new("a", DisplayName::new("a"), chips_a), server_a))
            .unwrap();

        let server_b = Channel::named(broker.clone(), "b", "s");
        let client_b = Channel::new(server_b.outbound.clone(), server_b.inbound.clone());
        table
            .add(PlayerEndpoint::new(Player::new("b", DisplayName::new("b"), chips_b), server_b))
            .unwrap();

        let server_c = Channel::named(broker, "c", "s");
        let client_c = Channel::new(server_c.outbound.clone(), server_c.inbound.clone());
        table
            .add(PlayerEndpoint::new(Player::new("c", DisplayName::new("c"), chips_c), server_c))
            .unwrap();

        (table, client_a, client_b, client_c)
    }

    /// Scenario S3: a seat that can't cover its big blind is loaned a fixed
    /// `LOAN_AMOUNT` before the blind posts, and the debt is tracked on both
    /// the hand summary and the seat itself.
    #[tokio::test]
    async fn short_big_blind_is_granted_a_loan_before_posting() {
        let (mut table, _client_a, client_b) = seated_pair(3, 1000);
        let events = EventBus::new();
        // "b" is the dealer/small blind and folds; "a" (the loaned big
        // blind) wins the blinds uncontested.
        client_b
            .send(&json!({"message_type": "bet", "bet": -1}))
            .await
            .unwrap();

        let mut engine = HandEngine::new(&mut table, &events, "b".to_string(), 5, 10);
        let summary = engine.play().await.unwrap();

        assert_eq!(*summary.loans.get("a").unwrap(), LOAN_AMOUNT);
        assert_eq!(*summary.payouts.get("a").unwrap(), 15);
        assert_eq!(table.get("a").unwrap().player.loan_count, 1);
    }

    /// Scenario S2 (values made internally consistent: the literal narrative
    /// has B(100) calling 50 "all-in", which only holds if B's whole stack
    /// is 50 like C's — see DESIGN.md). Two short stacks call all-in behind
    /// a raise, the deep stack calls, and the pot settles as one pot with no
    /// side pot since every remaining stack wound up at the same level.
    #[tokio::test]
    async fn three_way_all_in_produces_a_single_pot_with_no_side_pot() {
        let (mut table, client_a, client_b, client_c) = seated_trio(200, 50, 50);
        let events = EventBus::new();

        client_c.send(&json!({"message_type": "bet", "bet": 50})).await.unwrap();
        client_a.send(&json!({"message_type": "bet", "bet": 45})).await.unwrap();
        client_b.send(&json!({"message_type": "bet", "bet": 40})).await.unwrap();
        for _ in 0..3 {
            client_a.send(&json!({"message_type": "bet", "bet": 0})).await.unwrap();
        }

        let mut engine = HandEngine::new(&mut table, &events, "a".to_string(), 5, 10);
        let summary = engine.play().await.unwrap();

        assert_eq!(summary.pots.len(), 1, "no side pot: everyone committed exactly 50");
        assert_eq!(summary.pots[0].amount, 150);
        let mut eligible = summary.pots[0].eligible.clone();
        eligible.sort();
        assert_eq!(eligible, vec!["a".to_string(), "b".to_string(), "c".to_string()]);

        let total_payout: u64 = summary.payouts.values().sum();
        assert_eq!(total_payout, 150, "the whole pot is paid out to someone");
    }

    /// Scenario S1: heads-up, dealer posts small blind and folds preflop;
    /// the other player takes the whole pot uncontested.
    #[tokio::test]
    async fn heads_up_dealer_folds_preflop_other_player_wins_pot() {
        let (mut table, client_a, _client_b) = seated_pair(1000, 1000);
        let events = EventBus::new();

        let responder = tokio::spawn(async move {
            // "a" is the dealer/small blind and folds its first action.
            client_a
                .send(&json!({"message_type": "bet", "bet": -1}))
                .await
                .unwrap();
        });

        let mut engine = HandEngine::new(&mut table, &events, "a".to_string(), 5, 10);
        let summary = engine.play().await.unwrap();
        responder.await.unwrap();

        assert_eq!(*summary.payouts.get("b").unwrap(), 15); // both blinds
        assert!(!summary.payouts.contains_key("a"));
    }

    /// Scenario S5, end to end: a seat that never replies within its action
    /// window is auto-folded, flagged `timed_out` for the room to evict, and
    /// the hand still settles to the other player.
    #[tokio::test]
    async fn silence_past_the_action_deadline_marks_the_seat_dead_and_evicts_it_end_to_end() {
        let (mut table, _client_a, _client_b) = seated_pair(500, 500);
        let events = EventBus::new();
        // Heads-up preflop: the dealer ("a") acts first and never replies.
        // Once a is folded by the timeout only one contester remains, so
        // "b" is never prompted at all.

        let mut engine = HandEngine::new(&mut table, &events, "a".to_string(), 5, 10)
            .with_action_timeout(Duration::from_millis(20));
        let summary = engine.play().await.unwrap();

        assert_eq!(*summary.payouts.get("b").unwrap(), 15, "b wins uncontested once a times out");
        assert!(table.get("a").unwrap().take_timed_out(), "a is flagged for the room to evict");
    }
}
