//! Betting-round state machine (spec §4.4, §4.6), grounded in
//! `game_bet_rounder.py`'s `GameBetRounder`/`BetsLedger`.
//!
//! Traversal-order resolution (spec §4.3, §4.6, worked scenarios S1/S2):
//! `SeatTable::round(dealer)` always returns `[s(d+1), …, dealer]` with the
//! dealer last. Scenario S2 (three seats) has the dealer post the *small*
//! blind and the next seat post the big blind, which only reconciles with
//! the general "two seats preceding the dealer" wording if that wording's
//! "heads-up: dealer posts small" clause is in fact the universal rule, not
//! a two-player special case — so `BetRounder` always treats the round's
//! *last* entry (the dealer) as the small blind and the round's *first*
//! entry as the big blind, regardless of seat count. The blind round then
//! starts acting at `round[1]` (just after the big blind); every later
//! street starts at `round[0]` (the big blind's seat, first to act once the
//! dealer is no longer last to act).

use std::collections::{HashMap, HashSet};

use crate::error::GameError;

/// A player's submitted action for the acting turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Fold,
    /// Check (0) or call/raise to this total commitment for the street.
    Bet(u64),
}

/// Per-street chip commitments, keyed by player id. Folded players keep
/// their last commitment (it stays eligible for the pots already formed);
/// dead players are recorded as owing nothing further.
#[derive(Debug, Default, Clone)]
pub struct BetsLedger {
    committed: HashMap<String, u64>,
}

impl BetsLedger {
    pub fn committed(&self, id: &str) -> u64 {
        *self.committed.get(id).unwrap_or(&0)
    }

    pub fn set(&mut self, id: &str, amount: u64) {
        self.committed.insert(id.to_string(), amount);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &u64)> {
        self.committed.iter()
    }
}

/// Drives one betting round (one street) over a fixed action order.
/// Owns a working copy of each player's remaining stack for the round's
/// duration; the caller (`HandEngine`) reconciles `stacks`/`ledger` back
/// into `Player.chips` once the round closes.
pub struct BetRounder {
    order: Vec<String>,
    cursor: usize,
    folded: HashSet<String>,
    dead: HashSet<String>,
    stacks: HashMap<String, u64>,
    ledger: BetsLedger,
    current_bet: u64,
    min_raise: u64,
    acted_since_raise: HashSet<String>,
    blind_round: bool,
}

impl BetRounder {
    /// `round` is `SeatTable::round(dealer)` verbatim: `[s(d+1), …, dealer]`.
    /// `dead` players post nothing and act as if already folded.
    pub fn new(
        round: Vec<String>,
        blind_round: bool,
        small_blind: u64,
        big_blind: u64,
        stacks: HashMap<String, u64>,
        dead: HashSet<String>,
    ) -> Self {
        let mut rounder = Self {
            order: round,
            cursor: 0,
            folded: dead.clone(),
            dead,
            stacks,
            ledger: BetsLedger::default(),
            current_bet: 0,
            min_raise: big_blind,
            acted_since_raise: HashSet::new(),
            blind_round,
        };

        if blind_round && !rounder.order.is_empty() {
            let n = rounder.order.len();
            // The dealer (order's last entry) posts small; the next live
            // seat going forward from the dealer posts big. Both searches
            // skip seats vacated by a disconnect-triggered `dead` mark.
            let sb_id = rounder
                .next_live_from(n - 1)
                .unwrap_or_else(|| rounder.order[n - 1].clone());
            let bb_id = rounder
                .next_live_from((n - 1 + 1) % n)
                .unwrap_or_else(|| rounder.order[0].clone());
            rounder.post_blind(&sb_id, small_blind);
            rounder.post_blind(&bb_id, big_blind);
            rounder.current_bet = rounder.ledger.committed(&bb_id);
            rounder.cursor = if n > 1 { 1 } else { 0 };
        }

        rounder.skip_inactive();
        rounder
    }

    /// First id at or after `start` (wrapping) that isn't marked `dead`.
    fn next_live_from(&self, start: usize) -> Option<String> {
        let n = self.order.len();
        if n == 0 {
            return None;
        }
        (0..n)
            .map(|offset| (start + offset) % n)
            .map(|idx| &self.order[idx])
            .find(|id| !self.dead.contains(*id))
            .cloned()
    }

    /// Posts a blind, capping at the player's stack (an all-in short blind
    /// is legal; the shortfall is simply never collected).
    fn post_blind(&mut self, id: &str, amount: u64) {
        if self.dead.contains(id) {
            return;
        }
        let stack = *self.stacks.get(id).unwrap_or(&0);
        let posted = amount.min(stack);
        self.stacks.insert(id.to_string(), stack - posted);
        self.ledger.set(id, posted);
    }

    pub fn current_actor(&self) -> Option<&str> {
        if self.is_closed() {
            None
        } else {
            self.order.get(self.cursor).map(String::as_str)
        }
    }

    pub fn current_bet(&self) -> u64 {
        self.current_bet
    }

    pub fn min_bet(&self, id: &str) -> u64 {
        let owed = self.current_bet.saturating_sub(self.ledger.committed(id));
        owed.min(*self.stacks.get(id).unwrap_or(&0))
    }

    /// The most `id` may commit this street: its own effective stack,
    /// capped by the deepest other contesting player's effective stack
    /// relative to what `id` has already put in — betting past what any
    /// opponent could ever call just locks chips into a pot nobody can
    /// contest for.
    pub fn max_bet(&self, id: &str) -> u64 {
        let own_stack = *self.stacks.get(id).unwrap_or(&0);
        let own_committed = self.ledger.committed(id);

        let cap = self
            .order
            .iter()
            .filter(|other| other.as_str() != id && self.is_contesting(other))
            .filter_map(|other| {
                let their_stack = *self.stacks.get(other).unwrap_or(&0);
                let their_committed = self.ledger.committed(other);
                (their_stack + their_committed).checked_sub(own_committed)
            })
            .max();

        match cap {
            Some(cap) => own_stack.min(cap),
            None => own_stack,
        }
    }

    pub fn ledger(&self) -> &BetsLedger {
        &self.ledger
    }

    pub fn stack(&self, id: &str) -> u64 {
        *self.stacks.get(id).unwrap_or(&0)
    }

    pub fn fold(&mut self, id: &str) {
        self.folded.insert(id.to_string());
        self.advance();
    }

    /// Applies a call/raise/all-in to a total street commitment of
    /// `total`. Rejects a `total` that neither matches the current bet,
    /// raises it by at least `min_raise`, nor exhausts the player's stack.
    pub fn submit(&mut self, id: &str, total: u64) -> Result<(), GameError> {
        let already = self.ledger.committed(id);
        if total < already {
            return Err(GameError::InvalidBets(total as i64));
        }
        let delta = total - already;
        let stack = *self.stacks.get(id).unwrap_or(&0);
        if delta > stack {
            return Err(GameError::InvalidBets(total as i64));
        }
        let all_in = delta == stack;
        let is_raise = total > self.current_bet;
        if is_raise && !all_in && total < self.current_bet + self.min_raise {
            return Err(GameError::InvalidBets(total as i64));
        }
        if !is_raise && total != self.current_bet && !all_in {
            return Err(GameError::InvalidBets(total as i64));
        }

        self.stacks.insert(id.to_string(), stack - delta);
        self.ledger.set(id, total);
        self.acted_since_raise.insert(id.to_string());

        if is_raise {
            self.min_raise = (total - self.current_bet).max(self.min_raise);
            self.current_bet = total;
            self.acted_since_raise.clear();
            self.acted_since_raise.insert(id.to_string());
        }

        self.advance();
        Ok(())
    }

    fn is_contesting(&self, id: &str) -> bool {
        self.order.contains(&id.to_string()) && !self.folded.contains(id) && !self.dead.contains(id)
    }

    fn is_all_in(&self, id: &str) -> bool {
        self.stacks.get(id).copied().unwrap_or(0) == 0
    }

    /// Closed once every contesting, non-all-in player has matched
    /// `current_bet` and acted since the last raise (or there is at most
    /// one contesting player left, which ends the hand rather than the
    /// street, but is also a safe closing condition here).
    pub fn is_closed(&self) -> bool {
        let contesting: Vec<&String> = self
            .order
            .iter()
            .filter(|id| self.is_contesting(id))
            .collect();
        if contesting.len() <= 1 {
            return true;
        }
        contesting.iter().all(|id| {
            self.is_all_in(id)
                || (self.ledger.committed(id) == self.current_bet && self.acted_since_raise.contains(*id))
        })
    }

    fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % self.order.len().max(1);
        self.skip_inactive();
    }

    fn skip_inactive(&mut self) {
        if self.order.is_empty() {
            return;
        }
        let n = self.order.len();
        for _ in 0..n {
            let id = &self.order[self.cursor];
            if self.is_contesting(id) && !self.is_all_in(id) {
                return;
            }
            self.cursor = (self.cursor + 1) % n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stacks(ids: &[&str], chips: u64) -> HashMap<String, u64> {
        ids.iter().map(|id| (id.to_string(), chips)).collect()
    }

    #[test]
    fn heads_up_blind_round_dealer_posts_small_and_acts_first() {
        // round("a") with seats [a, b] => [b, a]: dealer a is last, small blind.
        let round = vec!["b".to_string(), "a".to_string()];
        let rounder = BetRounder::new(
            round,
            true,
            5,
            10,
            stacks(&["a", "b"], 1000),
            HashSet::new(),
        );
        assert_eq!(rounder.ledger().committed("a"), 5);
        assert_eq!(rounder.ledger().committed("b"), 10);
        // two players: cursor wraps back to index 0 ("b" the big blind)... but
        // heads-up preflop action starts with the dealer (small blind) acting
        // first, i.e. round[1] == "a".
        assert_eq!(rounder.current_actor(), Some("a"));
    }

    #[test]
    fn three_handed_blind_round_starts_under_the_gun() {
        // scenario S2: seats [a(dealer), b, c]; round("a") = [b, c, a].
        let round = vec!["b".to_string(), "c".to_string(), "a".to_string()];
        let rounder = BetRounder::new(
            round,
            true,
            5,
            10,
            stacks(&["a", "b", "c"], 1000),
            HashSet::new(),
        );
        assert_eq!(rounder.ledger().committed("a"), 5, "dealer posts small blind");
        assert_eq!(rounder.ledger().committed("b"), 10, "next seat posts big blind");
        assert_eq!(rounder.current_actor(), Some("c"), "action starts under the gun");
    }

    #[test]
    fn big_blind_retains_the_option_after_a_call() {
        let round = vec!["b".to_string(), "a".to_string()];
        let mut rounder = BetRounder::new(round, true, 5, 10, stacks(&["a", "b"], 1000), HashSet::new());
        assert!(rounder.submit("a", 10).is_ok());
        assert!(!rounder.is_closed(), "big blind still has the option to act");
        assert_eq!(rounder.current_actor(), Some("b"));
        assert!(rounder.submit("b", 10).is_ok());
        assert!(rounder.is_closed());
    }

    #[test]
    fn raise_below_min_raise_is_rejected() {
        let round = vec!["b".to_string(), "a".to_string()];
        let mut rounder = BetRounder::new(round, true, 5, 10, stacks(&["a", "b"], 1000), HashSet::new());
        assert!(rounder.submit("a", 12).is_err());
    }

    #[test]
    fn all_in_short_of_min_raise_is_legal() {
        let round = vec!["b".to_string(), "a".to_string()];
        let mut stacks_map = stacks(&["a", "b"], 1000);
        stacks_map.insert("a".to_string(), 5); // only has the small blind left
        let mut rounder = BetRounder::new(round, true, 5, 10, stacks_map, HashSet::new());
        assert!(rounder.submit("a", 5).is_ok());
        assert_eq!(rounder.stack("a"), 0);
    }

    #[test]
    fn folding_to_one_contester_closes_the_round() {
        let round = vec!["b".to_string(), "c".to_string(), "a".to_string()];
        let mut rounder =
            BetRounder::new(round, true, 5, 10, stacks(&["a", "b", "c"], 1000), HashSet::new());
        rounder.fold("c");
        rounder.fold("a");
        assert!(rounder.is_closed());
    }

    #[test]
    fn max_bet_is_capped_by_the_deepest_other_active_players_effective_stack() {
        let round = vec!["b".to_string(), "c".to_string(), "a".to_string()];
        let mut stacks_map = stacks(&["a", "b", "c"], 1000);
        stacks_map.insert("c".to_string(), 40);
        let rounder = BetRounder::new(round, true, 5, 10, stacks_map, HashSet::new());
        assert_eq!(rounder.max_bet("a"), 995);
    }

    #[test]
    fn max_bet_caps_below_the_actors_own_stack_when_every_opponent_is_short() {
        let round = vec!["b".to_string(), "c".to_string(), "a".to_string()];
        let mut stacks_map = HashMap::new();
        stacks_map.insert("a".to_string(), 1000);
        stacks_map.insert("b".to_string(), 30);
        stacks_map.insert("c".to_string(), 20);
        let rounder = BetRounder::new(round, true, 5, 10, stacks_map, HashSet::new());
        assert_eq!(rounder.max_bet("a"), 25);
    }

    #[test]
    fn dead_players_post_nothing_and_are_skipped() {
        let round = vec!["b".to_string(), "c".to_string(), "a".to_string()];
        let mut dead = HashSet::new();
        dead.insert("b".to_string());
        let rounder = BetRounder::new(round, true, 5, 10, stacks(&["a", "b", "c"], 1000), dead);
        assert_eq!(rounder.ledger().committed("b"), 0);
        assert_eq!(rounder.ledger().committed("c"), 10, "next live seat posts the big blind");
    }
}
