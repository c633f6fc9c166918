//! 52-card deck: ranks 2..=14 (Ace high), four suits, compact integer encoding.

use std::fmt;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Lowest playable rank. Texas Hold'em deals from a full 52-card deck.
pub const LOWEST_RANK: u8 = 2;
pub const HIGHEST_RANK: u8 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Suit {
    Club,
    Diamond,
    Heart,
    Spade,
}

impl Suit {
    const ALL: [Suit; 4] = [Suit::Club, Suit::Diamond, Suit::Heart, Suit::Spade];

    fn symbol(self) -> char {
        match self {
            Suit::Club => '♣',
            Suit::Diamond => '♦',
            Suit::Heart => '♥',
            Suit::Spade => '♠',
        }
    }
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// A single playing card. Ordering and equality are by `(rank, suit)`,
/// matching the spec's compact `(rank<<2)|suit` encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Card {
    pub rank: u8,
    pub suit: Suit,
}

impl Card {
    pub fn new(rank: u8, suit: Suit) -> Self {
        debug_assert!((LOWEST_RANK..=HIGHEST_RANK).contains(&rank));
        Self { rank, suit }
    }

    /// `(rank<<2)|suit` packed integer form, per spec §3.
    pub fn encoded(&self) -> u16 {
        ((self.rank as u16) << 2) | (self.suit as u16)
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rank = match self.rank {
            2..=10 => self.rank.to_string(),
            11 => "J".to_string(),
            12 => "Q".to_string(),
            13 => "K".to_string(),
            14 => "A".to_string(),
            r => r.to_string(),
        };
        write!(f, "{rank}{}", self.suit)
    }
}

/// An ordered sequence of cards plus a discard pile. Invariant (spec §3):
/// `|deck| + |discard| + |dealt| == 52` at all times during a hand.
#[derive(Debug, Clone)]
pub struct Deck {
    cards: Vec<Card>,
    discard: Vec<Card>,
}

impl Default for Deck {
    fn default() -> Self {
        Self::new()
    }
}

impl Deck {
    pub fn new() -> Self {
        let mut cards = Vec::with_capacity(52);
        for suit in Suit::ALL {
            for rank in LOWEST_RANK..=HIGHEST_RANK {
                cards.push(Card::new(rank, suit));
            }
        }
        let mut deck = Self {
            cards,
            discard: Vec::new(),
        };
        deck.shuffle();
        deck
    }

    pub fn shuffle(&mut self) {
        self.cards.shuffle(&mut rand::rng());
    }

    /// Returns `n` cards from the top of the deck. If the live deck runs
    /// short, the discard pile is shuffled back in before popping the rest.
    pub fn pop(&mut self, n: usize) -> Vec<Card> {
        let mut popped = Vec::with_capacity(n);
        for _ in 0..n {
            if self.cards.is_empty() {
                self.cards.append(&mut self.discard);
                self.shuffle();
            }
            match self.cards.pop() {
                Some(card) => popped.push(card),
                None => break,
            }
        }
        popped
    }

    pub fn discard(&mut self, cards: impl IntoIterator<Item = Card>) {
        self.discard.extend(cards);
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Returns the multiset of every card currently in the live deck or the
    /// discard pile, for invariant checks (spec §8 "deck integrity").
    pub fn undealt(&self) -> Vec<Card> {
        let mut all = self.cards.clone();
        all.extend(self.discard.iter().copied());
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn fresh_deck_has_52_unique_cards() {
        let deck = Deck::new();
        let set: HashSet<_> = deck.cards.iter().copied().collect();
        assert_eq!(set.len(), 52);
    }

    #[test]
    fn pop_reshuffles_discard_when_live_deck_runs_dry() {
        let mut deck = Deck::new();
        let mut dealt = deck.pop(50);
        assert_eq!(deck.len(), 2);
        deck.discard(dealt.drain(..40));
        let more = deck.pop(10);
        assert_eq!(more.len(), 10);
    }

    #[test]
    fn deck_plus_discard_plus_dealt_is_always_52() {
        let mut deck = Deck::new();
        let mut dealt = Vec::new();
        for _ in 0..5 {
            dealt.extend(deck.pop(3));
        }
        let mut total: HashSet<_> = deck.undealt().into_iter().collect();
        total.extend(dealt);
        assert_eq!(total.len(), 52);
    }

    #[test]
    fn card_display_shows_rank_and_suit() {
        let card = Card::new(14, Suit::Spade);
        assert_eq!(card.to_string(), "A♠");
    }

    #[test]
    fn card_encoding_round_trips_through_ordering() {
        let a = Card::new(10, Suit::Heart);
        let b = Card::new(10, Suit::Spade);
        assert!(a.encoded() != b.encoded());
        assert_eq!(a, Card::new(10, Suit::Heart));
    }
}
