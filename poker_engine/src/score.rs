//! Hand evaluation: score a 7-card set into `(category, tiebreak cards)` and
//! compare two scores by total order.
//!
//! Grounded in `original_source/poker/game_core/scoring/card_combo_detector.py`
//! and `holdem_score_detector.py`: group by rank, scan once (descending) for
//! straights/flushes, and try categories from strongest to weakest, first
//! match wins.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::card::{Card, LOWEST_RANK};

/// Hand categories, strictly ordered weakest-to-strongest (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Category {
    NoPair = 0,
    Pair = 1,
    TwoPair = 2,
    Trips = 3,
    Straight = 4,
    Flush = 5,
    FullHouse = 6,
    Quads = 7,
    StraightFlush = 8,
}

/// A scored hand: a category plus up to five cards that justify it, ordered
/// from most to least significant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Score {
    pub category: Category,
    pub cards: Vec<Card>,
}

impl Score {
    pub fn new(category: Category, cards: Vec<Card>) -> Self {
        debug_assert!(cards.len() <= 5);
        Self { category, cards }
    }

    /// `category` in the high nibble followed by up to five 4-bit rank
    /// nibbles in descending relevance (spec §3).
    pub fn strength(&self) -> u32 {
        let mut strength = self.category as u32;
        for offset in 0..5 {
            strength <<= 4;
            if let Some(card) = self.cards.get(offset) {
                strength += card.rank as u32;
            }
        }
        strength
    }
}

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.strength() == other.strength()
    }
}
impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.strength().cmp(&other.strength())
    }
}

/// Detects the best combination of a given shape out of a 7-card set, sorted
/// descending by rank so the first match found is always the highest one.
struct ComboDetector {
    sorted: Vec<Card>,
    lowest_rank: u8,
}

impl ComboDetector {
    fn new(mut cards: Vec<Card>, lowest_rank: u8) -> Self {
        cards.sort_by(|a, b| b.rank.cmp(&a.rank));
        Self {
            sorted: cards,
            lowest_rank,
        }
    }

    fn group_by_rank(&self) -> HashMap<u8, Vec<Card>> {
        let mut groups: HashMap<u8, Vec<Card>> = HashMap::new();
        for card in &self.sorted {
            groups.entry(card.rank).or_default().push(*card);
        }
        groups
    }

    /// Groups of exactly `x` same-ranked cards, sorted by rank descending.
    fn x_sorted_list(&self, x: usize) -> Vec<Vec<Card>> {
        let mut groups: Vec<Vec<Card>> = self
            .group_by_rank()
            .into_values()
            .filter(|cards| cards.len() == x)
            .collect();
        groups.sort_by(|a, b| b[0].rank.cmp(&a[0].rank));
        groups
    }

    fn merge_with(&self, combo: Vec<Card>) -> Vec<Card> {
        let mut merged = combo.clone();
        merged.extend(self.sorted.iter().filter(|c| !combo.contains(c)));
        merged.truncate(5);
        merged
    }

    fn get_straight(sorted: &[Card]) -> Option<Vec<Card>> {
        let lowest = LOWEST_RANK;
        if sorted.len() < 5 {
            return None;
        }
        let mut straight = vec![sorted[0]];
        for i in 1..sorted.len() {
            if sorted[i].rank == sorted[i - 1].rank.wrapping_sub(1) {
                straight.push(sorted[i]);
                if straight.len() == 5 {
                    return Some(straight);
                }
            } else if sorted[i].rank != sorted[i - 1].rank {
                straight = vec![sorted[i]];
            }
        }
        // Wheel: Ace can play low under `lowest_rank` (A-2-3-4-5).
        if straight.len() == 4 && sorted[0].rank == 14 && straight.last().unwrap().rank == lowest {
            straight.push(sorted[0]);
            return Some(straight);
        }
        None
    }

    fn quads(&self) -> Option<Vec<Card>> {
        self.x_sorted_list(4).into_iter().next().map(|c| self.merge_with(c))
    }

    fn full_house(&self) -> Option<Vec<Card>> {
        let trips = self.x_sorted_list(3);
        if trips.len() >= 2 {
            let mut combo = trips[0].clone();
            combo.extend_from_slice(&trips[1][0..2]);
            return Some(self.merge_with(combo));
        }
        let pairs = self.x_sorted_list(2);
        let first_trips = trips.into_iter().next()?;
        let first_pair = pairs.into_iter().next()?;
        let mut combo = first_trips;
        combo.extend(first_pair);
        Some(self.merge_with(combo))
    }

    fn trips(&self) -> Option<Vec<Card>> {
        self.x_sorted_list(3).into_iter().next().map(|c| self.merge_with(c))
    }

    fn two_pair(&self) -> Option<Vec<Card>> {
        let pairs = self.x_sorted_list(2);
        if pairs.len() < 2 {
            return None;
        }
        let mut combo = pairs[0].clone();
        combo.extend(pairs[1].clone());
        Some(self.merge_with(combo))
    }

    fn pair(&self) -> Option<Vec<Card>> {
        self.x_sorted_list(2).into_iter().next().map(|c| self.merge_with(c))
    }

    fn straight(&self) -> Option<Vec<Card>> {
        Self::get_straight(&self.sorted)
    }

    fn flush(&self) -> Option<Vec<Card>> {
        let mut by_suit: HashMap<_, Vec<Card>> = HashMap::new();
        for card in &self.sorted {
            let bucket = by_suit.entry(card.suit).or_default();
            bucket.push(*card);
            if bucket.len() == 5 {
                return Some(bucket.clone());
            }
        }
        None
    }

    fn straight_flush(&self) -> Option<Vec<Card>> {
        let mut by_suit: HashMap<_, Vec<Card>> = HashMap::new();
        for card in &self.sorted {
            let bucket = by_suit.entry(card.suit).or_default();
            bucket.push(*card);
            if bucket.len() >= 5
                && let Some(straight) = Self::get_straight(bucket)
            {
                return Some(straight);
            }
        }
        None
    }

    fn no_pair(&self) -> Vec<Card> {
        self.sorted.iter().take(5).copied().collect()
    }
}

/// Scores a 7-card set (two hole cards plus up to five community cards),
/// returning the highest-category 5-card combination.
pub fn evaluate(cards: Vec<Card>) -> Score {
    let detector = ComboDetector::new(cards, LOWEST_RANK);
    let candidates: [(Category, Option<Vec<Card>>); 8] = [
        (Category::StraightFlush, detector.straight_flush()),
        (Category::Quads, detector.quads()),
        (Category::FullHouse, detector.full_house()),
        (Category::Flush, detector.flush()),
        (Category::Straight, detector.straight()),
        (Category::Trips, detector.trips()),
        (Category::TwoPair, detector.two_pair()),
        (Category::Pair, detector.pair()),
    ];
    for (category, combo) in candidates {
        if let Some(cards) = combo {
            return Score::new(category, cards);
        }
    }
    Score::new(Category::NoPair, detector.no_pair())
}
