//! Property tests for the quantified invariants (spec §8): chip
//! conservation, pot eligibility, deck integrity, order fidelity, and score
//! ordering.

use std::collections::HashSet;

use poker_engine::bet_rounder::BetsLedger;
use poker_engine::broker::{Broker, InMemoryBroker};
use poker_engine::card::{Card, Deck, Suit, HIGHEST_RANK, LOWEST_RANK};
use poker_engine::player::{DisplayName, Player, PlayerEndpoint, LOAN_AMOUNT};
use poker_engine::pot_builder::PotBuilder;
use poker_engine::queue::Channel;
use poker_engine::score::{self, Category};
use poker_engine::seat_table::SeatTable;
use proptest::prelude::*;
use std::sync::Arc;

fn suit_from_index(i: u8) -> Suit {
    match i % 4 {
        0 => Suit::Club,
        1 => Suit::Diamond,
        2 => Suit::Heart,
        _ => Suit::Spade,
    }
}

fn arb_card() -> impl Strategy<Value = Card> {
    (LOWEST_RANK..=HIGHEST_RANK, 0u8..4).prop_map(|(rank, suit)| Card::new(rank, suit_from_index(suit)))
}

/// Seven distinct cards, drawn without replacement.
fn arb_seven_card_hand() -> impl Strategy<Value = Vec<Card>> {
    proptest::collection::hash_set(arb_card(), 7..=7).prop_map(|set| set.into_iter().collect())
}

/// A 7-card hand that is guaranteed to contain a flush: five distinct ranks
/// of one suit plus two off-suit fillers at ranks the flush doesn't use.
fn arb_flush_hand() -> impl Strategy<Value = Vec<Card>> {
    (0u8..4, proptest::collection::hash_set(LOWEST_RANK..=HIGHEST_RANK, 5..=5)).prop_flat_map(
        |(suit_idx, ranks)| {
            let suit = suit_from_index(suit_idx);
            let flush_cards: Vec<Card> = ranks.into_iter().map(|r| Card::new(r, suit)).collect();
            let used_ranks: HashSet<u8> = flush_cards.iter().map(|c| c.rank).collect();
            let remaining_ranks: Vec<u8> = (LOWEST_RANK..=HIGHEST_RANK).filter(|r| !used_ranks.contains(r)).collect();
            let other_suit = suit_from_index(suit_idx + 1);
            proptest::sample::subsequence(remaining_ranks, 2).prop_map(move |picked| {
                let mut cards = flush_cards.clone();
                cards.push(Card::new(picked[0], other_suit));
                cards.push(Card::new(picked[1], other_suit));
                cards
            })
        },
    )
}

fn test_endpoint(id: &str) -> PlayerEndpoint {
    let broker: Arc<dyn Broker> = Arc::new(InMemoryBroker::default());
    let server = Channel::named(broker, id, "s");
    PlayerEndpoint::new(Player::new(id, DisplayName::new(id), 1000), server)
}

proptest! {
    /// Property 1: chip conservation. `Player::apply_loan_refund` never
    /// refunds more chips than the player holds above one loan's worth, and
    /// never clears more loans than were outstanding.
    #[test]
    fn loan_refund_never_overdraws_or_overclears(chips in 0u64..20_000, loan_count in 0u32..10) {
        let mut player = Player::new("a", DisplayName::new("a"), chips);
        player.loan_count = loan_count;
        let chips_before = player.chips;
        let loans_before = player.loan_count;

        player.apply_loan_refund();

        let refunds = loans_before - player.loan_count;
        prop_assert!(player.loan_count <= loans_before);
        prop_assert!(player.chips <= chips_before);
        prop_assert_eq!(chips_before - player.chips, refunds as u64 * LOAN_AMOUNT);
        if refunds > 0 {
            prop_assert!(chips_before > LOAN_AMOUNT);
        }
    }

    /// Property 3: deck integrity. After any sequence of deals and
    /// discards, the live deck plus the discard pile plus everything dealt
    /// so far reconstructs exactly the canonical 52-card set, with no card
    /// counted twice.
    #[test]
    fn deck_discard_and_dealt_always_reconstruct_52_cards(
        draw_sizes in proptest::collection::vec(1usize..=5, 1..20),
        discard_instead_of_keep in proptest::collection::vec(proptest::bool::ANY, 1..20),
    ) {
        let mut deck = Deck::new();
        let mut dealt = Vec::new();
        for (i, n) in draw_sizes.into_iter().enumerate() {
            let cards = deck.pop(n);
            if discard_instead_of_keep.get(i).copied().unwrap_or(false) {
                deck.discard(cards);
            } else {
                dealt.extend(cards);
            }
        }
        let undealt: HashSet<Card> = deck.undealt().into_iter().collect();
        let mut total = undealt.clone();
        total.extend(dealt.iter().copied());
        prop_assert_eq!(undealt.len() + dealt.len(), total.len(), "no card is both undealt and dealt");
        prop_assert_eq!(total.len(), 52);
    }

    /// Property 4: order fidelity. `SeatTable::round(dealer)` always starts
    /// right after the dealer, ends at the dealer, and visits every seated
    /// id exactly once.
    #[test]
    fn round_starts_after_dealer_and_covers_every_seat_once(n in 2usize..9, dealer_offset in 0usize..9) {
        let ids: Vec<String> = (0..n).map(|i| format!("p{i}")).collect();
        let dealer = ids[dealer_offset % n].clone();

        let mut table = SeatTable::new(9);
        for id in &ids {
            table.add(test_endpoint(id)).unwrap();
        }

        let round = table.round(&dealer);
        prop_assert_eq!(round.len(), n);
        let unique: HashSet<&String> = round.iter().collect();
        prop_assert_eq!(unique.len(), n, "every seat appears exactly once");
        prop_assert_eq!(round.last(), Some(&dealer), "traversal ends at the dealer");
        for id in &round {
            prop_assert!(ids.contains(id));
        }
    }

    /// Property 2: pot eligibility. No folded id is ever eligible for a
    /// pot, and since side pots are carved out in ascending commitment
    /// order, a later (higher) pot's eligible set is always a subset of an
    /// earlier (lower) pot's — eligibility only shrinks as the level rises.
    #[test]
    fn pots_never_admit_folded_ids_and_eligibility_only_shrinks_across_levels(
        commitments in proptest::collection::vec(0u64..500, 1..6),
        fold_mask in proptest::collection::vec(proptest::bool::ANY, 1..6),
    ) {
        let mut ledger = BetsLedger::default();
        let mut folded = HashSet::new();
        for (i, amount) in commitments.iter().enumerate() {
            let id = format!("p{i}");
            ledger.set(&id, *amount);
            if fold_mask.get(i).copied().unwrap_or(false) {
                folded.insert(id);
            }
        }

        if let Ok(pots) = PotBuilder::build(&ledger, &folded) {
            let mut previous_eligible: Option<HashSet<&String>> = None;
            for pot in &pots {
                prop_assert!(!pot.eligible.is_empty());
                let eligible: HashSet<&String> = pot.eligible.iter().collect();
                for id in &eligible {
                    prop_assert!(!folded.contains(*id));
                }
                if let Some(prev) = &previous_eligible {
                    prop_assert!(eligible.is_subset(prev), "eligibility only shrinks as pot levels rise");
                }
                previous_eligible = Some(eligible);
            }
            let total_committed: u64 = ledger.iter().map(|(_, amount)| *amount).sum();
            let accounted: u64 = pots.iter().map(|p| p.amount).sum();
            prop_assert!(accounted <= total_committed);
        }
    }

    /// Property 5: score ordering. A hand guaranteed to contain a flush
    /// never evaluates below `Category::Flush`, regardless of its other two
    /// cards.
    #[test]
    fn a_guaranteed_flush_scores_at_least_a_flush(cards in arb_flush_hand()) {
        let score = score::evaluate(cards);
        prop_assert!(score.category >= Category::Flush);
    }

    /// Property 5 continued: `cmp` is a total order consistent with
    /// category first — a strictly higher category always outranks a
    /// strictly lower one, whatever the tiebreak cards underneath it.
    #[test]
    fn category_dominates_tiebreak_cards_in_score_ordering(
        hand_a in arb_seven_card_hand(),
        hand_b in arb_seven_card_hand(),
    ) {
        let score_a = score::evaluate(hand_a);
        let score_b = score::evaluate(hand_b);
        match score_a.category.cmp(&score_b.category) {
            std::cmp::Ordering::Less => prop_assert!(score_a < score_b),
            std::cmp::Ordering::Greater => prop_assert!(score_a > score_b),
            std::cmp::Ordering::Equal => {}
        }
    }
}
