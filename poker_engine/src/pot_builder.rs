//! Side-pot construction (spec §4.5), grounded in `game_pots.py`'s
//! ascending-commitment sweep.

use std::collections::HashSet;

use crate::bet_rounder::BetsLedger;
use crate::error::GameError;

/// One pot: a chip amount and the players still eligible to win it (those
/// who committed at least this pot's level and never folded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pot {
    pub amount: u64,
    pub eligible: Vec<String>,
}

/// Builds side pots from a street's (or a whole hand's accumulated)
/// commitments. Sorts the distinct commitment levels ascending and, at each
/// level, carves out `(level - previous_level) * contributors_at_this_level`
/// as one pot, eligible to everyone who reached that level and hasn't
/// folded. A short all-in naturally caps how much it can win from players
/// who committed more.
pub struct PotBuilder;

impl PotBuilder {
    pub fn build(ledger: &BetsLedger, folded: &HashSet<String>) -> Result<Vec<Pot>, GameError> {
        let total_committed: u64 = ledger.iter().map(|(_, amount)| *amount).sum();

        let mut levels: Vec<u64> = ledger
            .iter()
            .map(|(_, amount)| *amount)
            .filter(|amount| *amount > 0)
            .collect();
        levels.sort_unstable();
        levels.dedup();

        let mut pots = Vec::new();
        let mut previous = 0u64;
        let mut spare = 0u64;

        for level in levels {
            let contributors: Vec<&String> = ledger
                .iter()
                .filter(|(_, amount)| **amount >= level)
                .map(|(id, _)| id)
                .collect();
            let slice = level - previous;
            let amount = slice * contributors.len() as u64;
            let eligible: Vec<String> = contributors
                .iter()
                .filter(|id| !folded.contains(id.as_str()))
                .map(|id| id.to_string())
                .collect();

            if eligible.is_empty() {
                // Everyone who reached this level folded (e.g. the last
                // aggressor's uncalled raise): it returns to them, not a pot.
                spare += amount;
            } else {
                // A level whose eligible set exactly matches the pot just
                // pushed (e.g. a fold at one level changes nothing about who
                // contests the next) merges into it instead of forming a
                // separate pot with an identical eligible list.
                let same_as_previous = pots
                    .last()
                    .map(|p: &Pot| {
                        let mut a: Vec<&String> = p.eligible.iter().collect();
                        let mut b: Vec<&String> = eligible.iter().collect();
                        a.sort();
                        b.sort();
                        a == b
                    })
                    .unwrap_or(false);

                if same_as_previous {
                    pots.last_mut().unwrap().amount += amount;
                } else {
                    pots.push(Pot { amount, eligible });
                }
            }
            previous = level;
        }

        let accounted: u64 = pots.iter().map(|p| p.amount).sum::<u64>() + spare;
        if accounted != total_committed {
            return Err(GameError::InvalidBets(total_committed as i64 - accounted as i64));
        }

        Ok(pots)
    }
}
