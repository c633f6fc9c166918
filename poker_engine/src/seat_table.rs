//! `SeatTable` and admission (spec §4.3), plus `ActivePlayerSet` (spec §3).

use std::collections::{HashMap, HashSet};

use crate::error::SeatError;
use crate::player::PlayerEndpoint;

/// Fixed-capacity ordered slot vector plus an id→endpoint map and an
/// `owner_id`. Seat order is the physical table order and drives turn
/// rotation (spec §3, §4.3).
pub struct SeatTable {
    seats: Vec<Option<String>>,
    endpoints: HashMap<String, PlayerEndpoint>,
    owner_id: Option<String>,
}

impl SeatTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            seats: vec![None; capacity],
            endpoints: HashMap::new(),
            owner_id: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.seats.len()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn owner_id(&self) -> Option<&str> {
        self.owner_id.as_deref()
    }

    /// Seated ids in physical seat order, skipping empty seats.
    pub fn seated_ids(&self) -> Vec<String> {
        self.seats.iter().flatten().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<&PlayerEndpoint> {
        self.endpoints.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut PlayerEndpoint> {
        self.endpoints.get_mut(id)
    }

    pub fn endpoints_mut(&mut self) -> impl Iterator<Item = &mut PlayerEndpoint> {
        self.endpoints.values_mut()
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &PlayerEndpoint> {
        self.endpoints.values()
    }

    /// Places `endpoint` in the lowest-index empty seat. A second `add` for
    /// an id already present fails `Duplicate`; callers convert this into a
    /// rejoin via [`SeatTable::rejoin`].
    pub fn add(&mut self, endpoint: PlayerEndpoint) -> Result<(), SeatError> {
        let id = endpoint.id().to_string();
        if self.endpoints.contains_key(&id) {
            return Err(SeatError::Duplicate(id));
        }
        let free_seat = self
            .seats
            .iter()
            .position(Option::is_none)
            .ok_or(SeatError::RoomFull)?;
        self.seats[free_seat] = Some(id.clone());
        if self.owner_id.is_none() {
            self.owner_id = Some(id.clone());
        }
        self.endpoints.insert(id, endpoint);
        Ok(())
    }

    /// Rebinds the channel of an already-seated player (spec §4.3: "the old
    /// endpoint's channel is replaced with the new one").
    pub fn rejoin(&mut self, id: &str, new_channel: crate::queue::Channel) -> Result<(), SeatError> {
        let endpoint = self
            .endpoints
            .get_mut(id)
            .ok_or_else(|| SeatError::UnknownPlayer(id.to_string()))?;
        endpoint.update_channel(new_channel);
        Ok(())
    }

    /// Frees the seat and unbinds the endpoint. If `id` was `owner`,
    /// ownership passes to the next occupied seat in order.
    pub fn remove(&mut self, id: &str) -> Result<PlayerEndpoint, SeatError> {
        let seat_idx = self
            .seats
            .iter()
            .position(|s| s.as_deref() == Some(id))
            .ok_or_else(|| SeatError::UnknownPlayer(id.to_string()))?;
        self.seats[seat_idx] = None;
        let endpoint = self
            .endpoints
            .remove(id)
            .ok_or_else(|| SeatError::UnknownPlayer(id.to_string()))?;

        if self.owner_id.as_deref() == Some(id) {
            self.owner_id = self.next_owner_after(seat_idx);
        }
        Ok(endpoint)
    }

    fn next_owner_after(&self, from_seat: usize) -> Option<String> {
        let n = self.seats.len();
        (1..=n)
            .map(|offset| (from_seat + offset) % n)
            .find_map(|idx| self.seats[idx].clone())
    }

    /// Ordered traversal starting right after the dealer and ending at the
    /// dealer (spec §4.3): `s(d+1), s(d+2), …, sd`. Only occupied seats
    /// participate; the dealer id must currently be seated.
    pub fn round(&self, dealer_id: &str) -> Vec<String> {
        let seated = self.seated_ids();
        let Some(dealer_pos) = seated.iter().position(|id| id == dealer_id) else {
            return Vec::new();
        };
        let n = seated.len();
        (1..=n).map(|offset| seated[(dealer_pos + offset) % n].clone()).collect()
    }
}

/// Derived view inside a hand: `seated`, `folded`, `dead` sets with the
/// invariant `dead ⊆ folded ⊆ seated` (spec §3).
#[derive(Debug, Clone, Default)]
pub struct ActivePlayerSet {
    seated: Vec<String>,
    folded: HashSet<String>,
    dead: HashSet<String>,
}

impl ActivePlayerSet {
    pub fn new(seated: Vec<String>) -> Self {
        Self {
            seated,
            folded: HashSet::new(),
            dead: HashSet::new(),
        }
    }

    pub fn fold(&mut self, id: &str) {
        self.folded.insert(id.to_string());
    }

    /// Marks a player dead (disconnected mid-hand): dead implies folded.
    pub fn mark_dead(&mut self, id: &str) {
        self.folded.insert(id.to_string());
        self.dead.insert(id.to_string());
    }

    pub fn is_folded(&self, id: &str) -> bool {
        self.folded.contains(id)
    }

    pub fn is_dead(&self, id: &str) -> bool {
        self.dead.contains(id)
    }

    /// All folded ids (including dead ones), for callers that need the raw
    /// set rather than a membership test — e.g. `PotBuilder::build`.
    pub fn folded_ids(&self) -> &HashSet<String> {
        &self.folded
    }

    /// All ids marked dead (disconnected mid-hand).
    pub fn dead_ids(&self) -> &HashSet<String> {
        &self.dead
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.seated.contains(&id.to_string()) && !self.is_folded(id)
    }

    pub fn seated(&self) -> &[String] {
        &self.seated
    }

    /// `active = seated \ folded`, in seated order.
    pub fn active(&self) -> Vec<String> {
        self.seated.iter().filter(|id| !self.is_folded(id)).cloned().collect()
    }

    pub fn count_active(&self) -> usize {
        self.active().len()
    }
}
