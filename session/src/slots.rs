//! Host-side lobby seating.
//!
//! Slot 0 always belongs to the host. Remote peers are seated in the lowest
//! free slot that is marked open; the host may close slots to keep peers out.
//! The table is the single source of the `Presence` broadcast to everyone.

use crate::error::SessionError;
use crate::transport::PeerId;
use log::info;
use shared::{Presence, SlotId, HOST_SLOT, MAX_SLOTS};

/// Name shown for a seated peer until its `Join` arrives.
pub const PENDING_NAME: &str = "Joining...";

#[derive(Debug, Clone, Default)]
struct Seat {
    peer: Option<PeerId>,
    name: String,
    occupied: bool,
    open: bool,
}

#[derive(Debug, Clone)]
pub struct SlotTable {
    seats: [Seat; MAX_SLOTS],
}

impl SlotTable {
    /// Creates a lobby with the host seated in slot 0 and every slot open.
    pub fn new(host_name: &str) -> Self {
        let mut seats: [Seat; MAX_SLOTS] = Default::default();
        for seat in seats.iter_mut() {
            seat.open = true;
        }
        seats[HOST_SLOT as usize].occupied = true;
        seats[HOST_SLOT as usize].name = host_name.to_string();

        Self { seats }
    }

    /// Seats `peer` in the lowest open, unoccupied slot in 1..MAX_SLOTS.
    ///
    /// A peer that is already seated keeps its slot.
    pub fn allocate(&mut self, peer: &PeerId) -> Result<SlotId, SessionError> {
        if let Some(slot) = self.find_slot_by_peer(peer) {
            return Ok(slot);
        }

        let free = (1..MAX_SLOTS).find(|&i| self.seats[i].open && !self.seats[i].occupied);
        match free {
            Some(index) => {
                let seat = &mut self.seats[index];
                seat.peer = Some(peer.clone());
                seat.occupied = true;
                seat.name = PENDING_NAME.to_string();
                info!("Peer {} seated in slot {}", peer, index);
                Ok(index as SlotId)
            }
            None => Err(SessionError::RoomFull),
        }
    }

    /// Frees the seat held by `peer`. Returns the slot it occupied.
    pub fn release(&mut self, peer: &PeerId) -> Option<SlotId> {
        let slot = self.find_slot_by_peer(peer)?;
        let seat = &mut self.seats[slot as usize];
        seat.peer = None;
        seat.occupied = false;
        seat.name.clear();
        info!("Peer {} left slot {}", peer, slot);
        Some(slot)
    }

    pub fn find_slot_by_peer(&self, peer: &PeerId) -> Option<SlotId> {
        self.seats
            .iter()
            .position(|seat| seat.peer.as_ref() == Some(peer))
            .map(|index| index as SlotId)
    }

    pub fn peer_of(&self, slot: SlotId) -> Option<&PeerId> {
        self.seats.get(slot as usize).and_then(|seat| seat.peer.as_ref())
    }

    /// Stores a display name. Empty names fall back to `P<n>`.
    pub fn set_name(&mut self, slot: SlotId, name: &str) -> Result<(), SessionError> {
        let seat = self
            .seats
            .get_mut(slot as usize)
            .ok_or(SessionError::InvalidSlot(slot))?;
        let trimmed = name.trim();
        seat.name = if trimmed.is_empty() {
            format!("P{}", slot + 1)
        } else {
            trimmed.to_string()
        };
        Ok(())
    }

    /// Marks a slot open or closed. Returns whether anything changed.
    ///
    /// The host slot cannot be closed; the request is accepted and ignored.
    /// Closing a slot never evicts its current occupant.
    pub fn set_open(&mut self, slot: SlotId, open: bool) -> Result<bool, SessionError> {
        if slot as usize >= MAX_SLOTS {
            return Err(SessionError::InvalidSlot(slot));
        }
        if slot == HOST_SLOT {
            return Ok(false);
        }

        let seat = &mut self.seats[slot as usize];
        let changed = seat.open != open;
        seat.open = open;
        Ok(changed)
    }

    pub fn is_open(&self, slot: SlotId) -> bool {
        self.seats.get(slot as usize).map_or(false, |seat| seat.open)
    }

    pub fn is_occupied(&self, slot: SlotId) -> bool {
        self.seats
            .get(slot as usize)
            .map_or(false, |seat| seat.occupied)
    }

    /// Occupied slots in ascending order, host first.
    pub fn occupied_slots(&self) -> Vec<SlotId> {
        (0..MAX_SLOTS)
            .filter(|&i| self.seats[i].occupied)
            .map(|i| i as SlotId)
            .collect()
    }

    /// Match participants: occupied slots in ascending order, capped at `limit`.
    pub fn participants(&self, limit: usize) -> Vec<SlotId> {
        self.occupied_slots().into_iter().take(limit).collect()
    }

    /// Every seated remote peer with its slot.
    pub fn remote_peers(&self) -> Vec<(SlotId, PeerId)> {
        self.seats
            .iter()
            .enumerate()
            .filter_map(|(i, seat)| seat.peer.clone().map(|peer| (i as SlotId, peer)))
            .collect()
    }

    pub fn presence(&self) -> Presence {
        let mut presence = Presence::default();
        for (i, seat) in self.seats.iter().enumerate() {
            presence.occupied[i] = seat.occupied;
            presence.names[i] = seat.name.clone();
            presence.open[i] = seat.open;
        }
        presence
    }
}
