//! At-most-once playback of reliable snapshot events.

use std::collections::{HashSet, VecDeque};

/// Bounded memory of event ids already applied.
///
/// Snapshots re-send recent events on every broadcast; the ledger lets each
/// one through exactly once. Once more than `cap` ids are remembered the
/// oldest are forgotten.
#[derive(Debug, Clone)]
pub struct EventLedger {
    cap: usize,
    order: VecDeque<u64>,
    seen: HashSet<u64>,
}

impl EventLedger {
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            order: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    /// Records `id` and returns true if it had not been seen before.
    pub fn observe(&mut self, id: u64) -> bool {
        if !self.seen.insert(id) {
            return false;
        }
        self.order.push_back(id);
        while self.order.len() > self.cap {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    pub fn contains(&self, id: u64) -> bool {
        self.seen.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }
}
