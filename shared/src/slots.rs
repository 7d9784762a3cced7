use serde::{Deserialize, Serialize};

/// Number of lobby seats. Seat 0 always belongs to the host.
pub const MAX_SLOTS: usize = 4;
pub const HOST_SLOT: SlotId = 0;

/// Stable lobby seat (0..MAX_SLOTS).
pub type SlotId = u8;

/// Dense 0..participant_count renumbering of the seats taking part in a match.
pub type LockstepIndex = u8;

/// Bidirectional map between real lobby slots and dense lockstep indices.
///
/// Built once by the host at match start and broadcast verbatim. Position `i`
/// in `real_slots` is the real slot that owns lockstep index `i`, so indices
/// are contiguous from zero by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotMapping {
    real_slots: Vec<SlotId>,
}

impl SlotMapping {
    /// Builds a mapping from participating real slots, in the order given.
    ///
    /// Duplicates and out-of-range slots are dropped so the resulting
    /// indices stay dense.
    pub fn from_real_slots(slots: &[SlotId]) -> Self {
        let mut real_slots: Vec<SlotId> = Vec::with_capacity(slots.len());
        for &slot in slots {
            if (slot as usize) < MAX_SLOTS && !real_slots.contains(&slot) {
                real_slots.push(slot);
            }
        }
        Self { real_slots }
    }

    pub fn participant_count(&self) -> usize {
        self.real_slots.len()
    }

    pub fn real_slots(&self) -> &[SlotId] {
        &self.real_slots
    }

    pub fn index_of(&self, slot: SlotId) -> Option<LockstepIndex> {
        self.real_slots
            .iter()
            .position(|&s| s == slot)
            .map(|i| i as LockstepIndex)
    }

    pub fn slot_of(&self, index: LockstepIndex) -> Option<SlotId> {
        self.real_slots.get(index as usize).copied()
    }

    pub fn contains(&self, slot: SlotId) -> bool {
        self.real_slots.contains(&slot)
    }
}

impl Default for SlotMapping {
    fn default() -> Self {
        Self::from_real_slots(&[HOST_SLOT, 1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_is_dense() {
        let mapping = SlotMapping::from_real_slots(&[0, 3]);
        assert_eq!(mapping.participant_count(), 2);
        assert_eq!(mapping.index_of(0), Some(0));
        assert_eq!(mapping.index_of(3), Some(1));
        assert_eq!(mapping.index_of(1), None);
        assert_eq!(mapping.slot_of(1), Some(3));
        assert_eq!(mapping.slot_of(2), None);
    }

    #[test]
    fn test_mapping_drops_duplicates_and_out_of_range() {
        let mapping = SlotMapping::from_real_slots(&[0, 2, 2, 9, 1]);
        assert_eq!(mapping.real_slots(), &[0, 2, 1]);
        assert_eq!(mapping.index_of(1), Some(2));
    }

    #[test]
    fn test_default_mapping_is_host_and_first_client() {
        let mapping = SlotMapping::default();
        assert_eq!(mapping.real_slots(), &[HOST_SLOT, 1]);
    }
}
