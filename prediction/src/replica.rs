use crate::reconcile::Correction;
use crate::rules::{ArenaRules, Simulation};
use crate::snapshot::SnapshotCodec;
use crate::world::World;
use log::debug;
use shared::{
    DeterministicRandom, EffectEvent, InputFrame, NetConfig, SlotId, Snapshot, MAX_SLOTS,
};

/// A client's copy of a host-authoritative match.
///
/// The local actor is predicted with the full rules every tick. Remote
/// actors are approximated from their forwarded input and pulled toward
/// the last snapshot. Cells tick locally and are overwritten whenever a
/// snapshot lands.
pub struct ClientReplica<S: Simulation = ArenaRules> {
    world: World,
    rules: S,
    codec: SnapshotCodec,
    local_slot: SlotId,
}

impl ClientReplica<ArenaRules> {
    pub fn new(local_slot: SlotId, participants: &[SlotId], config: &NetConfig) -> Self {
        Self::with_rules(local_slot, participants, config, ArenaRules::new())
    }
}

impl<S: Simulation> ClientReplica<S> {
    pub fn with_rules(
        local_slot: SlotId,
        participants: &[SlotId],
        config: &NetConfig,
        rules: S,
    ) -> Self {
        Self {
            world: World::new(participants),
            rules,
            codec: SnapshotCodec::for_client(local_slot, config),
            local_slot,
        }
    }

    /// Applies an authoritative snapshot and returns the effects to play.
    pub fn on_snapshot(&mut self, snapshot: &Snapshot) -> Vec<EffectEvent> {
        let fresh = self.codec.apply(&mut self.world, snapshot);
        if !fresh.is_empty() {
            debug!("Snapshot {} carried {} new events", snapshot.time_ms, fresh.len());
        }
        fresh
    }

    /// Advances the replica by one frame.
    ///
    /// `remote_input` returns the latest forwarded sample for a slot, if
    /// any. Returns the correction applied to each remote actor.
    pub fn tick<F>(
        &mut self,
        local_input: &InputFrame,
        remote_input: F,
        dt: f32,
        random: &mut DeterministicRandom,
    ) -> Vec<(SlotId, Correction)>
    where
        F: Fn(SlotId) -> Option<InputFrame>,
    {
        self.rules
            .step_actor(&mut self.world, self.local_slot, local_input, dt, random);

        let mut corrections = Vec::new();
        for slot in 0..MAX_SLOTS as SlotId {
            if slot == self.local_slot {
                continue;
            }
            let Some(actor) = self.world.actors[slot as usize].as_mut() else {
                continue;
            };
            let Some(controller) = self.codec.remote_controller(slot) else {
                continue;
            };
            let input = remote_input(slot).unwrap_or(*controller.last_input());
            corrections.push((slot, controller.update(actor, &input, dt)));
        }

        self.rules.step_cells(&mut self.world, dt);
        self.world.frame += 1;
        self.world.elapsed += dt;
        corrections
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn codec(&self) -> &SnapshotCodec {
        &self.codec
    }
}
