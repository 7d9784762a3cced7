//! Full-world snapshots: capture on the host, apply on clients
//!
//! Capture is always complete, never a delta. Apply merges each actor
//! through its `ReconciliationController` (applying a snapshot *is*
//! reconciliation), copies cell state on clients only, and lets each
//! reliable event through once.

use crate::events::EventLedger;
use crate::reconcile::{sync_authoritative, CorrectionPolicy, ReconciliationController};
use crate::world::{Actor, Cell, World};
use log::{debug, warn};
use shared::{
    ActorSnapshot, CellSnapshot, EffectEvent, NetConfig, SlotId, Snapshot, MAX_SLOTS,
};

pub struct SnapshotCodec {
    /// Slot predicted locally; its kinematics are never corrected.
    local_slot: Option<SlotId>,
    /// Hosts own the grid and never take cell state from a snapshot.
    is_host: bool,
    policy: CorrectionPolicy,
    controllers: [Option<ReconciliationController>; MAX_SLOTS],
    ledger: EventLedger,
}

impl SnapshotCodec {
    pub fn for_client(local_slot: SlotId, config: &NetConfig) -> Self {
        Self::new(Some(local_slot), false, config)
    }

    pub fn for_host(config: &NetConfig) -> Self {
        Self::new(None, true, config)
    }

    fn new(local_slot: Option<SlotId>, is_host: bool, config: &NetConfig) -> Self {
        Self {
            local_slot,
            is_host,
            policy: CorrectionPolicy::from_config(config),
            controllers: Default::default(),
            ledger: EventLedger::new(config.seen_event_cap),
        }
    }

    pub fn capture(world: &World, time_ms: u64) -> Snapshot {
        let mut actors: [Option<ActorSnapshot>; MAX_SLOTS] = Default::default();
        for (entry, actor) in actors.iter_mut().zip(world.actors.iter()) {
            *entry = actor.as_ref().map(|a| ActorSnapshot {
                position: a.position,
                velocity: a.velocity,
                state: a.state,
                state_timer: a.state_timer,
                invuln_timer: a.invuln_timer,
                lives: a.lives,
                dashes: a.dashes,
                kills: a.kills,
            });
        }

        let cells = world
            .grid
            .cells()
            .iter()
            .map(|c| CellSnapshot {
                state: c.state,
                timer: c.timer,
                pending_timer: c.pending_timer,
                owner: c.owner,
                color: c.color,
            })
            .collect();

        Snapshot {
            time_ms,
            actors,
            cells,
            events: world.events.iter().cloned().collect(),
        }
    }

    /// Merges `snapshot` into `world`. Returns events not applied before,
    /// in snapshot order.
    pub fn apply(&mut self, world: &mut World, snapshot: &Snapshot) -> Vec<EffectEvent> {
        for slot in 0..MAX_SLOTS {
            self.apply_actor(world, slot as SlotId, snapshot.actors[slot].as_ref());
        }

        if !self.is_host {
            self.apply_cells(world, &snapshot.cells);
        }

        snapshot
            .events
            .iter()
            .filter(|event| self.ledger.observe(event.id))
            .cloned()
            .collect()
    }

    fn apply_actor(&mut self, world: &mut World, slot: SlotId, incoming: Option<&ActorSnapshot>) {
        let index = slot as usize;
        let Some(incoming) = incoming else {
            if world.actors[index].take().is_some() {
                debug!("Slot {} left the snapshot", slot);
            }
            self.controllers[index] = None;
            return;
        };

        let actor = world.actors[index].get_or_insert_with(|| {
            debug!("Slot {} appeared in the snapshot", slot);
            let mut actor = Actor::spawn(slot);
            actor.position = incoming.position;
            actor.velocity = incoming.velocity;
            actor.state = incoming.state;
            actor.state_timer = incoming.state_timer;
            actor
        });

        if self.is_host || Some(slot) == self.local_slot {
            sync_authoritative(actor, incoming);
            return;
        }

        let policy = self.policy;
        self.controllers[index]
            .get_or_insert_with(|| ReconciliationController::new(slot, policy))
            .on_snapshot(actor, incoming);
    }

    fn apply_cells(&mut self, world: &mut World, cells: &[CellSnapshot]) {
        let local = world.grid.cells_mut();
        if cells.len() != local.len() {
            warn!(
                "Snapshot grid has {} cells, expected {}; ignoring cells",
                cells.len(),
                local.len()
            );
            return;
        }
        for (cell, incoming) in local.iter_mut().zip(cells) {
            *cell = Cell {
                state: incoming.state,
                timer: incoming.timer,
                pending_timer: incoming.pending_timer,
                owner: incoming.owner,
                color: incoming.color,
            };
        }
    }

    pub fn controller_mut(&mut self, slot: SlotId) -> Option<&mut ReconciliationController> {
        self.controllers
            .get_mut(slot as usize)
            .and_then(Option::as_mut)
    }

    pub fn ledger(&self) -> &EventLedger {
        &self.ledger
    }

    /// Controller for a remote slot, created on first use.
    ///
    /// Returns `None` for the local slot and for out-of-range slots.
    pub fn remote_controller(&mut self, slot: SlotId) -> Option<&mut ReconciliationController> {
        if Some(slot) == self.local_slot || slot as usize >= MAX_SLOTS {
            return None;
        }
        let policy = self.policy;
        let controller = self.controllers[slot as usize]
            .get_or_insert_with(|| ReconciliationController::new(slot, policy));
        Some(controller)
    }
}
