//! Simulated arena state: actors by slot, the cell grid and recent
//! one-shot effect events.
//!
//! Everything here is plain data with a fixed layout (arrays, not maps) so
//! that two worlds driven by the same inputs serialize to identical bytes.

use serde::{Deserialize, Serialize};
use shared::{
    ActorState, CellState, EffectEvent, EffectKind, InputFrame, SlotId, Vec3, CELL_SIZE,
    GRID_SIZE, MAX_SLOTS,
};
use std::collections::VecDeque;

pub const STARTING_LIVES: u32 = 5;
pub const MAX_DASHES: u32 = 3;

/// Events kept in the world so consecutive snapshots re-send them.
pub const RECENT_EVENT_CAP: usize = 16;

/// Spawn cell per slot, in grid coordinates.
pub const SPAWN_CELLS: [(usize, usize); MAX_SLOTS] = [(1, 1), (6, 6), (6, 1), (1, 6)];

/// Tint used for cells cracked by each slot.
pub const SLOT_COLORS: [u32; MAX_SLOTS] = [0x3FA7FF, 0xFF5A4F, 0x5BD16E, 0xF2C94C];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub slot: SlotId,
    pub position: Vec3,
    pub velocity: Vec3,
    /// Unit direction on the ground plane.
    pub facing: Vec3,
    pub state: ActorState,
    pub state_timer: f32,
    pub invuln_timer: f32,
    pub lives: u32,
    pub dashes: u32,
    pub kills: u32,
    pub dash_recharge: f32,
    /// Input seen on the previous step, for edge detection.
    pub held: InputFrame,
    pub last_attacker: Option<SlotId>,
}

impl Actor {
    pub fn spawn(slot: SlotId) -> Self {
        Self {
            slot,
            position: spawn_position(slot),
            velocity: Vec3::ZERO,
            facing: Vec3::new(0.0, 0.0, 1.0),
            state: ActorState::Idle,
            state_timer: 0.0,
            invuln_timer: 0.0,
            lives: STARTING_LIVES,
            dashes: MAX_DASHES,
            kills: 0,
            dash_recharge: 0.0,
            held: InputFrame::default(),
            last_attacker: None,
        }
    }

    /// Changes state and restarts the state timer.
    pub fn enter(&mut self, state: ActorState) {
        self.state = state;
        self.state_timer = 0.0;
    }

    pub fn is_alive(&self) -> bool {
        self.state != ActorState::Dead
    }
}

pub fn spawn_position(slot: SlotId) -> Vec3 {
    let (x, z) = SPAWN_CELLS[slot as usize % MAX_SLOTS];
    Vec3::new(x as f32 * CELL_SIZE, 0.0, z as f32 * CELL_SIZE)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub state: CellState,
    /// Seconds spent in the current state.
    pub timer: f32,
    pub pending_timer: Option<f32>,
    pub owner: Option<SlotId>,
    pub color: Option<u32>,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            state: CellState::Stable,
            timer: 0.0,
            pending_timer: None,
            owner: None,
            color: None,
        }
    }
}

impl Cell {
    pub fn set_state(&mut self, state: CellState) {
        if self.state != state {
            self.state = state;
            self.timer = 0.0;
        }
    }

    /// Schedules a fall after `delay` seconds. An earlier pending fall wins.
    pub fn trigger_fall(&mut self, delay: f32) {
        if matches!(
            self.state,
            CellState::Missing | CellState::Falling | CellState::Stone
        ) {
            return;
        }
        self.pending_timer = Some(match self.pending_timer {
            Some(pending) => pending.min(delay),
            None => delay,
        });
    }

    /// Marks the cell cracked by `owner` and schedules its fall.
    pub fn crack(&mut self, owner: SlotId, delay: f32) {
        if !matches!(self.state, CellState::Stable | CellState::Cracked) {
            return;
        }
        self.owner = Some(owner);
        self.color = Some(SLOT_COLORS[owner as usize % MAX_SLOTS]);
        self.set_state(CellState::Cracked);
        self.trigger_fall(delay);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    cells: Vec<Cell>,
}

impl Default for Grid {
    fn default() -> Self {
        Self {
            cells: vec![Cell::default(); GRID_SIZE * GRID_SIZE],
        }
    }
}

impl Grid {
    pub fn index(x: usize, z: usize) -> usize {
        z * GRID_SIZE + x
    }

    /// Grid coordinates of the cell under a world position, if any.
    ///
    /// Cell `(x, z)` is centred on `(x, z)` and spans half a cell each way.
    pub fn coords_at(position: &Vec3) -> Option<(usize, usize)> {
        let gx = (position.x / CELL_SIZE + 0.5).floor();
        let gz = (position.z / CELL_SIZE + 0.5).floor();
        let limit = GRID_SIZE as f32;
        if gx < 0.0 || gz < 0.0 || gx >= limit || gz >= limit {
            return None;
        }
        Some((gx as usize, gz as usize))
    }

    pub fn cell(&self, x: usize, z: usize) -> Option<&Cell> {
        if x >= GRID_SIZE || z >= GRID_SIZE {
            return None;
        }
        self.cells.get(Self::index(x, z))
    }

    pub fn cell_mut(&mut self, x: usize, z: usize) -> Option<&mut Cell> {
        if x >= GRID_SIZE || z >= GRID_SIZE {
            return None;
        }
        self.cells.get_mut(Self::index(x, z))
    }

    pub fn cell_at(&self, position: &Vec3) -> Option<&Cell> {
        Self::coords_at(position).and_then(|(x, z)| self.cell(x, z))
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct World {
    pub frame: u32,
    pub elapsed: f32,
    pub actors: [Option<Actor>; MAX_SLOTS],
    pub grid: Grid,
    pub events: VecDeque<EffectEvent>,
    pub next_event_id: u64,
}

impl World {
    /// Fresh arena with one actor per listed slot.
    pub fn new(slots: &[SlotId]) -> Self {
        let mut actors: [Option<Actor>; MAX_SLOTS] = Default::default();
        for &slot in slots {
            if let Some(entry) = actors.get_mut(slot as usize) {
                *entry = Some(Actor::spawn(slot));
            }
        }

        Self {
            frame: 0,
            elapsed: 0.0,
            actors,
            grid: Grid::default(),
            events: VecDeque::new(),
            next_event_id: 1,
        }
    }

    pub fn actor(&self, slot: SlotId) -> Option<&Actor> {
        self.actors.get(slot as usize).and_then(Option::as_ref)
    }

    pub fn actor_mut(&mut self, slot: SlotId) -> Option<&mut Actor> {
        self.actors.get_mut(slot as usize).and_then(Option::as_mut)
    }

    /// Records a one-shot effect and returns its id.
    pub fn emit(&mut self, kind: EffectKind, slot: SlotId, origin: Vec3) -> u64 {
        let id = self.next_event_id;
        self.next_event_id += 1;
        self.events.push_back(EffectEvent {
            id,
            kind,
            slot,
            origin,
        });
        while self.events.len() > RECENT_EVENT_CAP {
            self.events.pop_front();
        }
        id
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// FNV-1a over the serialized world, for cheap divergence logging.
    pub fn digest(&self) -> u64 {
        self.to_bytes().map(|bytes| fnv1a(&bytes)).unwrap_or(0)
    }
}

pub fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes.iter().fold(OFFSET, |hash, &byte| {
        (hash ^ byte as u64).wrapping_mul(PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_spawns_listed_slots() {
        let world = World::new(&[0, 1]);
        assert!(world.actor(0).is_some());
        assert!(world.actor(1).is_some());
        assert!(world.actor(2).is_none());
        assert_eq!(world.actor(1).unwrap().position, spawn_position(1));
        assert_eq!(world.grid.cells().len(), GRID_SIZE * GRID_SIZE);
    }

    #[test]
    fn test_coords_at_bounds() {
        assert_eq!(Grid::coords_at(&Vec3::new(0.0, 0.0, 0.0)), Some((0, 0)));
        assert_eq!(Grid::coords_at(&Vec3::new(0.49, 0.0, 7.4)), Some((0, 7)));
        assert_eq!(Grid::coords_at(&Vec3::new(0.5, 0.0, 0.0)), Some((1, 0)));
        assert_eq!(Grid::coords_at(&Vec3::new(-0.51, 0.0, 0.0)), None);
        assert_eq!(Grid::coords_at(&Vec3::new(7.6, 0.0, 0.0)), None);
    }

    #[test]
    fn test_crack_and_fall_scheduling() {
        let mut cell = Cell::default();
        cell.crack(1, 0.1);
        assert_eq!(cell.state, CellState::Cracked);
        assert_eq!(cell.owner, Some(1));
        assert_eq!(cell.color, Some(SLOT_COLORS[1]));
        assert_eq!(cell.pending_timer, Some(0.1));

        cell.trigger_fall(0.05);
        assert_eq!(cell.pending_timer, Some(0.05));
        cell.trigger_fall(0.5);
        assert_eq!(cell.pending_timer, Some(0.05));
    }

    #[test]
    fn test_stone_cells_never_fall() {
        let mut cell = Cell {
            state: CellState::Stone,
            ..Cell::default()
        };
        cell.crack(0, 0.1);
        assert_eq!(cell.state, CellState::Stone);
        assert_eq!(cell.pending_timer, None);
    }

    #[test]
    fn test_emit_assigns_ids_and_caps_history() {
        let mut world = World::new(&[0]);
        let first = world.emit(EffectKind::CellSmash, 0, Vec3::ZERO);
        let second = world.emit(EffectKind::CellSmash, 0, Vec3::ZERO);
        assert_eq!(second, first + 1);

        for _ in 0..RECENT_EVENT_CAP * 2 {
            world.emit(EffectKind::Respawn, 0, Vec3::ZERO);
        }
        assert_eq!(world.events.len(), RECENT_EVENT_CAP);
        assert_eq!(world.events.back().map(|e| e.id), Some(world.next_event_id - 1));
    }

    #[test]
    fn test_digest_tracks_content() {
        let a = World::new(&[0, 1]);
        let mut b = a.clone();
        assert_eq!(a.digest(), b.digest());

        b.actor_mut(1).unwrap().position.x += 0.001;
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn test_fnv1a_reference_values() {
        assert_eq!(fnv1a(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }
}
