use serde::{Deserialize, Serialize};

use crate::slots::{SlotId, MAX_SLOTS};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Vec3) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        let dz = other.z - self.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Moves `factor` of the way toward `target`.
    pub fn lerp(&self, target: &Vec3, factor: f32) -> Vec3 {
        Vec3 {
            x: self.x + (target.x - self.x) * factor,
            y: self.y + (target.y - self.y) * factor,
            z: self.z + (target.z - self.z) * factor,
        }
    }
}

/// Discrete animation/gameplay state of an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ActorState {
    #[default]
    Idle,
    Walk,
    Dash,
    Hop,
    Charging,
    Attack,
    Stunned,
    Falling,
    Dead,
}

impl ActorState {
    /// States that always overwrite a replica on receipt, bypassing smoothing.
    pub fn is_critical(&self) -> bool {
        matches!(self, ActorState::Dead | ActorState::Stunned | ActorState::Falling)
    }

    pub fn is_locomotion(&self) -> bool {
        matches!(self, ActorState::Idle | ActorState::Walk)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CellState {
    #[default]
    Stable,
    Cracked,
    Falling,
    Missing,
    Reforming,
    Stone,
}

impl CellState {
    pub fn is_walkable(&self) -> bool {
        !matches!(self, CellState::Falling | CellState::Missing)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorSnapshot {
    pub position: Vec3,
    pub velocity: Vec3,
    pub state: ActorState,
    pub state_timer: f32,
    pub invuln_timer: f32,
    pub lives: u32,
    pub dashes: u32,
    pub kills: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellSnapshot {
    pub state: CellState,
    pub timer: f32,
    /// Seconds until a scheduled fall; `None` when no fall is pending.
    pub pending_timer: Option<f32>,
    pub owner: Option<SlotId>,
    pub color: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectKind {
    ChargedShockwave,
    CellSmash,
    Respawn,
}

/// One-shot effect that must play at most once on every replica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectEvent {
    pub id: u64,
    pub kind: EffectKind,
    pub slot: SlotId,
    pub origin: Vec3,
}

/// Full host-authoritative world description at one instant.
///
/// Always complete, never a delta: any single snapshot heals all drift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub time_ms: u64,
    pub actors: [Option<ActorSnapshot>; MAX_SLOTS],
    pub cells: Vec<CellSnapshot>,
    pub events: Vec<EffectEvent>,
}

impl Snapshot {
    pub fn empty(time_ms: u64) -> Self {
        Self {
            time_ms,
            actors: Default::default(),
            cells: Vec::new(),
            events: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_vec3_distance() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 0.0, 4.0);
        assert_approx_eq!(a.distance(&b), 5.0, 1e-6);
    }

    #[test]
    fn test_vec3_lerp() {
        let a = Vec3::new(0.0, 2.0, 0.0);
        let b = Vec3::new(10.0, 2.0, -4.0);
        let mid = a.lerp(&b, 0.25);
        assert_approx_eq!(mid.x, 2.5, 1e-6);
        assert_approx_eq!(mid.y, 2.0, 1e-6);
        assert_approx_eq!(mid.z, -1.0, 1e-6);
    }

    #[test]
    fn test_critical_states() {
        assert!(ActorState::Dead.is_critical());
        assert!(ActorState::Stunned.is_critical());
        assert!(ActorState::Falling.is_critical());
        assert!(!ActorState::Attack.is_critical());
        assert!(!ActorState::Walk.is_critical());
    }

    #[test]
    fn test_missing_cells_are_not_walkable() {
        assert!(CellState::Cracked.is_walkable());
        assert!(!CellState::Missing.is_walkable());
        assert!(!CellState::Falling.is_walkable());
    }
}
