//! Deterministic arena rules
//!
//! `Simulation` is the seam between the networking layers and game logic: a
//! fixed step driven purely by its arguments plus the simulation random
//! stream. `ArenaRules` is a compact reference implementation covering
//! movement, dashes, hops, cell-cracking attacks and falling.
//!
//! Everything that must agree across lockstep peers is computed with plain
//! f32 arithmetic in a fixed order; no trigonometry, no hash-ordered
//! iteration.

use crate::world::{spawn_position, Actor, Grid, World, MAX_DASHES};
use log::debug;
use shared::{
    input, Action, ActorState, CellState, ControllerState, DeterministicRandom, EffectKind,
    InputBits, InputFrame, SlotId, SlotMapping, Vec3, MAX_SLOTS,
};

pub const WALK_SPEED: f32 = 4.2;
pub const DASH_SPEED: f32 = 12.0;
pub const DASH_TIME: f32 = 8.0 / 60.0;
pub const DASH_RECHARGE_TIME: f32 = 1.5;
pub const HOP_TIME: f32 = 22.0 / 60.0;
pub const HOP_HEIGHT: f32 = 0.8;
/// Attack held at least this long releases a charged shockwave.
pub const CHARGE_MIN: f32 = 10.0 / 60.0;
pub const ATTACK_RECOVERY: f32 = 16.0 / 60.0;
pub const SHOCKWAVE_RANGE: usize = 4;
pub const SHOCKWAVE_RADIUS: f32 = 0.6;
pub const STUN_TIME: f32 = 0.5;
pub const STUN_KNOCKBACK: f32 = 8.0;
pub const DASH_HIT_DIST: f32 = 0.8;
pub const DASH_HIT_FORCE: f32 = 5.0;
pub const FALL_SPEED: f32 = 15.0;
pub const DEATH_DEPTH: f32 = -5.0;
pub const RESPAWN_INVULN: f32 = 2.0;

pub const CRACK_DELAY_LIGHT: f32 = 0.1;
pub const CRACK_DELAY_SMASH: f32 = 0.05;
pub const FALLING_TO_MISSING: f32 = 0.8;
pub const MISSING_TO_REFORMING: f32 = 4.5;
pub const REFORMING_TO_STABLE: f32 = 0.4;

/// Magnitude above which input counts as walking.
pub const WALK_THRESHOLD: f32 = 0.15;
/// Axis magnitude above which input turns the actor.
pub const FACING_THRESHOLD: f32 = 0.05;

pub trait Simulation {
    /// Steps one actor from its input.
    fn step_actor(
        &mut self,
        world: &mut World,
        slot: SlotId,
        input: &InputFrame,
        dt: f32,
        random: &mut DeterministicRandom,
    );

    /// Advances cell timers and scheduled falls.
    fn step_cells(&mut self, world: &mut World, dt: f32);

    /// Resolves actor-vs-actor contacts after everyone moved.
    fn resolve_contacts(&mut self, world: &mut World);

    /// One full fixed step. `inputs` pairs each participating slot with its
    /// input for this frame.
    fn advance(
        &mut self,
        world: &mut World,
        inputs: &[(SlotId, InputFrame)],
        dt: f32,
        random: &mut DeterministicRandom,
    ) {
        for (slot, frame) in inputs {
            self.step_actor(world, *slot, frame, dt, random);
        }
        self.resolve_contacts(world);
        self.step_cells(world, dt);
        world.frame += 1;
        world.elapsed += dt;
    }
}

/// Decodes one lockstep frame into per-slot inputs using the match mapping.
pub fn lockstep_inputs(mapping: &SlotMapping, bits: &[InputBits]) -> Vec<(SlotId, InputFrame)> {
    bits.iter()
        .enumerate()
        .filter_map(|(index, &mask)| {
            mapping
                .slot_of(index as u8)
                .map(|slot| (slot, input::decode(mask)))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ArenaRules;

impl ArenaRules {
    pub fn new() -> Self {
        Self
    }

    fn locomotion(actor: &mut Actor, frame: &InputFrame) {
        actor.velocity = Vec3::new(frame.x * WALK_SPEED, 0.0, frame.y * WALK_SPEED);
        let next = if frame.magnitude() > WALK_THRESHOLD {
            ActorState::Walk
        } else {
            ActorState::Idle
        };
        if actor.state != next {
            actor.enter(next);
        }
    }

    fn face(actor: &mut Actor, frame: &InputFrame) {
        if frame.x.abs() > FACING_THRESHOLD || frame.y.abs() > FACING_THRESHOLD {
            let mag = frame.magnitude();
            actor.facing = Vec3::new(frame.x / mag, 0.0, frame.y / mag);
        }
    }

    fn start_fall(actor: &mut Actor) {
        actor.velocity = Vec3::ZERO;
        actor.enter(ActorState::Falling);
    }

    fn on_death(world: &mut World, slot: SlotId) {
        let Some(actor) = world.actor_mut(slot) else {
            return;
        };
        actor.lives = actor.lives.saturating_sub(1);
        let attacker = actor.last_attacker.take();
        let lives = actor.lives;

        if lives > 0 {
            actor.position = spawn_position(slot);
            actor.velocity = Vec3::ZERO;
            actor.dashes = MAX_DASHES;
            actor.invuln_timer = RESPAWN_INVULN;
            actor.enter(ActorState::Idle);
            let origin = actor.position;
            world.emit(EffectKind::Respawn, slot, origin);
            debug!("Slot {} respawned with {} lives", slot, lives);
        } else {
            actor.position = Vec3::new(0.0, -100.0, 0.0);
            actor.velocity = Vec3::ZERO;
            actor.enter(ActorState::Dead);
            debug!("Slot {} eliminated", slot);
        }

        if let Some(killer) = attacker.filter(|&k| k != slot) {
            if let Some(actor) = world.actor_mut(killer) {
                actor.kills += 1;
            }
        }
    }

    /// Cracks the cell one step ahead of the attacker.
    fn smash(world: &mut World, slot: SlotId, origin: Vec3, facing: Vec3) {
        let target = Vec3::new(origin.x + facing.x, 0.0, origin.z + facing.z);
        if let Some((x, z)) = Grid::coords_at(&target) {
            if let Some(cell) = world.grid.cell_mut(x, z) {
                cell.crack(slot, CRACK_DELAY_LIGHT);
            }
        }
        world.emit(EffectKind::CellSmash, slot, target);
    }

    /// Cracks a line of cells with staggered falls and stuns anyone caught.
    fn shockwave(
        world: &mut World,
        slot: SlotId,
        origin: Vec3,
        facing: Vec3,
        random: &mut DeterministicRandom,
    ) {
        world.emit(EffectKind::ChargedShockwave, slot, origin);

        let mut struck = Vec::new();
        for step in 1..=SHOCKWAVE_RANGE {
            let reach = step as f32;
            let point = Vec3::new(origin.x + facing.x * reach, 0.0, origin.z + facing.z * reach);
            let Some((x, z)) = Grid::coords_at(&point) else {
                break;
            };
            let delay = CRACK_DELAY_SMASH + random.range(0.0, 0.2) as f32 * reach;
            if let Some(cell) = world.grid.cell_mut(x, z) {
                cell.crack(slot, delay);
            }
            struck.push(point);
        }

        for other in 0..MAX_SLOTS as SlotId {
            if other == slot {
                continue;
            }
            let Some(target) = world.actor_mut(other) else {
                continue;
            };
            let hit = struck.iter().any(|point| {
                let flat = Vec3::new(target.position.x, 0.0, target.position.z);
                flat.distance(point) < SHOCKWAVE_RADIUS
            });
            if hit {
                Self::stun(target, slot, facing, STUN_KNOCKBACK);
            }
        }
    }

    fn stun(target: &mut Actor, attacker: SlotId, direction: Vec3, force: f32) {
        if target.invuln_timer > 0.0
            || matches!(
                target.state,
                ActorState::Stunned | ActorState::Dead | ActorState::Falling
            )
        {
            return;
        }
        target.velocity = Vec3::new(direction.x * force, 0.0, direction.z * force);
        target.last_attacker = Some(attacker);
        target.enter(ActorState::Stunned);
    }

    /// True when nothing walkable is under the actor.
    fn unsupported(world: &World, position: &Vec3) -> bool {
        world
            .grid
            .cell_at(position)
            .map_or(true, |cell| !cell.state.is_walkable())
    }
}

impl Simulation for ArenaRules {
    fn step_actor(
        &mut self,
        world: &mut World,
        slot: SlotId,
        frame: &InputFrame,
        dt: f32,
        random: &mut DeterministicRandom,
    ) {
        let frame = frame.quantized();
        let Some(actor) = world.actor_mut(slot) else {
            return;
        };
        let controls = ControllerState {
            previous: actor.held,
            current: frame,
        };
        actor.held = frame;
        actor.state_timer += dt;
        actor.invuln_timer = (actor.invuln_timer - dt).max(0.0);

        if actor.dashes < MAX_DASHES {
            actor.dash_recharge += dt;
            if actor.dash_recharge >= DASH_RECHARGE_TIME {
                actor.dash_recharge = 0.0;
                actor.dashes += 1;
            }
        }

        let mut attack: Option<bool> = None;
        match actor.state {
            ActorState::Dead => return,
            ActorState::Falling => {
                actor.position.y -= FALL_SPEED * dt;
                if actor.position.y < DEATH_DEPTH {
                    Self::on_death(world, slot);
                }
                return;
            }
            ActorState::Stunned => {
                actor.velocity.x *= 0.95;
                actor.velocity.z *= 0.95;
                if actor.state_timer >= STUN_TIME {
                    actor.velocity = Vec3::ZERO;
                    actor.enter(ActorState::Idle);
                }
            }
            ActorState::Dash => {
                if actor.state_timer >= DASH_TIME {
                    actor.velocity = Vec3::ZERO;
                    actor.enter(ActorState::Idle);
                }
            }
            ActorState::Hop => {
                Self::face(actor, &frame);
                actor.velocity = Vec3::new(frame.x * WALK_SPEED, 0.0, frame.y * WALK_SPEED);
                let progress = (actor.state_timer / HOP_TIME).min(1.0);
                actor.position.y = 4.0 * HOP_HEIGHT * progress * (1.0 - progress);
                if progress >= 1.0 {
                    actor.position.y = 0.0;
                    actor.enter(ActorState::Idle);
                }
            }
            ActorState::Charging => {
                actor.velocity = Vec3::ZERO;
                Self::face(actor, &frame);
                if !controls.is_pressed(Action::Attack) {
                    attack = Some(actor.state_timer >= CHARGE_MIN);
                    actor.enter(ActorState::Attack);
                }
            }
            ActorState::Attack => {
                actor.velocity = Vec3::ZERO;
                if actor.state_timer >= ATTACK_RECOVERY {
                    actor.enter(ActorState::Idle);
                }
            }
            ActorState::Idle | ActorState::Walk => {
                Self::face(actor, &frame);
                if controls.is_just_pressed(Action::Dash) && actor.dashes > 0 {
                    actor.dashes -= 1;
                    let dir = actor.facing;
                    actor.velocity = Vec3::new(dir.x * DASH_SPEED, 0.0, dir.z * DASH_SPEED);
                    actor.enter(ActorState::Dash);
                } else if controls.is_just_pressed(Action::Hop) {
                    actor.enter(ActorState::Hop);
                } else if controls.is_just_pressed(Action::Attack) {
                    actor.velocity = Vec3::ZERO;
                    actor.enter(ActorState::Charging);
                } else {
                    Self::locomotion(actor, &frame);
                }
            }
        }

        actor.position.x += actor.velocity.x * dt;
        actor.position.z += actor.velocity.z * dt;
        let position = actor.position;
        let facing = actor.facing;
        let airborne = actor.state == ActorState::Hop;

        match attack {
            Some(true) => Self::shockwave(world, slot, position, facing, random),
            Some(false) => Self::smash(world, slot, position, facing),
            None => {}
        }

        if !airborne && Self::unsupported(world, &position) {
            if let Some(actor) = world.actor_mut(slot) {
                Self::start_fall(actor);
            }
        }
    }

    fn step_cells(&mut self, world: &mut World, dt: f32) {
        for cell in world.grid.cells_mut() {
            cell.timer += dt;

            if let Some(pending) = cell.pending_timer {
                let remaining = pending - dt;
                if remaining <= 0.0 {
                    cell.pending_timer = None;
                    cell.set_state(CellState::Falling);
                } else {
                    cell.pending_timer = Some(remaining);
                }
            }

            match cell.state {
                CellState::Falling if cell.timer > FALLING_TO_MISSING => {
                    cell.set_state(CellState::Missing)
                }
                CellState::Missing if cell.timer > MISSING_TO_REFORMING => {
                    cell.set_state(CellState::Reforming)
                }
                CellState::Reforming if cell.timer >= REFORMING_TO_STABLE => {
                    cell.owner = None;
                    cell.color = None;
                    cell.set_state(CellState::Stable);
                }
                _ => {}
            }
        }
    }

    fn resolve_contacts(&mut self, world: &mut World) {
        for attacker in 0..MAX_SLOTS as SlotId {
            let Some((origin, facing)) = world
                .actor(attacker)
                .filter(|a| a.state == ActorState::Dash)
                .map(|a| (a.position, a.facing))
            else {
                continue;
            };

            for other in 0..MAX_SLOTS as SlotId {
                if other == attacker {
                    continue;
                }
                if let Some(target) = world.actor_mut(other) {
                    if target.position.distance(&origin) < DASH_HIT_DIST {
                        Self::stun(target, attacker, facing, DASH_HIT_FORCE);
                    }
                }
            }
        }

        // Anyone standing on a cell that dropped away this step goes down.
        for slot in 0..MAX_SLOTS as SlotId {
            let falls = world.actor(slot).map_or(false, |a| {
                matches!(
                    a.state,
                    ActorState::Idle
                        | ActorState::Walk
                        | ActorState::Charging
                        | ActorState::Attack
                        | ActorState::Stunned
                        | ActorState::Dash
                ) && Self::unsupported(world, &a.position)
            });
            if falls {
                if let Some(actor) = world.actor_mut(slot) {
                    Self::start_fall(actor);
                }
            }
        }
    }
}
