//! Snapshot reconciliation for remote actors in host-authoritative play
//!
//! A client never runs full rules for actors it does not control. Between
//! snapshots it derives their look from the latest forwarded input sample
//! (facing, idle vs. walk, cosmetic timers), and each tick it pulls their
//! kinematics toward the last authoritative target:
//!
//! - distance above `snap_dist`: teleport, the gap is a discontinuity
//!   (loss, spawn, respawn) that smoothing would only make look worse;
//! - distance above `drift_dist`: blend by `min(1, blend_rate * dt)`, so
//!   correction speed does not depend on frame rate;
//! - otherwise leave it alone to avoid jitter from noise.
//!
//! Dead, stunned and falling states bypass all of this and are adopted the
//! moment a snapshot carries them.

use crate::world::Actor;
use log::debug;
use shared::{ActorSnapshot, ActorState, InputFrame, NetConfig, SlotId, Vec3};

/// Input magnitude separating idle from walk in the approximation.
pub const APPROX_WALK_THRESHOLD: f32 = 0.15;
/// Axis magnitude above which forwarded input turns the actor.
pub const APPROX_FACING_THRESHOLD: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectionPolicy {
    pub snap_dist: f32,
    pub drift_dist: f32,
    pub blend_rate: f32,
}

impl CorrectionPolicy {
    pub fn from_config(config: &NetConfig) -> Self {
        Self {
            snap_dist: config.snap_dist,
            drift_dist: config.drift_dist,
            blend_rate: config.blend_rate,
        }
    }

    pub fn classify(&self, distance: f32, dt: f32) -> Correction {
        if distance > self.snap_dist {
            Correction::Snap
        } else if distance > self.drift_dist {
            Correction::Blend((self.blend_rate * dt).min(1.0))
        } else {
            Correction::None
        }
    }
}

impl Default for CorrectionPolicy {
    fn default() -> Self {
        Self::from_config(&NetConfig::default())
    }
}

/// What one reconciliation pass did to an actor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correction {
    None,
    Blend(f32),
    Snap,
}

/// Authoritative kinematics from the latest snapshot. Replaced wholesale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconciliationTarget {
    pub position: Vec3,
    pub velocity: Vec3,
}

/// Drives one remote actor on a client.
#[derive(Debug, Clone)]
pub struct ReconciliationController {
    slot: SlotId,
    policy: CorrectionPolicy,
    target: Option<ReconciliationTarget>,
    input: InputFrame,
}

impl ReconciliationController {
    pub fn new(slot: SlotId, policy: CorrectionPolicy) -> Self {
        Self {
            slot,
            policy,
            target: None,
            input: InputFrame::default(),
        }
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn target(&self) -> Option<&ReconciliationTarget> {
        self.target.as_ref()
    }

    /// Takes in the authoritative fields for this actor.
    ///
    /// Counters and critical states land immediately; position and velocity
    /// become the new correction target.
    pub fn on_snapshot(&mut self, actor: &mut Actor, snapshot: &ActorSnapshot) {
        self.target = Some(ReconciliationTarget {
            position: snapshot.position,
            velocity: snapshot.velocity,
        });
        sync_authoritative(actor, snapshot);

        // A locally held critical state is released once the host moved on,
        // e.g. after a respawn.
        if actor.state.is_critical() && !snapshot.state.is_critical() {
            actor.state = snapshot.state;
            actor.state_timer = snapshot.state_timer;
        }
        actor.invuln_timer = snapshot.invuln_timer;
    }

    /// Cosmetic update from the latest forwarded input sample.
    pub fn approximate(&mut self, actor: &mut Actor, input: &InputFrame, dt: f32) {
        self.input = *input;
        let (x, y) = (input.x, input.y);

        if x.abs() > APPROX_FACING_THRESHOLD || y.abs() > APPROX_FACING_THRESHOLD {
            let mag = input.magnitude();
            actor.facing = Vec3::new(x / mag, 0.0, y / mag);
        }

        if actor.state.is_locomotion() {
            actor.state = if input.magnitude() > APPROX_WALK_THRESHOLD {
                ActorState::Walk
            } else {
                ActorState::Idle
            };
        }

        actor.state_timer += dt;
        if actor.invuln_timer > 0.0 {
            actor.invuln_timer = (actor.invuln_timer - dt).max(0.0);
        }
    }

    /// Pulls position and velocity toward the current target.
    pub fn correct(&self, actor: &mut Actor, dt: f32) -> Correction {
        let Some(target) = self.target else {
            return Correction::None;
        };
        let distance = actor.position.distance(&target.position);
        let correction = self.policy.classify(distance, dt);

        match correction {
            Correction::Snap => {
                debug!("Slot {} snapped {:.2} units", self.slot, distance);
                actor.position = target.position;
                actor.velocity = target.velocity;
            }
            Correction::Blend(factor) => {
                actor.position = actor.position.lerp(&target.position, factor);
                actor.velocity = actor.velocity.lerp(&target.velocity, factor);
            }
            Correction::None => {}
        }
        correction
    }

    /// One client tick for this actor: approximate, then correct.
    pub fn update(&mut self, actor: &mut Actor, input: &InputFrame, dt: f32) -> Correction {
        self.approximate(actor, input, dt);
        self.correct(actor, dt)
    }

    pub fn last_input(&self) -> &InputFrame {
        &self.input
    }
}

/// Overwrites counters, and critical state tags with their timer.
///
/// Applies to every actor, the locally controlled one included.
pub fn sync_authoritative(actor: &mut Actor, snapshot: &ActorSnapshot) {
    actor.lives = snapshot.lives;
    actor.kills = snapshot.kills;
    actor.dashes = snapshot.dashes;

    if snapshot.state.is_critical() && actor.state != snapshot.state {
        actor.state = snapshot.state;
        actor.state_timer = snapshot.state_timer;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use proptest::prelude::*;

    const DT: f32 = 1.0 / 60.0;

    fn snapshot_at(position: Vec3) -> ActorSnapshot {
        ActorSnapshot {
            position,
            velocity: Vec3::new(1.0, 0.0, 0.0),
            state: ActorState::Walk,
            state_timer: 0.3,
            invuln_timer: 0.0,
            lives: 4,
            dashes: 2,
            kills: 1,
        }
    }

    fn corrected(delta: f32) -> (Actor, Correction) {
        let mut actor = Actor::spawn(1);
        actor.position = Vec3::ZERO;
        actor.velocity = Vec3::ZERO;
        let mut controller = ReconciliationController::new(1, CorrectionPolicy::default());
        controller.on_snapshot(&mut actor, &snapshot_at(Vec3::new(delta, 0.0, 0.0)));
        let correction = controller.correct(&mut actor, DT);
        (actor, correction)
    }

    #[test]
    fn test_sub_drift_delta_is_ignored() {
        let (actor, correction) = corrected(0.01);
        assert_eq!(correction, Correction::None);
        assert_eq!(actor.position, Vec3::ZERO);
        assert_eq!(actor.velocity, Vec3::ZERO);
    }

    #[test]
    fn test_mid_delta_blends_partially() {
        let (actor, correction) = corrected(0.5);
        match correction {
            Correction::Blend(factor) => assert_approx_eq!(factor, 18.0 * DT),
            other => panic!("Wrong correction type: {:?}", other),
        }
        assert!(actor.position.x > 0.0 && actor.position.x < 0.5);
        assert_approx_eq!(actor.position.x, 0.5 * 18.0 * DT);
    }

    #[test]
    fn test_large_delta_teleports() {
        let (actor, correction) = corrected(3.0);
        assert_eq!(correction, Correction::Snap);
        assert_eq!(actor.position, Vec3::new(3.0, 0.0, 0.0));
        assert_eq!(actor.velocity, Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_blend_factor_caps_at_one() {
        let policy = CorrectionPolicy::default();
        assert_eq!(policy.classify(1.0, 0.5), Correction::Blend(1.0));
    }

    #[test]
    fn test_counters_sync_immediately() {
        let (actor, _) = corrected(0.0);
        assert_eq!(actor.lives, 4);
        assert_eq!(actor.dashes, 2);
        assert_eq!(actor.kills, 1);
    }

    #[test]
    fn test_critical_state_overrides() {
        let mut actor = Actor::spawn(1);
        actor.state = ActorState::Walk;
        let mut controller = ReconciliationController::new(1, CorrectionPolicy::default());

        let mut snapshot = snapshot_at(actor.position);
        snapshot.state = ActorState::Stunned;
        snapshot.state_timer = 0.2;
        controller.on_snapshot(&mut actor, &snapshot);

        assert_eq!(actor.state, ActorState::Stunned);
        assert_approx_eq!(actor.state_timer, 0.2);
    }

    #[test]
    fn test_transient_state_not_overridden() {
        let mut actor = Actor::spawn(1);
        actor.enter(ActorState::Attack);
        let mut controller = ReconciliationController::new(1, CorrectionPolicy::default());
        let snapshot = snapshot_at(actor.position);
        controller.on_snapshot(&mut actor, &snapshot);
        assert_eq!(actor.state, ActorState::Attack);
    }

    #[test]
    fn test_approximation_drives_look() {
        let mut actor = Actor::spawn(1);
        actor.invuln_timer = 1.0;
        let mut controller = ReconciliationController::new(1, CorrectionPolicy::default());

        controller.approximate(&mut actor, &InputFrame::new(0.0, -1.0), DT);
        assert_eq!(actor.state, ActorState::Walk);
        assert_approx_eq!(actor.facing.z, -1.0);
        assert_approx_eq!(actor.invuln_timer, 1.0 - DT);

        controller.approximate(&mut actor, &InputFrame::new(0.1, 0.0), DT);
        assert_eq!(actor.state, ActorState::Idle);
        // Still above the facing threshold.
        assert_approx_eq!(actor.facing.x, 1.0);
    }

    #[test]
    fn test_approximation_keeps_action_states() {
        let mut actor = Actor::spawn(1);
        actor.enter(ActorState::Dash);
        let mut controller = ReconciliationController::new(1, CorrectionPolicy::default());
        controller.approximate(&mut actor, &InputFrame::new(1.0, 0.0), DT);
        assert_eq!(actor.state, ActorState::Dash);
        assert_approx_eq!(actor.state_timer, DT);
    }

    proptest! {
        #[test]
        fn prop_classification_bands(distance in 0.0f32..10.0, dt in 0.001f32..0.1) {
            let policy = CorrectionPolicy::default();
            match policy.classify(distance, dt) {
                Correction::Snap => prop_assert!(distance > policy.snap_dist),
                Correction::Blend(factor) => {
                    prop_assert!(distance > policy.drift_dist && distance <= policy.snap_dist);
                    prop_assert!(factor > 0.0 && factor <= 1.0);
                }
                Correction::None => prop_assert!(distance <= policy.drift_dist),
            }
        }
    }
}
