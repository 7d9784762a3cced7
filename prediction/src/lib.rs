//! # Arena Simulation Library
//!
//! This library holds everything that turns inputs into an arena world: the
//! deterministic rules every peer runs, the world model they run on, and the
//! client-side machinery that keeps a replica close to the host when the
//! match is played host-authoritatively.
//!
//! ## Architecture Overview
//!
//! The same rules drive both sync modes. What changes is who runs them for
//! which actor:
//!
//! ### Lockstep
//! Every peer advances the full world from the same per-frame input vector
//! and the same seeded simulation stream. Nothing but inputs crosses the
//! wire, so the rules must be bit-for-bit deterministic: no hash-ordered
//! iteration, no trigonometry, no wall-clock reads, and randomness only from
//! the simulation stream handed in by the caller.
//!
//! ### Host-Authoritative
//! The host runs the rules for everyone and periodically captures a full
//! snapshot. A client predicts its own actor with the full rules, fakes the
//! look of remote actors from their forwarded input, and pulls their
//! kinematics toward each snapshot with distance-based smoothing.
//!
//! ## Module Organization
//!
//! ### World Module (`world`)
//! Actors, the cell grid and the recent-effect queue, plus the canonical
//! byte form used for divergence checks.
//!
//! ### Rules Module (`rules`)
//! The `Simulation` trait and `ArenaRules`, its one implementation:
//! - Walking, dashing and hopping
//! - Charged attacks, cell smashing and shockwaves
//! - Stuns, falls, deaths and respawns
//! - The cell lifecycle from stable to reformed
//!
//! ### Reconcile Module (`reconcile`)
//! Per-remote-actor correction toward authoritative targets.
//!
//! ### Snapshot Module (`snapshot`)
//! Full-world capture on the host and merge on clients.
//!
//! ### Events Module (`events`)
//! Bounded at-most-once ledger for reliable effect events.
//!
//! ### Replica Module (`replica`)
//! A client's predicted copy of a host-authoritative match.
//!
//! ### Input and Timing Modules (`input`, `timing`)
//! Sequenced local input sampling and the host's snapshot cadence.
//!
//! ## Usage Example
//!
//! ```rust
//! use prediction::{ArenaRules, Simulation, World};
//! use shared::{DeterministicRandom, InputFrame, SlotId};
//!
//! let mut world = World::new(&[0, 1]);
//! let mut rules = ArenaRules::new();
//! let mut random = DeterministicRandom::new(42);
//! random.use_sim();
//!
//! let inputs: [(SlotId, InputFrame); 2] = [
//!     (0, InputFrame::new(1.0, 0.0)),
//!     (1, InputFrame::default()),
//! ];
//! rules.advance(&mut world, &inputs, 1.0 / 60.0, &mut random);
//! assert_eq!(world.frame, 1);
//! ```

pub mod events;
pub mod input;
pub mod reconcile;
pub mod replica;
pub mod rules;
pub mod snapshot;
pub mod timing;
pub mod world;

pub use events::EventLedger;
pub use input::InputSampler;
pub use reconcile::{Correction, CorrectionPolicy, ReconciliationController};
pub use replica::ClientReplica;
pub use rules::{lockstep_inputs, ArenaRules, Simulation};
pub use snapshot::SnapshotCodec;
pub use timing::SnapshotTimer;
pub use world::{Actor, Cell, Grid, World};
