//! Dual seeded random streams.
//!
//! `Simulation` must produce bit-identical sequences on every peer and is
//! only advanced inside a deterministic tick. `Presentation` feeds particles,
//! camera shake and other cosmetic randomness and may diverge freely.

use std::ops::{Deref, DerefMut};

/// XOR constant decorrelating the presentation stream from the simulation stream.
pub const PRESENTATION_SEED_MASK: u32 = 0x9E37_79B9;

/// Seed used before the host distributes one, and in place of zero.
pub const DEFAULT_SEED: u32 = 123_456_789;

/// A single 32-bit mulberry-style generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomStream {
    state: u32,
}

impl RandomStream {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_add(0x6D2B_79F5);
        let mut x = self.state;
        x = (x ^ (x >> 15)).wrapping_mul(x | 1);
        x ^= x.wrapping_add((x ^ (x >> 7)).wrapping_mul(x | 61));
        x ^ (x >> 14)
    }

    /// Uniform value in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        self.next_u32() as f64 / 4_294_967_296.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Simulation,
    Presentation,
}

/// Both per-session streams plus the active-stream selector.
#[derive(Debug, Clone)]
pub struct DeterministicRandom {
    seed: u32,
    sim: RandomStream,
    presentation: RandomStream,
    active: StreamKind,
}

impl DeterministicRandom {
    pub fn new(seed: u32) -> Self {
        let seed = if seed == 0 { 1 } else { seed };
        Self {
            seed,
            sim: RandomStream::new(seed),
            presentation: RandomStream::new(seed ^ PRESENTATION_SEED_MASK),
            active: StreamKind::Presentation,
        }
    }

    /// Reinitializes both streams from a new base seed.
    ///
    /// Must be called with the same seed on every peer before a lockstep
    /// match begins. The active selector is reset to `Presentation`.
    pub fn set_seed(&mut self, seed: u32) {
        *self = Self::new(seed);
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn active(&self) -> StreamKind {
        self.active
    }

    pub fn use_sim(&mut self) {
        self.active = StreamKind::Simulation;
    }

    pub fn use_presentation(&mut self) {
        self.active = StreamKind::Presentation;
    }

    /// Draws from the active stream, in `[0, 1)`.
    pub fn next(&mut self) -> f64 {
        match self.active {
            StreamKind::Simulation => self.sim.next_f64(),
            StreamKind::Presentation => self.presentation.next_f64(),
        }
    }

    /// Draws from the active stream, in `[min, max)`.
    pub fn range(&mut self, min: f64, max: f64) -> f64 {
        min + (max - min) * self.next()
    }

    /// Selects the simulation stream until the returned guard is dropped,
    /// then restores whichever stream was active before.
    pub fn sim_scope(&mut self) -> SimScope<'_> {
        let previous = self.active;
        self.use_sim();
        SimScope {
            random: self,
            previous,
        }
    }
}

impl Default for DeterministicRandom {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

/// Guard holding the simulation stream active for one deterministic tick.
pub struct SimScope<'a> {
    random: &'a mut DeterministicRandom,
    previous: StreamKind,
}

impl Deref for SimScope<'_> {
    type Target = DeterministicRandom;

    fn deref(&self) -> &Self::Target {
        self.random
    }
}

impl DerefMut for SimScope<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.random
    }
}

impl Drop for SimScope<'_> {
    fn drop(&mut self) {
        self.random.active = self.previous;
    }
}
