use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which correction philosophy a match runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SyncMode {
    /// Every peer runs the identical simulation from identical inputs.
    #[default]
    Lockstep,
    /// The host simulates; clients predict their own actor and blend the rest.
    HostAuthoritative,
}

/// Session-wide tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetConfig {
    pub mode: SyncMode,
    /// Frames the local schedule leads real time by.
    pub input_delay: u32,
    /// Fixed simulation step in seconds.
    pub fixed_dt: f32,
    pub snapshot_interval: Duration,
    /// Beyond this distance a replica teleports to the authoritative position.
    pub snap_dist: f32,
    /// Below this distance no correction is applied.
    pub drift_dist: f32,
    /// Exponential blend rate; the per-update factor is `min(1, blend_rate * dt)`.
    pub blend_rate: f32,
    /// Real slots taking part in a lockstep match, host included.
    pub max_lockstep_participants: usize,
    /// Delay between sending a rejection and closing the connection.
    pub rejection_grace: Duration,
    pub connect_timeout: Duration,
    /// Consecutive no-progress ticks before the stall hook fires.
    pub stall_threshold_ticks: u32,
    /// Reliable event ids remembered for deduplication.
    pub seen_event_cap: usize,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            mode: SyncMode::Lockstep,
            input_delay: 2,
            fixed_dt: 1.0 / 60.0,
            snapshot_interval: Duration::from_millis(50),
            snap_dist: 1.5,
            drift_dist: 0.02,
            blend_rate: 18.0,
            max_lockstep_participants: 2,
            rejection_grace: Duration::from_millis(500),
            connect_timeout: Duration::from_secs(10),
            stall_threshold_ticks: 120,
            seen_event_cap: 256,
        }
    }
}
