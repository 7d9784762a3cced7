pub mod config;
pub mod error;
pub mod input;
pub mod protocol;
pub mod random;
pub mod slots;
pub mod snapshot;

pub use config::{NetConfig, SyncMode};
pub use error::ProtocolError;
pub use input::{Action, ControllerState, InputBits, InputFrame};
pub use protocol::{LegacyInput, LockstepInput, MatchStart, NetMessage, Presence};
pub use random::{DeterministicRandom, StreamKind};
pub use slots::{LockstepIndex, SlotId, SlotMapping, HOST_SLOT, MAX_SLOTS};
pub use snapshot::{
    ActorSnapshot, ActorState, CellSnapshot, CellState, EffectEvent, EffectKind, Snapshot, Vec3,
};

/// Side length of the square arena grid, in cells.
pub const GRID_SIZE: usize = 8;

/// World units per grid cell.
pub const CELL_SIZE: f32 = 1.0;
