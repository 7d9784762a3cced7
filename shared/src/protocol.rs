//! Wire protocol: one `NetMessage` per datagram, encoded with bincode.

use bincode::{deserialize, serialize};
use serde::{Deserialize, Serialize};

use crate::config::SyncMode;
use crate::error::ProtocolError;
use crate::input::{InputBits, InputFrame};
use crate::slots::{LockstepIndex, SlotId, SlotMapping, MAX_SLOTS};
use crate::snapshot::Snapshot;

/// Largest datagram either side will emit or accept.
pub const MAX_DATAGRAM_SIZE: usize = 4096;

/// Complete lobby state. Always sent whole so a lost update self-heals.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Presence {
    pub occupied: [bool; MAX_SLOTS],
    pub names: [String; MAX_SLOTS],
    pub open: [bool; MAX_SLOTS],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchStart {
    /// Bumped by the host on every start and restart. Lockstep input from
    /// any other epoch belongs to a different match.
    pub epoch: u32,
    pub mode: SyncMode,
    pub seed: u32,
    pub participant_count: u8,
    pub real_slots: Vec<SlotId>,
    pub slot_mapping: SlotMapping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockstepInput {
    pub epoch: u32,
    pub frame: u32,
    pub index: LockstepIndex,
    pub bits: InputBits,
}

/// Raw per-frame sample used outside lockstep mode.
///
/// Clients leave `slot` at whatever they believe it is; the host overwrites
/// it with the sender's real slot before relaying. `seq` restarts with every
/// epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LegacyInput {
    pub epoch: u32,
    pub slot: SlotId,
    pub seq: u32,
    pub input: InputFrame,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NetMessage {
    /// client -> host: requested display name
    Join { name: String },
    /// host -> new client: assigned slot and current lobby
    Welcome { slot: SlotId, presence: Presence },
    /// host -> all
    Presence(Presence),
    /// host -> all
    StartMatch(MatchStart),
    /// host -> all
    RestartMatch(MatchStart),
    /// either direction
    LockstepInput(LockstepInput),
    /// client -> host, host -> other clients
    LegacyInput(LegacyInput),
    /// host -> clients
    Snapshot(Box<Snapshot>),
    /// client -> host
    RestartRequest,
    /// either direction; aborts pending connection attempts on receipt
    Error { reason: String },
}

impl NetMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            NetMessage::Join { .. } => "JOIN",
            NetMessage::Welcome { .. } => "WELCOME",
            NetMessage::Presence(_) => "PRESENCE",
            NetMessage::StartMatch(_) => "START_MATCH",
            NetMessage::RestartMatch(_) => "RESTART_MATCH",
            NetMessage::LockstepInput(_) => "LOCKSTEP_INPUT",
            NetMessage::LegacyInput(_) => "LEGACY_INPUT",
            NetMessage::Snapshot(_) => "SNAPSHOT",
            NetMessage::RestartRequest => "RESTART_REQUEST",
            NetMessage::Error { .. } => "ERROR",
        }
    }
}

pub fn encode(message: &NetMessage) -> Result<Vec<u8>, ProtocolError> {
    let bytes = serialize(message).map_err(ProtocolError::Encode)?;
    if bytes.len() > MAX_DATAGRAM_SIZE {
        return Err(ProtocolError::Oversize {
            size: bytes.len(),
            limit: MAX_DATAGRAM_SIZE,
        });
    }
    Ok(bytes)
}

pub fn decode(bytes: &[u8]) -> Result<NetMessage, ProtocolError> {
    if bytes.len() > MAX_DATAGRAM_SIZE {
        return Err(ProtocolError::Oversize {
            size: bytes.len(),
            limit: MAX_DATAGRAM_SIZE,
        });
    }
    deserialize(bytes).map_err(ProtocolError::Decode)
}
