use shared::{ProtocolError, SlotId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("operation requires the host role")]
    NotHost,

    #[error("operation requires the client role")]
    NotClient,

    #[error("Room Full / Slots Closed")]
    RoomFull,

    #[error("Need 1 opponent to start online match.")]
    NoOpponent,

    #[error("invalid slot {0}")]
    InvalidSlot(SlotId),

    #[error("no match is running")]
    NoMatch,

    #[error("session is closed")]
    Closed,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
