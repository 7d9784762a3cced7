//! # Peer Session Library
//!
//! This library is the networking side of an arena match: it owns the
//! connection lifecycle of one peer, seats other peers into the four-slot
//! lobby, distributes the match seed, and keeps every participant's inputs
//! flowing frame by frame.
//!
//! ## Core Responsibilities
//!
//! ### Lobby Administration
//! The hosting peer always holds slot 0. Joining peers are seated into the
//! lowest open, unoccupied slot; everyone else receives an error and is
//! disconnected after a short grace period. Occupancy, names and openness
//! are broadcast as one complete presence record on every change, so a
//! single lost update heals itself with the next one.
//!
//! ### Lockstep Scheduling
//! Each peer schedules its own input `input_delay` frames ahead and sends it
//! to the host, which relays it to every client. A frame runs only once
//! every participant's input for it is known, so all peers feed identical
//! input vectors to the simulation in identical order.
//!
//! ### Host-Authoritative Relay
//! Outside lockstep the host forwards raw input samples between peers and
//! broadcasts full snapshots of its world.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! A `SessionManager` is never shared between threads. The transport queues
//! inbound events, and the owning loop drains them once per iteration
//! through [`SessionManager::update`]. No locks guard session state.
//!
//! ### Pluggable Transport
//! Everything below the session sits behind the [`Transport`] trait. The
//! crate ships an in-memory hub for tests and a tokio UDP adapter for the
//! `peer` binary.
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! Connection state machine, message dispatch, match start and restart.
//!
//! ### Lockstep Module (`lockstep`)
//! Per-frame input table, local scheduling and frame readiness.
//!
//! ### Slots Module (`slots`)
//! Host-side seat table and presence building.
//!
//! ### Transport and Network Modules (`transport`, `network`)
//! The transport contract, the in-memory hub and the UDP adapter.

pub mod error;
pub mod lockstep;
pub mod network;
pub mod session;
pub mod slots;
pub mod transport;

pub use error::SessionError;
pub use lockstep::{LockstepScheduler, RecordOutcome, StallReport};
pub use network::UdpTransport;
pub use session::{ConnectionState, Role, SessionEvent, SessionManager, SPECTATOR_INDEX};
pub use slots::SlotTable;
pub use transport::{Delivery, MemoryHub, MemoryTransport, PeerId, Transport, TransportEvent};
