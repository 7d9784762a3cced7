//! Peer session: connection lifecycle, lobby administration and message
//! dispatch for one local instance.
//!
//! A `SessionManager` is driven from a single loop. Each iteration calls
//! [`SessionManager::update`], which drains the transport queue, dispatches
//! every message and fires expired timers, then the caller drains
//! [`SessionEvent`]s and, in lockstep mode, calls
//! [`SessionManager::tick_lockstep`] to run every frame that is ready.

use crate::error::SessionError;
use crate::lockstep::{LockstepScheduler, RecordOutcome, StallReport};
use crate::slots::SlotTable;
use crate::transport::{PeerId, Transport, TransportEvent};
use log::{debug, error, info, warn};
use shared::protocol::{self, LegacyInput, LockstepInput, MatchStart, NetMessage, Presence};
use shared::{
    DeterministicRandom, InputBits, InputFrame, LockstepIndex, NetConfig, ProtocolError,
    SlotId, SlotMapping, Snapshot, SyncMode, HOST_SLOT, MAX_SLOTS,
};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Instant;

/// Lockstep index used by peers that watch a match without playing in it.
pub const SPECTATOR_INDEX: LockstepIndex = LockstepIndex::MAX;

/// Lockstep input for a start this client has not seen yet is held until
/// the start arrives. Oldest entries go first past this many.
const MAX_EARLY_INPUTS: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    /// Host registered and accepting peers.
    Active,
    /// Client registered and connecting to the host.
    AwaitingWelcome,
    Joined,
    InMatch,
    /// Terminal.
    Closed,
}

/// Notifications for the embedding application, drained once per loop.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Host registered; `id` is what clients connect to.
    Hosting { id: PeerId },
    /// Client seated by the host.
    Joined { slot: SlotId },
    Presence(Presence),
    MatchStarted(MatchStart),
    MatchRestarted(MatchStart),
    Snapshot(Box<Snapshot>),
    Stalled(StallReport),
    Error(String),
    Disconnected,
}

pub struct SessionManager<T: Transport> {
    transport: T,
    config: NetConfig,
    role: Role,
    state: ConnectionState,
    name: String,
    local_id: Option<PeerId>,
    /// Client only: who we are joining.
    host_id: Option<PeerId>,
    slot: Option<SlotId>,
    /// Host only.
    slots: Option<SlotTable>,
    presence: Presence,
    mode: SyncMode,
    last_start: Option<MatchStart>,
    scheduler: Option<LockstepScheduler>,
    random: DeterministicRandom,
    stalls: Rc<RefCell<Vec<StallReport>>>,
    remote_inputs: [InputFrame; MAX_SLOTS],
    remote_seq: [u32; MAX_SLOTS],
    early_inputs: VecDeque<LockstepInput>,
    pending_closes: Vec<(PeerId, Instant)>,
    connect_deadline: Option<Instant>,
    events: VecDeque<SessionEvent>,
}

impl<T: Transport> SessionManager<T> {
    /// Starts hosting. The session becomes `Active` once the transport
    /// reports registration.
    pub fn host(transport: T, name: &str, config: NetConfig, now: Instant) -> Self {
        info!("Hosting as {}", name);
        Self::with_role(transport, Role::Host, None, name, config, now)
    }

    /// Starts joining `host_id`. The session connects once registered.
    pub fn join(
        transport: T,
        host_id: PeerId,
        name: &str,
        config: NetConfig,
        now: Instant,
    ) -> Self {
        info!("Joining {} as {}", host_id, name);
        Self::with_role(transport, Role::Client, Some(host_id), name, config, now)
    }

    fn with_role(
        transport: T,
        role: Role,
        host_id: Option<PeerId>,
        name: &str,
        config: NetConfig,
        now: Instant,
    ) -> Self {
        let deadline = now + config.connect_timeout;
        let mode = config.mode;
        Self {
            transport,
            config,
            role,
            state: ConnectionState::Connecting,
            name: name.to_string(),
            local_id: None,
            host_id,
            slot: None,
            slots: None,
            presence: Presence::default(),
            mode,
            last_start: None,
            scheduler: None,
            random: DeterministicRandom::default(),
            stalls: Rc::new(RefCell::new(Vec::new())),
            remote_inputs: [InputFrame::default(); MAX_SLOTS],
            remote_seq: [0; MAX_SLOTS],
            early_inputs: VecDeque::new(),
            pending_closes: Vec::new(),
            connect_deadline: Some(deadline),
            events: VecDeque::new(),
        }
    }

    /// Drains the transport, dispatches every message and fires timers.
    pub fn update(&mut self, now: Instant) {
        if self.state == ConnectionState::Closed {
            return;
        }

        for event in self.transport.poll_events() {
            self.handle_transport_event(event, now);
            if self.state == ConnectionState::Closed {
                return;
            }
        }

        self.flush_pending_closes(now);

        if let Some(deadline) = self.connect_deadline {
            if now >= deadline {
                warn!("Connection attempt timed out");
                self.events
                    .push_back(SessionEvent::Error("connection timeout".to_string()));
                self.teardown();
            }
        }
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain(..).collect()
    }

    /// Leaves the session. Releases every channel and drops queued events.
    pub fn close(&mut self) {
        self.teardown();
        self.events.clear();
    }

    fn teardown(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        info!("Closing session");
        self.transport.shutdown();
        self.state = ConnectionState::Closed;
        self.scheduler = None;
        self.pending_closes.clear();
        self.connect_deadline = None;
        self.stalls.borrow_mut().clear();
    }

    fn flush_pending_closes(&mut self, now: Instant) {
        let (due, waiting): (Vec<_>, Vec<_>) = self
            .pending_closes
            .drain(..)
            .partition(|(_, at)| now >= *at);
        self.pending_closes = waiting;
        for (peer, _) in due {
            debug!("Closing rejected peer {}", peer);
            self.transport.close(&peer);
        }
    }

    fn handle_transport_event(&mut self, event: TransportEvent, now: Instant) {
        match event {
            TransportEvent::Registered { local_id } => self.on_registered(local_id),
            TransportEvent::Opened { peer } => self.on_opened(peer, now),
            TransportEvent::Data { peer, bytes } => match protocol::decode(&bytes) {
                Ok(message) => match self.role {
                    Role::Host => self.handle_host_message(&peer, message),
                    Role::Client => self.handle_client_message(&peer, message),
                },
                Err(e) => warn!("Dropping malformed datagram from {}: {}", peer, e),
            },
            TransportEvent::Closed { peer } => self.on_closed(peer),
            TransportEvent::Error { peer, reason } => self.on_transport_error(peer, reason),
        }
    }

    fn on_registered(&mut self, local_id: PeerId) {
        info!("Registered as {}", local_id);
        self.local_id = Some(local_id.clone());

        match self.role {
            Role::Host => {
                self.connect_deadline = None;
                self.slot = Some(HOST_SLOT);
                self.slots = Some(SlotTable::new(&self.name));
                self.state = ConnectionState::Active;
                self.events.push_back(SessionEvent::Hosting { id: local_id });
                self.publish_presence();
            }
            Role::Client => {
                self.state = ConnectionState::AwaitingWelcome;
                if let Some(host) = self.host_id.clone() {
                    self.transport.connect(&host);
                }
            }
        }
    }

    fn on_opened(&mut self, peer: PeerId, now: Instant) {
        match self.role {
            Role::Host => {
                let Some(slots) = self.slots.as_mut() else {
                    warn!("Connection from {} before registration", peer);
                    return;
                };
                match slots.allocate(&peer) {
                    Ok(slot) => {
                        let welcome = NetMessage::Welcome {
                            slot,
                            presence: slots.presence(),
                        };
                        self.send_logged(&peer, &welcome);
                        self.publish_presence();
                    }
                    Err(e) => {
                        warn!("Rejecting {}: {}", peer, e);
                        let rejection = NetMessage::Error {
                            reason: e.to_string(),
                        };
                        self.send_logged(&peer, &rejection);
                        self.pending_closes
                            .push((peer, now + self.config.rejection_grace));
                    }
                }
            }
            Role::Client => {
                if self.host_id.as_ref() == Some(&peer) {
                    let join = NetMessage::Join {
                        name: self.name.clone(),
                    };
                    self.send_logged(&peer, &join);
                } else {
                    debug!("Ignoring channel from non-host peer {}", peer);
                    self.transport.close(&peer);
                }
            }
        }
    }

    fn on_closed(&mut self, peer: PeerId) {
        match self.role {
            Role::Host => {
                self.pending_closes.retain(|(p, _)| *p != peer);
                let released = self.slots.as_mut().and_then(|s| s.release(&peer));
                if let Some(slot) = released {
                    self.remote_inputs[slot as usize] = InputFrame::default();
                    self.remote_seq[slot as usize] = 0;
                    self.publish_presence();
                }
            }
            Role::Client => {
                if self.host_id.as_ref() == Some(&peer) {
                    info!("Disconnected from host");
                    self.events.push_back(SessionEvent::Disconnected);
                    self.teardown();
                }
            }
        }
    }

    fn on_transport_error(&mut self, peer: Option<PeerId>, reason: String) {
        error!(
            "Transport error{}: {}",
            peer.map(|p| format!(" with {}", p)).unwrap_or_default(),
            reason
        );
        let connecting = matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::AwaitingWelcome
        );
        self.events
            .push_back(SessionEvent::Error(format!("NET ERROR: {}", reason)));
        if connecting {
            self.teardown();
        }
    }

    fn handle_host_message(&mut self, peer: &PeerId, message: NetMessage) {
        let Some(slot) = self.slots.as_ref().and_then(|s| s.find_slot_by_peer(peer)) else {
            debug!("Ignoring {} from unseated peer {}", message.kind(), peer);
            return;
        };

        match message {
            NetMessage::Join { name } => {
                if let Some(slots) = self.slots.as_mut() {
                    if slots.set_name(slot, &name).is_ok() {
                        self.publish_presence();
                    }
                }
            }
            NetMessage::LockstepInput(input) => self.relay_lockstep(slot, input),
            NetMessage::LegacyInput(sample) => {
                let sample = LegacyInput { slot, ..sample };
                if self.accept_legacy(sample) {
                    let message = NetMessage::LegacyInput(sample);
                    if let Err(e) = self.broadcast(&message, Some(slot)) {
                        error!("Failed to relay legacy input: {}", e);
                    }
                }
            }
            NetMessage::RestartRequest => {
                info!("Slot {} requested a restart", slot);
                if let Err(e) = self.restart_match() {
                    warn!("Restart request ignored: {}", e);
                }
            }
            NetMessage::Error { reason } => {
                warn!("Peer in slot {} reported: {}", slot, reason);
                self.events.push_back(SessionEvent::Error(reason));
            }
            other => debug!("Ignoring unexpected {} from slot {}", other.kind(), slot),
        }
    }

    fn handle_client_message(&mut self, peer: &PeerId, message: NetMessage) {
        if self.host_id.as_ref() != Some(peer) {
            debug!("Ignoring {} from non-host peer {}", message.kind(), peer);
            return;
        }

        match message {
            NetMessage::Welcome { slot, presence } => {
                info!("Welcomed into slot {}", slot);
                self.connect_deadline = None;
                self.slot = Some(slot);
                self.presence = presence.clone();
                if self.state == ConnectionState::AwaitingWelcome {
                    self.state = ConnectionState::Joined;
                }
                self.events.push_back(SessionEvent::Joined { slot });
                self.events.push_back(SessionEvent::Presence(presence));
            }
            NetMessage::Presence(presence) => {
                self.presence = presence.clone();
                self.events.push_back(SessionEvent::Presence(presence));
            }
            NetMessage::StartMatch(start) => {
                self.apply_start(&start);
                self.events.push_back(SessionEvent::MatchStarted(start));
            }
            NetMessage::RestartMatch(start) => {
                self.apply_start(&start);
                self.events.push_back(SessionEvent::MatchRestarted(start));
            }
            NetMessage::LockstepInput(input) => {
                if input.epoch > self.epoch() {
                    self.hold_early_input(input);
                } else if let Some(scheduler) = self.scheduler.as_mut() {
                    scheduler.on_remote(input);
                }
            }
            NetMessage::LegacyInput(sample) => {
                self.accept_legacy(sample);
            }
            NetMessage::Snapshot(snapshot) => {
                self.events.push_back(SessionEvent::Snapshot(snapshot));
            }
            NetMessage::Error { reason } => {
                warn!("Host reported: {}", reason);
                let connecting = matches!(
                    self.state,
                    ConnectionState::Connecting | ConnectionState::AwaitingWelcome
                );
                self.events.push_back(SessionEvent::Error(reason));
                if connecting {
                    self.teardown();
                }
            }
            other => debug!("Ignoring unexpected {} from host", other.kind()),
        }
    }

    /// Rewrites a client's real slot into its lockstep index, rebroadcasts to
    /// every client (sender included) and feeds the host's own scheduler.
    fn relay_lockstep(&mut self, slot: SlotId, input: LockstepInput) {
        let Some(index) = self
            .last_start
            .as_ref()
            .and_then(|start| start.slot_mapping.index_of(slot))
        else {
            debug!("Dropping lockstep input from non-participant slot {}", slot);
            return;
        };

        let input = LockstepInput { index, ..input };
        let outcome = match self.scheduler.as_mut() {
            Some(scheduler) => scheduler.on_remote(input),
            None => return,
        };
        match outcome {
            RecordOutcome::OtherEpoch => {
                debug!(
                    "Dropping lockstep input from slot {} for epoch {}",
                    slot, input.epoch
                );
                return;
            }
            RecordOutcome::Stale => debug!(
                "Late lockstep input from slot {} for frame {}",
                slot, input.frame
            ),
            _ => {}
        }

        if let Err(e) = self.broadcast(&NetMessage::LockstepInput(input), None) {
            error!("Failed to relay lockstep input: {}", e);
        }
    }

    /// Keeps a sample if it belongs to the current epoch and is newer than
    /// the last one seen for its slot.
    fn accept_legacy(&mut self, sample: LegacyInput) -> bool {
        let slot = sample.slot as usize;
        if slot >= MAX_SLOTS || sample.epoch != self.epoch() {
            return false;
        }
        if sample.seq <= self.remote_seq[slot] {
            return false;
        }
        self.remote_seq[slot] = sample.seq;
        self.remote_inputs[slot] = sample.input;
        true
    }

    fn apply_start(&mut self, start: &MatchStart) {
        info!(
            "Match starting: mode {:?}, seed {}, slots {:?}",
            start.mode, start.seed, start.real_slots
        );
        self.mode = start.mode;
        self.random.set_seed(start.seed);
        self.stalls.borrow_mut().clear();
        self.last_start = Some(start.clone());
        // Samplers restart their sequence with every start.
        self.remote_inputs = [InputFrame::default(); MAX_SLOTS];
        self.remote_seq = [0; MAX_SLOTS];

        self.scheduler = match start.mode {
            SyncMode::Lockstep => {
                let index = self
                    .slot
                    .and_then(|slot| start.slot_mapping.index_of(slot))
                    .unwrap_or(SPECTATOR_INDEX);
                let mut scheduler = LockstepScheduler::from_config(
                    index,
                    start.slot_mapping.participant_count(),
                    &self.config,
                )
                .with_epoch(start.epoch);
                let sink = Rc::clone(&self.stalls);
                scheduler.set_stall_hook(
                    self.config.stall_threshold_ticks,
                    Box::new(move |report| sink.borrow_mut().push(report.clone())),
                );
                Some(scheduler)
            }
            SyncMode::HostAuthoritative => None,
        };
        self.state = ConnectionState::InMatch;

        let held: Vec<LockstepInput> = self.early_inputs.drain(..).collect();
        for input in held {
            if input.epoch > start.epoch {
                self.early_inputs.push_back(input);
            } else if let Some(scheduler) = self.scheduler.as_mut() {
                scheduler.on_remote(input);
            }
        }
    }

    fn hold_early_input(&mut self, input: LockstepInput) {
        debug!(
            "Holding lockstep input for epoch {} frame {}",
            input.epoch, input.frame
        );
        if self.early_inputs.len() >= MAX_EARLY_INPUTS {
            self.early_inputs.pop_front();
        }
        self.early_inputs.push_back(input);
    }

    /// Epoch of the current match; 0 before the first start.
    pub fn epoch(&self) -> u32 {
        self.last_start.as_ref().map_or(0, |start| start.epoch)
    }

    fn publish_presence(&mut self) {
        let Some(slots) = self.slots.as_ref() else {
            return;
        };
        self.presence = slots.presence();
        let message = NetMessage::Presence(self.presence.clone());
        if let Err(e) = self.broadcast(&message, None) {
            error!("Failed to broadcast presence: {}", e);
        }
        self.events
            .push_back(SessionEvent::Presence(self.presence.clone()));
    }

    fn send_logged(&mut self, peer: &PeerId, message: &NetMessage) {
        match protocol::encode(message) {
            Ok(bytes) => self.transport.send(peer, &bytes),
            Err(e) => error!("Failed to encode {}: {}", message.kind(), e),
        }
    }

    /// Host only: sends to every seated client except `exclude`.
    fn broadcast(
        &mut self,
        message: &NetMessage,
        exclude: Option<SlotId>,
    ) -> Result<(), ProtocolError> {
        let Some(slots) = self.slots.as_ref() else {
            return Ok(());
        };
        let peers = slots.remote_peers();
        if peers.is_empty() {
            return Ok(());
        }

        let bytes = protocol::encode(message)?;
        for (slot, peer) in peers {
            if Some(slot) != exclude {
                self.transport.send(&peer, &bytes);
            }
        }
        Ok(())
    }

    fn require_host(&self) -> Result<(), SessionError> {
        if self.state == ConnectionState::Closed {
            return Err(SessionError::Closed);
        }
        match self.role {
            Role::Host => Ok(()),
            Role::Client => Err(SessionError::NotHost),
        }
    }

    /// Starts a match with a freshly drawn seed.
    pub fn start_match(&mut self) -> Result<MatchStart, SessionError> {
        let seed = rand::random::<u32>().max(1);
        self.start_match_with_seed(seed)
    }

    /// Starts a match: host plus the lowest occupied slots up to the
    /// participant limit, dense mapping, shared seed.
    pub fn start_match_with_seed(&mut self, seed: u32) -> Result<MatchStart, SessionError> {
        self.require_host()?;
        let participants = self
            .slots
            .as_ref()
            .map(|s| s.participants(self.config.max_lockstep_participants))
            .unwrap_or_default();

        if participants.len() < 2 {
            let e = SessionError::NoOpponent;
            warn!("{}", e);
            self.events.push_back(SessionEvent::Error(e.to_string()));
            return Err(e);
        }

        let mapping = SlotMapping::from_real_slots(&participants);
        let start = MatchStart {
            epoch: self.epoch() + 1,
            mode: self.config.mode,
            seed,
            participant_count: mapping.participant_count() as u8,
            real_slots: mapping.real_slots().to_vec(),
            slot_mapping: mapping,
        };

        self.broadcast(&NetMessage::StartMatch(start.clone()), None)?;
        self.apply_start(&start);
        self.events
            .push_back(SessionEvent::MatchStarted(start.clone()));
        Ok(start)
    }

    /// Replays the last start (same seed, same mapping) on every peer under
    /// a new epoch.
    pub fn restart_match(&mut self) -> Result<MatchStart, SessionError> {
        self.require_host()?;
        let epoch = self.epoch() + 1;
        let start = match self.last_start.clone() {
            Some(start) => MatchStart { epoch, ..start },
            None => {
                let mapping = SlotMapping::default();
                MatchStart {
                    epoch,
                    mode: self.config.mode,
                    seed: self.random.seed(),
                    participant_count: mapping.participant_count() as u8,
                    real_slots: mapping.real_slots().to_vec(),
                    slot_mapping: mapping,
                }
            }
        };

        self.broadcast(&NetMessage::RestartMatch(start.clone()), None)?;
        self.apply_start(&start);
        self.events
            .push_back(SessionEvent::MatchRestarted(start.clone()));
        Ok(start)
    }

    /// Host restarts directly; a client asks the host to.
    pub fn request_restart(&mut self) -> Result<(), SessionError> {
        match self.role {
            Role::Host => self.restart_match().map(|_| ()),
            Role::Client => self.send_to_host(&NetMessage::RestartRequest),
        }
    }

    pub fn set_slot_open(&mut self, slot: SlotId, open: bool) -> Result<(), SessionError> {
        self.require_host()?;
        let changed = match self.slots.as_mut() {
            Some(slots) => slots.set_open(slot, open)?,
            None => return Err(SessionError::InvalidSlot(slot)),
        };
        if changed {
            info!("Slot {} {}", slot, if open { "opened" } else { "closed" });
            self.publish_presence();
        }
        Ok(())
    }

    pub fn toggle_slot_open(&mut self, slot: SlotId) -> Result<(), SessionError> {
        self.require_host()?;
        let open = self.slots.as_ref().map_or(false, |s| s.is_open(slot));
        self.set_slot_open(slot, !open)
    }

    /// Schedules local input for `current_frame + input_delay`, filling any
    /// unwritten local frames before it, and sends every scheduled frame.
    ///
    /// Returns the scheduled messages. Empty when the horizon is already
    /// written or this peer only spectates.
    pub fn submit_local_input(
        &mut self,
        frame: &InputFrame,
    ) -> Result<Vec<LockstepInput>, SessionError> {
        if self.state == ConnectionState::Closed {
            return Err(SessionError::Closed);
        }
        let scheduler = self.scheduler.as_mut().ok_or(SessionError::NoMatch)?;
        let inputs = scheduler.submit_local(frame);

        for input in &inputs {
            let message = NetMessage::LockstepInput(*input);
            match self.role {
                Role::Host => self.broadcast(&message, None)?,
                Role::Client => self.send_to_host(&message)?,
            }
        }
        Ok(inputs)
    }

    /// Runs every complete lockstep frame through `advance` with the
    /// simulation stream selected. Returns the number of frames run.
    pub fn tick_lockstep<F>(&mut self, mut advance: F) -> u32
    where
        F: FnMut(u32, &[InputBits], f32, &mut DeterministicRandom),
    {
        let advanced = match self.scheduler.as_mut() {
            Some(scheduler) => {
                let random = &mut self.random;
                scheduler.tick(|frame, bits, dt| {
                    let mut sim = random.sim_scope();
                    advance(frame, bits, dt, &mut *sim);
                })
            }
            None => 0,
        };

        let stalls: Vec<StallReport> = self.stalls.borrow_mut().drain(..).collect();
        for report in stalls {
            warn!(
                "Lockstep stalled at frame {} for {} ticks, missing {:?}",
                report.frame, report.stalled_ticks, report.missing
            );
            self.events.push_back(SessionEvent::Stalled(report));
        }
        advanced
    }

    /// Sends a raw input sample for host-authoritative play.
    ///
    /// Clients send to the host; the host forwards its own sample to every
    /// client so each of them can approximate the host's actor. `seq` comes
    /// from the caller's sampler and must increase per sample.
    pub fn send_legacy_input(&mut self, seq: u32, input: InputFrame) -> Result<(), SessionError> {
        if self.state == ConnectionState::Closed {
            return Err(SessionError::Closed);
        }
        let slot = self.slot.ok_or(SessionError::NoMatch)?;
        let message = NetMessage::LegacyInput(LegacyInput {
            epoch: self.epoch(),
            slot,
            seq,
            input,
        });

        match self.role {
            Role::Host => self.broadcast(&message, None)?,
            Role::Client => self.send_to_host(&message)?,
        }
        Ok(())
    }

    /// Host only: pushes a full snapshot to every client.
    pub fn broadcast_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), SessionError> {
        self.require_host()?;
        let message = NetMessage::Snapshot(Box::new(snapshot.clone()));
        self.broadcast(&message, None)?;
        Ok(())
    }

    fn send_to_host(&mut self, message: &NetMessage) -> Result<(), SessionError> {
        if self.role != Role::Client {
            return Err(SessionError::NotClient);
        }
        if self.state == ConnectionState::Closed {
            return Err(SessionError::Closed);
        }
        let host = self.host_id.clone().ok_or(SessionError::Closed)?;
        let bytes = protocol::encode(message)?;
        self.transport.send(&host, &bytes);
        Ok(())
    }

    /// Most recent forwarded sample for `slot`; neutral if none arrived.
    pub fn remote_input(&self, slot: SlotId) -> InputFrame {
        self.remote_inputs
            .get(slot as usize)
            .copied()
            .unwrap_or_default()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_host(&self) -> bool {
        self.role == Role::Host
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn local_id(&self) -> Option<&PeerId> {
        self.local_id.as_ref()
    }

    pub fn slot(&self) -> Option<SlotId> {
        self.slot
    }

    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    pub fn current_match(&self) -> Option<&MatchStart> {
        self.last_start.as_ref()
    }

    pub fn scheduler(&self) -> Option<&LockstepScheduler> {
        self.scheduler.as_ref()
    }

    /// Session random streams. Outside `tick_lockstep` the presentation
    /// stream is active.
    pub fn random_mut(&mut self) -> &mut DeterministicRandom {
        &mut self.random
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryHub;
    use shared::input;
    use std::time::Duration;

    fn host_and_client() -> (
        MemoryHub,
        SessionManager<crate::transport::MemoryTransport>,
        SessionManager<crate::transport::MemoryTransport>,
        Instant,
    ) {
        let hub = MemoryHub::new();
        let now = Instant::now();
        let host = SessionManager::host(hub.endpoint("host"), "Host", NetConfig::default(), now);
        let client = SessionManager::join(
            hub.endpoint("guest"),
            PeerId::new("host"),
            "Guest",
            NetConfig::default(),
            now,
        );
        (hub, host, client, now)
    }

    fn pump<A: Transport, B: Transport>(
        a: &mut SessionManager<A>,
        b: &mut SessionManager<B>,
        now: Instant,
    ) {
        for _ in 0..4 {
            a.update(now);
            b.update(now);
        }
    }

    #[test]
    fn test_host_becomes_active_on_registration() {
        let hub = MemoryHub::new();
        let now = Instant::now();
        let mut host =
            SessionManager::host(hub.endpoint("host"), "Host", NetConfig::default(), now);
        assert_eq!(host.state(), ConnectionState::Connecting);

        host.update(now);
        assert_eq!(host.state(), ConnectionState::Active);
        assert_eq!(host.slot(), Some(HOST_SLOT));

        let events = host.drain_events();
        assert_eq!(
            events[0],
            SessionEvent::Hosting {
                id: PeerId::new("host")
            }
        );
        match &events[1] {
            SessionEvent::Presence(presence) => assert_eq!(presence.names[0], "Host"),
            other => panic!("Wrong event type: {:?}", other),
        }
    }

    #[test]
    fn test_client_is_welcomed_and_named() {
        let (_hub, mut host, mut client, now) = host_and_client();
        pump(&mut host, &mut client, now);

        assert_eq!(client.state(), ConnectionState::Joined);
        assert_eq!(client.slot(), Some(1));
        assert_eq!(client.presence().names[1], "Guest");
        assert!(client.presence().occupied[1]);
        assert!(client
            .drain_events()
            .contains(&SessionEvent::Joined { slot: 1 }));
    }

    #[test]
    fn test_start_without_opponent_fails() {
        let hub = MemoryHub::new();
        let now = Instant::now();
        let mut host =
            SessionManager::host(hub.endpoint("host"), "Host", NetConfig::default(), now);
        host.update(now);
        host.drain_events();

        match host.start_match() {
            Err(SessionError::NoOpponent) => {}
            other => panic!("Expected NoOpponent, got {:?}", other),
        }
        assert_eq!(
            host.drain_events(),
            vec![SessionEvent::Error(
                "Need 1 opponent to start online match.".to_string()
            )]
        );
    }

    #[test]
    fn test_client_cannot_administer() {
        let (_hub, mut host, mut client, now) = host_and_client();
        pump(&mut host, &mut client, now);

        assert!(matches!(client.start_match(), Err(SessionError::NotHost)));
        assert!(matches!(
            client.set_slot_open(2, false),
            Err(SessionError::NotHost)
        ));
    }

    #[test]
    fn test_start_shares_seed_and_mapping() {
        let (_hub, mut host, mut client, now) = host_and_client();
        pump(&mut host, &mut client, now);

        let start = host.start_match_with_seed(42).unwrap();
        pump(&mut host, &mut client, now);

        assert_eq!(start.real_slots, vec![0, 1]);
        assert_eq!(client.current_match(), Some(&start));
        assert_eq!(client.state(), ConnectionState::InMatch);
        assert_eq!(client.random_mut().seed(), 42);
        assert_eq!(client.scheduler().map(|s| s.local_index()), Some(1));
        assert_eq!(host.scheduler().map(|s| s.local_index()), Some(0));
    }

    #[test]
    fn test_lockstep_frames_flow_both_ways() {
        let (_hub, mut host, mut client, now) = host_and_client();
        pump(&mut host, &mut client, now);
        host.start_match_with_seed(7).unwrap();
        pump(&mut host, &mut client, now);

        let right = InputFrame::new(1.0, 0.0);
        let left = InputFrame::new(-1.0, 0.0);
        host.submit_local_input(&right).unwrap();
        client.submit_local_input(&left).unwrap();
        pump(&mut host, &mut client, now);

        let mut host_frames = Vec::new();
        let mut client_frames = Vec::new();
        host.tick_lockstep(|frame, bits, _, _| host_frames.push((frame, bits.to_vec())));
        client.tick_lockstep(|frame, bits, _, _| client_frames.push((frame, bits.to_vec())));

        assert_eq!(host_frames, client_frames);
        assert_eq!(host_frames.len(), 3);
        assert_eq!(
            host_frames[2],
            (2, vec![input::encode(&right), input::encode(&left)])
        );
    }

    #[test]
    fn test_tick_selects_sim_stream() {
        let (_hub, mut host, mut client, now) = host_and_client();
        pump(&mut host, &mut client, now);
        host.start_match_with_seed(9).unwrap();

        let mut seen = Vec::new();
        host.tick_lockstep(|_, _, _, random| seen.push(random.active()));
        assert!(!seen.is_empty());
        assert!(seen
            .iter()
            .all(|kind| *kind == shared::StreamKind::Simulation));
        assert_eq!(
            host.random_mut().active(),
            shared::StreamKind::Presentation
        );
    }

    #[test]
    fn test_connect_timeout_closes() {
        let hub = MemoryHub::new();
        let now = Instant::now();
        // Reachable, but nothing behind it ever answers.
        let _silent = hub.endpoint("silent");
        let mut client = SessionManager::join(
            hub.endpoint("guest"),
            PeerId::new("silent"),
            "Guest",
            NetConfig::default(),
            now,
        );
        client.update(now);
        client.update(now + Duration::from_secs(5));
        assert_eq!(client.state(), ConnectionState::AwaitingWelcome);
        client.drain_events();

        client.update(now + Duration::from_secs(11));
        assert_eq!(client.state(), ConnectionState::Closed);
        assert_eq!(
            client.drain_events(),
            vec![SessionEvent::Error("connection timeout".to_string())]
        );
    }

    #[test]
    fn test_unreachable_host_aborts() {
        let hub = MemoryHub::new();
        let now = Instant::now();
        let mut client = SessionManager::join(
            hub.endpoint("guest"),
            PeerId::new("nobody"),
            "Guest",
            NetConfig::default(),
            now,
        );
        client.update(now);
        client.update(now);

        assert_eq!(client.state(), ConnectionState::Closed);
        assert!(matches!(
            client.drain_events().as_slice(),
            [SessionEvent::Error(_)]
        ));
    }

    #[test]
    fn test_close_clears_events() {
        let (_hub, mut host, mut client, now) = host_and_client();
        pump(&mut host, &mut client, now);

        host.close();
        assert_eq!(host.state(), ConnectionState::Closed);
        assert!(host.drain_events().is_empty());
        assert!(matches!(host.start_match(), Err(SessionError::Closed)));
    }

    #[test]
    fn test_legacy_input_sequence_filter() {
        let (_hub, mut host, mut client, now) = host_and_client();
        pump(&mut host, &mut client, now);

        client.send_legacy_input(1, InputFrame::new(1.0, 0.0)).unwrap();
        pump(&mut host, &mut client, now);
        assert_eq!(host.remote_input(1), InputFrame::new(1.0, 0.0));

        assert!(!host.accept_legacy(LegacyInput {
            epoch: 0,
            slot: 1,
            seq: 1,
            input: InputFrame::new(-1.0, 0.0),
        }));
        assert_eq!(host.remote_input(1), InputFrame::new(1.0, 0.0));
    }

    #[test]
    fn test_local_lead_survives_ticks() {
        let (_hub, mut host, mut client, now) = host_and_client();
        pump(&mut host, &mut client, now);
        host.start_match_with_seed(3).unwrap();
        pump(&mut host, &mut client, now);
        let delay = host.config().input_delay;

        for _ in 0..5 {
            let current = host.scheduler().map_or(0, |s| s.current_frame());
            let sent = host.submit_local_input(&InputFrame::default()).unwrap();
            assert_eq!(sent.last().map(|i| i.frame), Some(current + delay));

            let current = client.scheduler().map_or(0, |s| s.current_frame());
            let sent = client.submit_local_input(&InputFrame::default()).unwrap();
            assert_eq!(sent.last().map(|i| i.frame), Some(current + delay));

            pump(&mut host, &mut client, now);
            assert!(host.tick_lockstep(|_, _, _, _| {}) > 0);
            assert!(client.tick_lockstep(|_, _, _, _| {}) > 0);
        }
    }

    #[test]
    fn test_restart_drops_previous_epoch_inputs() {
        let (_hub, mut host, mut client, now) = host_and_client();
        pump(&mut host, &mut client, now);
        host.start_match_with_seed(11).unwrap();
        pump(&mut host, &mut client, now);

        let right = InputFrame::new(1.0, 0.0);
        let left = InputFrame::new(-1.0, 0.0);
        client.request_restart().unwrap();
        // Sent before the restart reaches the client.
        let stale = client.submit_local_input(&right).unwrap();
        assert_eq!(stale[0].epoch, 1);
        pump(&mut host, &mut client, now);
        assert_eq!(host.epoch(), 2);
        assert_eq!(client.epoch(), 2);

        host.submit_local_input(&InputFrame::default()).unwrap();
        client.submit_local_input(&left).unwrap();
        pump(&mut host, &mut client, now);

        let mut host_frames = Vec::new();
        let mut client_frames = Vec::new();
        host.tick_lockstep(|frame, bits, _, _| host_frames.push((frame, bits.to_vec())));
        client.tick_lockstep(|frame, bits, _, _| client_frames.push((frame, bits.to_vec())));

        assert_eq!(host_frames, client_frames);
        assert_eq!(host_frames[2], (2, vec![0, input::encode(&left)]));
    }

    #[test]
    fn test_early_input_waits_for_its_start() {
        let (hub, mut host, mut client, now) = host_and_client();
        pump(&mut host, &mut client, now);
        host.start_match_with_seed(11).unwrap();
        pump(&mut host, &mut client, now);

        let early = LockstepInput {
            epoch: 2,
            frame: 2,
            index: 0,
            bits: shared::input::BIT_RIGHT,
        };
        let bytes = protocol::encode(&NetMessage::LockstepInput(early)).unwrap();
        hub.inject(
            &PeerId::new("guest"),
            TransportEvent::Data {
                peer: PeerId::new("host"),
                bytes,
            },
        );
        client.update(now);
        assert_eq!(client.scheduler().and_then(|s| s.stored(0, 2)), None);

        host.restart_match().unwrap();
        pump(&mut host, &mut client, now);
        let scheduler = client.scheduler().unwrap();
        assert_eq!(scheduler.epoch(), 2);
        assert_eq!(scheduler.stored(0, 2), Some(shared::input::BIT_RIGHT));
    }

    #[test]
    fn test_restart_resets_legacy_sequence() {
        let (_hub, mut host, mut client, now) = host_and_client();
        pump(&mut host, &mut client, now);
        host.start_match_with_seed(5).unwrap();
        pump(&mut host, &mut client, now);

        let right = InputFrame::new(1.0, 0.0);
        let left = InputFrame::new(-1.0, 0.0);
        client.send_legacy_input(500, right).unwrap();
        pump(&mut host, &mut client, now);
        assert_eq!(host.remote_input(1), right);

        host.restart_match().unwrap();
        assert_eq!(host.remote_input(1), InputFrame::default());
        // Still stamped with the old epoch.
        client.send_legacy_input(600, right).unwrap();
        pump(&mut host, &mut client, now);
        assert_eq!(host.remote_input(1), InputFrame::default());

        client.send_legacy_input(1, left).unwrap();
        pump(&mut host, &mut client, now);
        assert_eq!(host.remote_input(1), left);
    }
}
