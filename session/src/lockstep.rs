//! Lockstep input scheduling
//!
//! Buffers per-participant, per-frame input masks and releases frames to the
//! simulation strictly in order, once every participant's input for the
//! current frame is known. Local input is scheduled `input_delay` frames into
//! the future so it has time to reach remote peers before they need it.
//!
//! The first `input_delay` frames are pre-filled with neutral input for every
//! participant on every peer, since nobody can have submitted input for them.
//! When a catch-up burst leaves local frames behind the horizon unwritten,
//! the next submission fills them with the same mask, so the local lead is
//! back at `input_delay` after every submit.
//!
//! Every scheduler belongs to one match epoch. Input stamped with another
//! epoch is left over from a previous start and never enters the table.

use log::{debug, warn};
use shared::{input, InputBits, InputFrame, LockstepIndex, LockstepInput, NetConfig};
use std::collections::BTreeMap;

/// Diagnostic handed to the stall hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StallReport {
    pub frame: u32,
    pub missing: Vec<LockstepIndex>,
    pub stalled_ticks: u32,
}

pub type StallHook = Box<dyn FnMut(&StallReport)>;

/// Result of recording a remote input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Stored,
    /// Same value already present for this `(index, frame)`.
    Duplicate,
    /// A different value was already present; the first value is kept.
    Conflict,
    /// Frame already consumed.
    Stale,
    /// Index is not a participant of this match.
    UnknownIndex,
    /// Sent for a different start of the match.
    OtherEpoch,
}

pub struct LockstepScheduler {
    epoch: u32,
    local_index: LockstepIndex,
    participant_count: usize,
    current_frame: u32,
    input_delay: u32,
    fixed_dt: f32,
    /// Next frame the local participant will fill.
    next_local_frame: u32,
    inputs: Vec<BTreeMap<u32, InputBits>>,
    stalled_ticks: u32,
    stall_threshold: u32,
    stall_hook: Option<StallHook>,
}

impl LockstepScheduler {
    pub fn new(
        local_index: LockstepIndex,
        participant_count: usize,
        input_delay: u32,
        fixed_dt: f32,
    ) -> Self {
        let mut inputs = vec![BTreeMap::new(); participant_count];
        for table in inputs.iter_mut() {
            for frame in 0..input_delay {
                table.insert(frame, 0);
            }
        }

        Self {
            epoch: 0,
            local_index,
            participant_count,
            current_frame: 0,
            input_delay,
            fixed_dt,
            next_local_frame: input_delay,
            inputs,
            stalled_ticks: 0,
            stall_threshold: u32::MAX,
            stall_hook: None,
        }
    }

    pub fn from_config(
        local_index: LockstepIndex,
        participant_count: usize,
        config: &NetConfig,
    ) -> Self {
        let mut scheduler = Self::new(
            local_index,
            participant_count,
            config.input_delay,
            config.fixed_dt,
        );
        scheduler.stall_threshold = config.stall_threshold_ticks.max(1);
        scheduler
    }

    pub fn with_epoch(mut self, epoch: u32) -> Self {
        self.epoch = epoch;
        self
    }

    /// Registers a hook fired once per stalled frame after `threshold`
    /// consecutive ticks without progress.
    pub fn set_stall_hook(&mut self, threshold: u32, hook: StallHook) {
        self.stall_threshold = threshold.max(1);
        self.stall_hook = Some(hook);
    }

    /// Encodes and stores local input, returning the messages to broadcast.
    ///
    /// Input lands at `current_frame + input_delay`; unwritten local frames
    /// before it get the same mask. A frame that already holds a value keeps
    /// it and the stored value is what gets sent. Returns nothing when the
    /// horizon is already written or this peer is not a participant.
    pub fn submit_local(&mut self, frame: &InputFrame) -> Vec<LockstepInput> {
        let index = self.local_index as usize;
        let target = self.current_frame + self.input_delay;
        if index >= self.participant_count || self.next_local_frame > target {
            return Vec::new();
        }

        let bits = input::encode(frame);
        let first = self.next_local_frame.max(self.current_frame);
        let (epoch, local_index) = (self.epoch, self.local_index);
        let table = &mut self.inputs[index];

        let messages: Vec<LockstepInput> = (first..=target)
            .map(|frame| LockstepInput {
                epoch,
                frame,
                index: local_index,
                bits: *table.entry(frame).or_insert(bits),
            })
            .collect();
        if messages.len() > 1 {
            debug!(
                "Filled local frames {}..={} after catch-up",
                first, target
            );
        }
        self.next_local_frame = target + 1;
        messages
    }

    /// Records a remote `(index, frame, bits)` triple. Idempotent.
    pub fn on_remote(&mut self, message: LockstepInput) -> RecordOutcome {
        if message.epoch != self.epoch {
            return RecordOutcome::OtherEpoch;
        }
        let index = message.index as usize;
        if index >= self.participant_count {
            return RecordOutcome::UnknownIndex;
        }
        if message.frame < self.current_frame {
            return RecordOutcome::Stale;
        }

        let table = &mut self.inputs[index];
        match table.get(&message.frame) {
            Some(&existing) if existing == message.bits => RecordOutcome::Duplicate,
            Some(&existing) => {
                warn!(
                    "Conflicting lockstep input for index {} frame {}: kept {:#04x}, got {:#04x}",
                    message.index, message.frame, existing, message.bits
                );
                RecordOutcome::Conflict
            }
            None => {
                table.insert(message.frame, message.bits);
                RecordOutcome::Stored
            }
        }
    }

    /// Releases every frame whose inputs are complete, in order.
    ///
    /// May run zero, one or many frames per call. Returns the number run.
    pub fn tick<F>(&mut self, mut on_frame_ready: F) -> u32
    where
        F: FnMut(u32, &[InputBits], f32),
    {
        let mut advanced = 0;
        let mut bits = Vec::with_capacity(self.participant_count);

        while self.has_all(self.current_frame) {
            bits.clear();
            for table in self.inputs.iter_mut() {
                // has_all() guarantees presence; consumed entries are pruned.
                bits.push(table.remove(&self.current_frame).unwrap_or_default());
            }
            on_frame_ready(self.current_frame, &bits, self.fixed_dt);
            self.current_frame += 1;
            advanced += 1;
        }

        if advanced > 0 {
            self.stalled_ticks = 0;
        } else if self.participant_count > 0 {
            self.stalled_ticks = self.stalled_ticks.saturating_add(1);
            if self.stalled_ticks == self.stall_threshold {
                let report = StallReport {
                    frame: self.current_frame,
                    missing: self.missing(self.current_frame),
                    stalled_ticks: self.stalled_ticks,
                };
                debug!(
                    "Lockstep stalled at frame {} waiting on {:?}",
                    report.frame, report.missing
                );
                if let Some(hook) = self.stall_hook.as_mut() {
                    hook(&report);
                }
            }
        }

        advanced
    }

    pub fn has_all(&self, frame: u32) -> bool {
        self.participant_count > 0 && self.inputs.iter().all(|table| table.contains_key(&frame))
    }

    /// Participant indices with no input stored for `frame`.
    pub fn missing(&self, frame: u32) -> Vec<LockstepIndex> {
        self.inputs
            .iter()
            .enumerate()
            .filter(|(_, table)| !table.contains_key(&frame))
            .map(|(index, _)| index as LockstepIndex)
            .collect()
    }

    pub fn stored(&self, index: LockstepIndex, frame: u32) -> Option<InputBits> {
        self.inputs
            .get(index as usize)
            .and_then(|table| table.get(&frame).copied())
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn current_frame(&self) -> u32 {
        self.current_frame
    }

    pub fn local_index(&self) -> LockstepIndex {
        self.local_index
    }

    pub fn participant_count(&self) -> usize {
        self.participant_count
    }

    pub fn input_delay(&self) -> u32 {
        self.input_delay
    }

    pub fn stalled_ticks(&self) -> u32 {
        self.stalled_ticks
    }
}
