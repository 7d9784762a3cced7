//! Local input sampling with sequencing and change detection

use shared::{Action, ControllerState, InputFrame};
use std::time::{Duration, Instant};

/// Resend interval for unchanged input, so the host keeps hearing from us.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_millis(16);

/// Turns raw per-frame samples into sequenced input worth sending.
pub struct InputSampler {
    next_sequence: u32,
    controls: ControllerState,
    last_sent: Option<Instant>,
    keepalive: Duration,
}

impl InputSampler {
    pub fn new() -> Self {
        Self::with_keepalive(KEEPALIVE_INTERVAL)
    }

    pub fn with_keepalive(keepalive: Duration) -> Self {
        Self {
            next_sequence: 1,
            controls: ControllerState::default(),
            last_sent: None,
            keepalive,
        }
    }

    /// Records this frame's sample. Returns the sequenced input to send when
    /// it differs from the last one or the keepalive interval has passed.
    pub fn sample(&mut self, raw: InputFrame, now: Instant) -> Option<(u32, InputFrame)> {
        let frame = raw.quantized();
        self.controls.push(frame);

        let changed = self.controls.current != self.controls.previous;
        let due = self
            .last_sent
            .map_or(true, |sent| now.saturating_duration_since(sent) >= self.keepalive);

        if !changed && !due {
            return None;
        }

        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.last_sent = Some(now);
        Some((sequence, frame))
    }

    pub fn current(&self) -> &InputFrame {
        &self.controls.current
    }

    pub fn is_pressed(&self, action: Action) -> bool {
        self.controls.is_pressed(action)
    }

    pub fn is_just_pressed(&self, action: Action) -> bool {
        self.controls.is_just_pressed(action)
    }

    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }
}

impl Default for InputSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampler_creation() {
        let sampler = InputSampler::new();
        assert_eq!(sampler.next_sequence(), 1);
        assert_eq!(*sampler.current(), InputFrame::default());
    }

    #[test]
    fn test_first_sample_is_sent() {
        let mut sampler = InputSampler::new();
        let sent = sampler.sample(InputFrame::default(), Instant::now());
        assert_eq!(sent.map(|(seq, _)| seq), Some(1));
        assert_eq!(sampler.next_sequence(), 2);
    }

    #[test]
    fn test_unchanged_input_waits_for_keepalive() {
        let mut sampler = InputSampler::new();
        let start = Instant::now();
        assert!(sampler.sample(InputFrame::default(), start).is_some());
        assert!(sampler
            .sample(InputFrame::default(), start + Duration::from_millis(5))
            .is_none());
        assert!(sampler
            .sample(InputFrame::default(), start + Duration::from_millis(16))
            .is_some());
    }

    #[test]
    fn test_change_is_sent_immediately() {
        let mut sampler = InputSampler::new();
        let start = Instant::now();
        sampler.sample(InputFrame::default(), start);

        let moved = InputFrame::new(1.0, 0.0);
        let sent = sampler.sample(moved, start + Duration::from_millis(1));
        assert_eq!(sent, Some((2, moved.quantized())));
    }

    #[test]
    fn test_just_pressed_edges() {
        let mut sampler = InputSampler::new();
        let now = Instant::now();
        let attack = InputFrame::default().with_action(Action::Attack);

        sampler.sample(attack, now);
        assert!(sampler.is_just_pressed(Action::Attack));

        sampler.sample(attack, now);
        assert!(sampler.is_pressed(Action::Attack));
        assert!(!sampler.is_just_pressed(Action::Attack));
    }
}
