//! Input sampling types and the lossless bitmask codec used on the wire and
//! in the lockstep input table.
//!
//! Bit layout: 0=left 1=right 2=up 3=down 4=attack 5=dash 6=hop.

use serde::{Deserialize, Serialize};

/// Packed per-frame input, one byte per participant per frame.
pub type InputBits = u8;

pub const BIT_LEFT: InputBits = 1 << 0;
pub const BIT_RIGHT: InputBits = 1 << 1;
pub const BIT_UP: InputBits = 1 << 2;
pub const BIT_DOWN: InputBits = 1 << 3;
pub const BIT_ATTACK: InputBits = 1 << 4;
pub const BIT_DASH: InputBits = 1 << 5;
pub const BIT_HOP: InputBits = 1 << 6;

/// Axis magnitude above which a direction bit is set.
pub const AXIS_THRESHOLD: f32 = 0.35;

/// 1/sqrt(2) as a literal so every peer uses the exact same value.
pub const INV_SQRT2: f32 = 0.707_106_77;

/// A single participant's input for a single simulation tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InputFrame {
    pub x: f32,
    pub y: f32,
    pub attack: bool,
    pub dash: bool,
    pub hop: bool,
}

/// Action buttons carried alongside the direction axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Attack,
    Dash,
    Hop,
}

impl InputFrame {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            ..Self::default()
        }
    }

    pub fn with_action(mut self, action: Action) -> Self {
        match action {
            Action::Attack => self.attack = true,
            Action::Dash => self.dash = true,
            Action::Hop => self.hop = true,
        }
        self
    }

    pub fn is_pressed(&self, action: Action) -> bool {
        match action {
            Action::Attack => self.attack,
            Action::Dash => self.dash,
            Action::Hop => self.hop,
        }
    }

    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Canonical form of this sample: each axis collapsed to its sign band
    /// and diagonals normalized to unit length.
    pub fn quantized(&self) -> InputFrame {
        let band = |v: f32| {
            if v > AXIS_THRESHOLD {
                1.0
            } else if v < -AXIS_THRESHOLD {
                -1.0
            } else {
                0.0
            }
        };
        let (mut x, mut y) = (band(self.x), band(self.y));
        if x != 0.0 && y != 0.0 {
            x *= INV_SQRT2;
            y *= INV_SQRT2;
        }
        InputFrame {
            x,
            y,
            attack: self.attack,
            dash: self.dash,
            hop: self.hop,
        }
    }
}

/// Packs an input sample into its wire bitmask.
pub fn encode(frame: &InputFrame) -> InputBits {
    let mut bits = 0;
    if frame.x < -AXIS_THRESHOLD {
        bits |= BIT_LEFT;
    }
    if frame.x > AXIS_THRESHOLD {
        bits |= BIT_RIGHT;
    }
    if frame.y < -AXIS_THRESHOLD {
        bits |= BIT_UP;
    }
    if frame.y > AXIS_THRESHOLD {
        bits |= BIT_DOWN;
    }
    if frame.attack {
        bits |= BIT_ATTACK;
    }
    if frame.dash {
        bits |= BIT_DASH;
    }
    if frame.hop {
        bits |= BIT_HOP;
    }
    bits
}

/// Rebuilds an input sample from a bitmask. Bit 7 is ignored.
pub fn decode(bits: InputBits) -> InputFrame {
    let axis = |neg: InputBits, pos: InputBits| {
        let mut v = 0.0;
        if bits & pos != 0 {
            v += 1.0;
        }
        if bits & neg != 0 {
            v -= 1.0;
        }
        v
    };
    let mut x = axis(BIT_LEFT, BIT_RIGHT);
    let mut y = axis(BIT_UP, BIT_DOWN);
    if x != 0.0 && y != 0.0 {
        x *= INV_SQRT2;
        y *= INV_SQRT2;
    }
    InputFrame {
        x,
        y,
        attack: bits & BIT_ATTACK != 0,
        dash: bits & BIT_DASH != 0,
        hop: bits & BIT_HOP != 0,
    }
}

/// Previous and current decoded frames for one controller.
///
/// "Just pressed" is derived here by comparing the two frames; it is never
/// carried on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControllerState {
    pub current: InputFrame,
    pub previous: InputFrame,
}

impl ControllerState {
    pub fn push(&mut self, frame: InputFrame) {
        self.previous = self.current;
        self.current = frame;
    }

    pub fn push_bits(&mut self, bits: InputBits) {
        self.push(decode(bits));
    }

    pub fn is_pressed(&self, action: Action) -> bool {
        self.current.is_pressed(action)
    }

    pub fn is_just_pressed(&self, action: Action) -> bool {
        self.current.is_pressed(action) && !self.previous.is_pressed(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use proptest::prelude::*;

    #[test]
    fn test_encode_bit_layout() {
        assert_eq!(encode(&InputFrame::new(-1.0, 0.0)), BIT_LEFT);
        assert_eq!(encode(&InputFrame::new(1.0, 0.0)), BIT_RIGHT);
        assert_eq!(encode(&InputFrame::new(0.0, -1.0)), BIT_UP);
        assert_eq!(encode(&InputFrame::new(0.0, 1.0)), BIT_DOWN);

        let all = InputFrame::new(0.0, 0.0)
            .with_action(Action::Attack)
            .with_action(Action::Dash)
            .with_action(Action::Hop);
        assert_eq!(encode(&all), BIT_ATTACK | BIT_DASH | BIT_HOP);
    }

    #[test]
    fn test_dead_zone_is_neutral() {
        assert_eq!(encode(&InputFrame::new(0.35, -0.35)), 0);
        assert_eq!(encode(&InputFrame::new(0.2, 0.1)), 0);
    }

    #[test]
    fn test_analog_and_digital_quantize_identically() {
        let analog = InputFrame::new(0.8, -0.6);
        let digital = InputFrame::new(1.0, -1.0);
        assert_eq!(encode(&analog), encode(&digital));
    }

    #[test]
    fn test_decode_normalizes_diagonals() {
        let frame = decode(BIT_RIGHT | BIT_DOWN);
        assert_approx_eq!(frame.x, INV_SQRT2, 1e-6);
        assert_approx_eq!(frame.y, INV_SQRT2, 1e-6);
        assert_approx_eq!(frame.magnitude(), 1.0, 1e-5);
    }

    #[test]
    fn test_decode_opposite_bits_cancel() {
        let frame = decode(BIT_LEFT | BIT_RIGHT | BIT_UP);
        assert_eq!(frame.x, 0.0);
        assert_eq!(frame.y, -1.0);
    }

    #[test]
    fn test_decode_ignores_high_bit() {
        assert_eq!(decode(0x80), InputFrame::default());
    }

    #[test]
    fn test_controller_edge_detection() {
        let mut controller = ControllerState::default();
        controller.push_bits(BIT_ATTACK);
        assert!(controller.is_just_pressed(Action::Attack));

        controller.push_bits(BIT_ATTACK);
        assert!(controller.is_pressed(Action::Attack));
        assert!(!controller.is_just_pressed(Action::Attack));

        controller.push_bits(0);
        assert!(!controller.is_pressed(Action::Attack));
    }

    proptest! {
        #[test]
        fn prop_decode_encode_is_canonical_quantization(
            x in -1.5f32..1.5,
            y in -1.5f32..1.5,
            attack in any::<bool>(),
            dash in any::<bool>(),
            hop in any::<bool>(),
        ) {
            let frame = InputFrame { x, y, attack, dash, hop };
            prop_assert_eq!(decode(encode(&frame)), frame.quantized());
        }

        #[test]
        fn prop_encode_decode_is_identity_on_valid_masks(bits in 0u8..0x80) {
            // Opposing directions collapse to neutral and are never produced by encode().
            prop_assume!(bits & (BIT_LEFT | BIT_RIGHT) != (BIT_LEFT | BIT_RIGHT));
            prop_assume!(bits & (BIT_UP | BIT_DOWN) != (BIT_UP | BIT_DOWN));
            prop_assert_eq!(encode(&decode(bits)), bits);
        }
    }
}
