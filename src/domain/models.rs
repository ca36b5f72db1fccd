use crate::domain::error::ControllerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

/// Number of analog axes a controller state can carry.
pub const AXIS_COUNT: usize = 6;

/// Analog axis identifiers.
///
/// Sticks normalize to `[-1.0, 1.0]`, triggers to `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    LeftX,
    LeftY,
    RightX,
    RightY,
    LeftTrigger,
    RightTrigger,
}

impl Axis {
    pub const ALL: [Axis; AXIS_COUNT] = [
        Axis::LeftX,
        Axis::LeftY,
        Axis::RightX,
        Axis::RightY,
        Axis::LeftTrigger,
        Axis::RightTrigger,
    ];

    /// Slot of this axis inside per-axis arrays.
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LeftX => "left_x",
            Self::LeftY => "left_y",
            Self::RightX => "right_x",
            Self::RightY => "right_y",
            Self::LeftTrigger => "left_trigger",
            Self::RightTrigger => "right_trigger",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Axis {
    type Err = ControllerError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "left_x" => Ok(Self::LeftX),
            "left_y" => Ok(Self::LeftY),
            "right_x" => Ok(Self::RightX),
            "right_y" => Ok(Self::RightY),
            "left_trigger" | "l2" => Ok(Self::LeftTrigger),
            "right_trigger" | "r2" => Ok(Self::RightTrigger),
            other => Err(ControllerError::UnknownControl(other.to_string())),
        }
    }
}

/// Number of distinct button identifiers.
pub const BUTTON_COUNT: usize = 15;

/// Digital button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Button {
    A,
    B,
    X,
    Y,
    L1,
    R1,
    Select,
    Start,
    Menu,
    LeftStick,
    RightStick,
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
}

impl Button {
    pub const ALL: [Button; BUTTON_COUNT] = [
        Button::A,
        Button::B,
        Button::X,
        Button::Y,
        Button::L1,
        Button::R1,
        Button::Select,
        Button::Start,
        Button::Menu,
        Button::LeftStick,
        Button::RightStick,
        Button::DpadUp,
        Button::DpadDown,
        Button::DpadLeft,
        Button::DpadRight,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "a",
            Self::B => "b",
            Self::X => "x",
            Self::Y => "y",
            Self::L1 => "l1",
            Self::R1 => "r1",
            Self::Select => "select",
            Self::Start => "start",
            Self::Menu => "menu",
            Self::LeftStick => "left_stick",
            Self::RightStick => "right_stick",
            Self::DpadUp => "dpad_up",
            Self::DpadDown => "dpad_down",
            Self::DpadLeft => "dpad_left",
            Self::DpadRight => "dpad_right",
        }
    }

    const fn mask(self) -> u16 {
        1 << (self as u16)
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Button {
    type Err = ControllerError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        // The T1d labels select/start as C1/C2
        match name {
            "a" => Ok(Self::A),
            "b" => Ok(Self::B),
            "x" => Ok(Self::X),
            "y" => Ok(Self::Y),
            "l1" => Ok(Self::L1),
            "r1" => Ok(Self::R1),
            "select" | "c1" => Ok(Self::Select),
            "start" | "c2" => Ok(Self::Start),
            "menu" => Ok(Self::Menu),
            "left_stick" | "l3" => Ok(Self::LeftStick),
            "right_stick" | "r3" => Ok(Self::RightStick),
            "dpad_up" => Ok(Self::DpadUp),
            "dpad_down" => Ok(Self::DpadDown),
            "dpad_left" => Ok(Self::DpadLeft),
            "dpad_right" => Ok(Self::DpadRight),
            other => Err(ControllerError::UnknownControl(other.to_string())),
        }
    }
}

/// Pressed buttons as a bitfield indexed by [`Button`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonSet(u16);

impl ButtonSet {
    pub const NONE: Self = Self(0);

    pub fn contains(self, button: Button) -> bool {
        self.0 & button.mask() != 0
    }

    pub fn insert(&mut self, button: Button) {
        self.0 |= button.mask();
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Button> {
        Button::ALL.into_iter().filter(move |b| self.contains(*b))
    }
}

impl FromIterator<Button> for ButtonSet {
    fn from_iter<I: IntoIterator<Item = Button>>(iter: I) -> Self {
        let mut set = Self::NONE;
        for button in iter {
            set.insert(button);
        }
        set
    }
}

/// Maps one bit of a decoded button bitmask to a named button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonBit {
    pub bit: u8,
    pub button: Button,
}

impl ButtonBit {
    pub const fn new(bit: u8, button: Button) -> Self {
        Self { bit, button }
    }
}

/// Frame counter together with its wire width, compared with wrap-around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sequence {
    pub value: u32,
    pub bits: u8,
}

impl Sequence {
    pub fn new(value: u32, bits: u8) -> Self {
        Self { value, bits }
    }

    /// Serial-number comparison: `self` is newer when it lies less than half
    /// the counter range ahead of `other`.
    pub fn is_newer_than(self, other: Sequence) -> bool {
        let modulus = 1u64 << self.bits.min(32);
        let diff = (self.value as u64 + modulus - (other.value as u64 % modulus)) % modulus;
        diff != 0 && diff < modulus / 2
    }
}

/// Decoded but unnormalized contents of one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReport {
    report_id: Option<u8>,
    axes: [Option<u16>; AXIS_COUNT],
    buttons: u32,
    sequence: Option<Sequence>,
}

impl RawReport {
    pub fn new(
        report_id: Option<u8>,
        axes: [Option<u16>; AXIS_COUNT],
        buttons: u32,
        sequence: Option<Sequence>,
    ) -> Self {
        Self {
            report_id,
            axes,
            buttons,
            sequence,
        }
    }

    pub fn report_id(&self) -> Option<u8> {
        self.report_id
    }

    /// Raw value of `axis`, or `None` when the frame layout does not carry it.
    pub fn axis(&self, axis: Axis) -> Option<u16> {
        self.axes[axis.index()]
    }

    pub fn buttons(&self) -> u32 {
        self.buttons
    }

    pub fn sequence(&self) -> Option<Sequence> {
        self.sequence
    }
}

/// A report after calibration, ready to be swapped into the state store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedReport {
    pub axes: [f32; AXIS_COUNT],
    pub buttons: ButtonSet,
    pub sequence: Option<Sequence>,
}

impl NormalizedReport {
    pub fn axis(&self, axis: Axis) -> f32 {
        self.axes[axis.index()]
    }
}

/// Link health as seen by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connected,
    Stale,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Stale => "stale",
        };
        f.write_str(label)
    }
}

/// Point-in-time view of the controller. Always copied out whole.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerState {
    pub axes: [f32; AXIS_COUNT],
    pub buttons: ButtonSet,
    pub status: ConnectionStatus,
    pub sequence: Option<Sequence>,
    pub last_update: Option<Instant>,
    pub reports_applied: u64,
    pub(crate) closed: bool,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            axes: [0.0; AXIS_COUNT],
            buttons: ButtonSet::NONE,
            status: ConnectionStatus::Disconnected,
            sequence: None,
            last_update: None,
            reports_applied: 0,
            closed: false,
        }
    }
}

impl ControllerState {
    pub fn axis(&self, axis: Axis) -> f32 {
        self.axes[axis.index()]
    }

    pub fn is_pressed(&self, button: Button) -> bool {
        self.buttons.contains(button)
    }

    /// True once the session has been torn down or explicitly disconnected.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_names_round_trip() {
        for axis in Axis::ALL {
            assert_eq!(axis.as_str().parse::<Axis>().unwrap(), axis);
        }
    }

    #[test]
    fn test_unknown_names_are_rejected() {
        assert!(matches!(
            "left_z".parse::<Axis>(),
            Err(ControllerError::UnknownControl(name)) if name == "left_z"
        ));
        assert!(matches!(
            "turbo".parse::<Button>(),
            Err(ControllerError::UnknownControl(_))
        ));
    }

    #[test]
    fn test_button_aliases() {
        assert_eq!("c1".parse::<Button>().unwrap(), Button::Select);
        assert_eq!("c2".parse::<Button>().unwrap(), Button::Start);
    }

    #[test]
    fn test_button_set() {
        let set: ButtonSet = [Button::A, Button::DpadRight].into_iter().collect();
        assert!(set.contains(Button::A));
        assert!(set.contains(Button::DpadRight));
        assert!(!set.contains(Button::B));
        assert_eq!(set.iter().count(), 2);
        assert!(ButtonSet::NONE.is_empty());
    }

    #[test]
    fn test_sequence_ordering_wraps() {
        let seq = |v| Sequence::new(v, 8);
        assert!(seq(5).is_newer_than(seq(4)));
        assert!(!seq(4).is_newer_than(seq(4)));
        assert!(!seq(3).is_newer_than(seq(4)));
        assert!(seq(0).is_newer_than(seq(255)));
        assert!(seq(2).is_newer_than(seq(250)));
        assert!(!seq(250).is_newer_than(seq(2)));
    }

    #[test]
    fn test_default_state_is_disconnected_and_zeroed() {
        let state = ControllerState::default();
        assert_eq!(state.status, ConnectionStatus::Disconnected);
        assert!(state.axes.iter().all(|v| *v == 0.0));
        assert!(state.buttons.is_empty());
        assert!(!state.is_closed());
    }
}
