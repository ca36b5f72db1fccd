//! Controller Report Protocol
//!
//! Frame layouts and the stateless decoder turning one notification payload
//! into a [`RawReport`].
//!
//! Offsets are per-device constants found by observing the controller, not a
//! documented protocol. A new firmware revision gets a new [`FrameLayout`].

use crate::domain::calibration::{AxisCalibration, CalibrationProfile};
use crate::domain::error::{ControllerError, FrameError};
use crate::domain::models::{Axis, Button, ButtonBit, RawReport, Sequence, AXIS_COUNT};
use crate::domain::settings::{AxisOverride, LayoutPreset};
use tracing::trace;

/// GameSir T1d characteristic that carries input reports.
pub const T1D_INPUT_CHAR_UUID: &str = "00008651-0000-1000-8000-00805f9b34fb";

/// Advertised name prefix of the GameSir T1d.
pub const T1D_NAME_PREFIX: &str = "Gamesir-T1d";

/// Where an axis value lives inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisSource {
    /// One unsigned byte
    Byte { offset: usize },
    /// Unsigned big-endian bit field, counted from the MSB of byte 0
    Bits { bit_offset: usize, width: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisField {
    pub axis: Axis,
    pub source: AxisSource,
    pub calibration: AxisCalibration,
}

/// D-pad reported as a single hat value (0 neutral, 1 up, then clockwise).
/// Directions are folded into the button bitmask at `first_bit`
/// (up, down, left, right).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HatField {
    pub offset: usize,
    pub first_bit: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceField {
    pub offset: usize,
}

/// Fixed-offset description of one controller report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameLayout {
    pub name: &'static str,
    pub length: usize,
    /// Expected first byte of every frame
    pub report_id: Option<u8>,
    /// In joystick index order
    pub axes: &'static [AxisField],
    /// Bytes forming the button bitmask, least significant first
    pub button_bytes: &'static [usize],
    pub hat: Option<HatField>,
    /// In joystick index order; hat directions come last
    pub buttons: &'static [ButtonBit],
    pub sequence: Option<SequenceField>,
}

/// Seven byte report: id, four 8-bit sticks, 16-bit little-endian buttons.
pub const COMPACT: FrameLayout = FrameLayout {
    name: "compact",
    length: 7,
    report_id: Some(0x01),
    axes: &COMPACT_AXES,
    button_bytes: &[5, 6],
    hat: None,
    buttons: &COMPACT_BUTTONS,
    sequence: None,
};

/// [`COMPACT`] followed by an 8-bit frame counter.
pub const COMPACT_SEQUENCED: FrameLayout = FrameLayout {
    name: "compact_sequenced",
    length: 8,
    report_id: Some(0x02),
    axes: &COMPACT_AXES,
    button_bytes: &[5, 6],
    hat: None,
    buttons: &COMPACT_BUTTONS,
    sequence: Some(SequenceField { offset: 7 }),
};

/// GameSir T1d input report.
///
/// ```text
/// [0]     : Report id (0xA1)
/// [1]     : Unknown
/// [2-6]   : Sticks, four 10-bit fields packed MSB first (LX, LY, RX, RY)
/// [7]     : L2 trigger (0-255)
/// [8]     : R2 trigger (0-255)
/// [9]     : Buttons  bit 0: A, 1: B, 2: Menu, 3: X, 4: Y, 6: L1, 7: R1
/// [10]    : Buttons  bit 2: C1, 3: C2
/// [11]    : D-pad hat
/// [12-19] : Unused
/// ```
pub const GAMESIR_T1D: FrameLayout = FrameLayout {
    name: "gamesir_t1d",
    length: 20,
    report_id: Some(0xA1),
    axes: &T1D_AXES,
    button_bytes: &[9, 10],
    hat: Some(HatField {
        offset: 11,
        first_bit: 16,
    }),
    buttons: &T1D_BUTTONS,
    sequence: None,
};

const COMPACT_STICK: AxisCalibration = AxisCalibration::stick_u8(8.0);

const COMPACT_AXES: [AxisField; 4] = [
    AxisField {
        axis: Axis::LeftX,
        source: AxisSource::Byte { offset: 1 },
        calibration: COMPACT_STICK,
    },
    AxisField {
        axis: Axis::LeftY,
        source: AxisSource::Byte { offset: 2 },
        calibration: COMPACT_STICK,
    },
    AxisField {
        axis: Axis::RightX,
        source: AxisSource::Byte { offset: 3 },
        calibration: COMPACT_STICK,
    },
    AxisField {
        axis: Axis::RightY,
        source: AxisSource::Byte { offset: 4 },
        calibration: COMPACT_STICK,
    },
];

const COMPACT_BUTTONS: [ButtonBit; 15] = [
    ButtonBit::new(0, Button::A),
    ButtonBit::new(1, Button::B),
    ButtonBit::new(2, Button::X),
    ButtonBit::new(3, Button::Y),
    ButtonBit::new(4, Button::L1),
    ButtonBit::new(5, Button::R1),
    ButtonBit::new(6, Button::Select),
    ButtonBit::new(7, Button::Start),
    ButtonBit::new(8, Button::Menu),
    ButtonBit::new(9, Button::LeftStick),
    ButtonBit::new(10, Button::RightStick),
    ButtonBit::new(11, Button::DpadUp),
    ButtonBit::new(12, Button::DpadDown),
    ButtonBit::new(13, Button::DpadLeft),
    ButtonBit::new(14, Button::DpadRight),
];

const T1D_STICK: AxisCalibration = AxisCalibration::stick_u10(32.0);

const T1D_AXES: [AxisField; 6] = [
    AxisField {
        axis: Axis::LeftX,
        source: AxisSource::Bits {
            bit_offset: 16,
            width: 10,
        },
        calibration: T1D_STICK,
    },
    AxisField {
        axis: Axis::LeftY,
        source: AxisSource::Bits {
            bit_offset: 26,
            width: 10,
        },
        calibration: T1D_STICK,
    },
    AxisField {
        axis: Axis::RightX,
        source: AxisSource::Bits {
            bit_offset: 36,
            width: 10,
        },
        calibration: T1D_STICK,
    },
    AxisField {
        axis: Axis::RightY,
        source: AxisSource::Bits {
            bit_offset: 46,
            width: 10,
        },
        calibration: T1D_STICK,
    },
    AxisField {
        axis: Axis::LeftTrigger,
        source: AxisSource::Byte { offset: 7 },
        calibration: AxisCalibration::trigger_u8(),
    },
    AxisField {
        axis: Axis::RightTrigger,
        source: AxisSource::Byte { offset: 8 },
        calibration: AxisCalibration::trigger_u8(),
    },
];

const T1D_BUTTONS: [ButtonBit; 13] = [
    ButtonBit::new(0, Button::A),
    ButtonBit::new(1, Button::B),
    ButtonBit::new(3, Button::X),
    ButtonBit::new(4, Button::Y),
    ButtonBit::new(6, Button::L1),
    ButtonBit::new(7, Button::R1),
    ButtonBit::new(2, Button::Menu),
    ButtonBit::new(10, Button::Select),
    ButtonBit::new(11, Button::Start),
    ButtonBit::new(16, Button::DpadUp),
    ButtonBit::new(17, Button::DpadDown),
    ButtonBit::new(18, Button::DpadLeft),
    ButtonBit::new(19, Button::DpadRight),
];

impl FrameLayout {
    pub fn for_preset(preset: LayoutPreset) -> &'static FrameLayout {
        match preset {
            LayoutPreset::Compact => &COMPACT,
            LayoutPreset::CompactSequenced => &COMPACT_SEQUENCED,
            LayoutPreset::GamesirT1d => &GAMESIR_T1D,
        }
    }

    pub fn provides_axis(&self, axis: Axis) -> bool {
        self.axes.iter().any(|field| field.axis == axis)
    }

    pub fn provides_button(&self, button: Button) -> bool {
        self.buttons.iter().any(|entry| entry.button == button)
    }

    /// Buttons addressable by index. Hat directions are reported through the
    /// hat instead.
    pub fn indexed_buttons(&self) -> impl Iterator<Item = Button> + '_ {
        self.buttons
            .iter()
            .filter(|entry| !self.is_hat_bit(entry.bit))
            .map(|entry| entry.button)
    }

    pub fn has_dpad(&self) -> bool {
        [
            Button::DpadUp,
            Button::DpadDown,
            Button::DpadLeft,
            Button::DpadRight,
        ]
        .into_iter()
        .all(|button| self.provides_button(button))
    }

    fn is_hat_bit(&self, bit: u8) -> bool {
        self.hat
            .map(|hat| (hat.first_bit..hat.first_bit + 4).contains(&bit))
            .unwrap_or(false)
    }

    /// Built-in calibration for this layout with `overrides` applied.
    pub fn calibration_profile(
        &self,
        overrides: &[AxisOverride],
    ) -> Result<CalibrationProfile, ControllerError> {
        let mut profile =
            CalibrationProfile::new(self.axes.iter().map(|field| (field.axis, field.calibration)))?;

        for entry in overrides {
            let Some(field) = self.axes.iter().find(|field| field.axis == entry.axis) else {
                return Err(ControllerError::UnknownControl(format!(
                    "{} (not provided by the {} layout)",
                    entry.axis, self.name
                )));
            };
            let base = field.calibration;
            profile = profile.with_axis(
                entry.axis,
                AxisCalibration::new(
                    entry.center.unwrap_or(base.center),
                    entry.deadzone.unwrap_or(base.deadzone),
                    entry.scale.unwrap_or(base.scale),
                ),
            )?;
        }
        Ok(profile)
    }

    /// Decode one notification payload.
    pub fn decode(&self, bytes: &[u8]) -> Result<RawReport, FrameError> {
        if bytes.len() != self.length {
            return Err(FrameError::MalformedFrame {
                expected: self.length,
                actual: bytes.len(),
            });
        }

        #[cfg(debug_assertions)]
        trace!("Raw packet: {:02X?}", bytes);

        if let Some(expected) = self.report_id {
            if bytes[0] != expected {
                return Err(FrameError::UnknownReportType(bytes[0]));
            }
        }

        let mut axes = [None; AXIS_COUNT];
        for field in self.axes {
            let value = match field.source {
                AxisSource::Byte { offset } => bytes[offset] as u16,
                AxisSource::Bits { bit_offset, width } => read_bits(bytes, bit_offset, width),
            };
            axes[field.axis.index()] = Some(value);
        }

        let mut buttons = self
            .button_bytes
            .iter()
            .enumerate()
            .fold(0u32, |mask, (i, &offset)| mask | (bytes[offset] as u32) << (8 * i));

        if let Some(hat) = self.hat {
            buttons |= hat_bits(bytes[hat.offset]) << hat.first_bit;
        }

        let sequence = self
            .sequence
            .map(|field| Sequence::new(bytes[field.offset] as u32, 8));

        Ok(RawReport::new(self.report_id, axes, buttons, sequence))
    }
}

/// Read `width` bits starting at `bit_offset`, most significant bit first.
fn read_bits(bytes: &[u8], bit_offset: usize, width: u8) -> u16 {
    (bit_offset..bit_offset + width as usize).fold(0u16, |value, bit| {
        let set = (bytes[bit / 8] >> (7 - bit % 8)) & 1;
        (value << 1) | set as u16
    })
}

/// Hat value to direction bits (up, down, left, right).
fn hat_bits(value: u8) -> u32 {
    const UP: u32 = 0b0001;
    const DOWN: u32 = 0b0010;
    const LEFT: u32 = 0b0100;
    const RIGHT: u32 = 0b1000;

    match value {
        1 => UP,
        2 => UP | RIGHT,
        3 => RIGHT,
        4 => DOWN | RIGHT,
        5 => DOWN,
        6 => DOWN | LEFT,
        7 => LEFT,
        8 => UP | LEFT,
        _ => 0,
    }
}
