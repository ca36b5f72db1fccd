//! Calibration & Normalization
//!
//! Maps raw axis values onto `[-1.0, 1.0]` (`[0.0, 1.0]` for triggers) and
//! resolves button bitmask bits to named buttons.

use crate::domain::error::ControllerError;
use crate::domain::models::{
    Axis, ButtonBit, ButtonSet, NormalizedReport, RawReport, AXIS_COUNT,
};

/// Center, deadzone and scale for one axis, all in raw units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisCalibration {
    pub center: f32,
    /// Any raw value with `|raw - center| <= deadzone` reads as exactly 0.0
    pub deadzone: f32,
    pub scale: f32,
}

impl AxisCalibration {
    pub const fn new(center: f32, deadzone: f32, scale: f32) -> Self {
        Self {
            center,
            deadzone,
            scale,
        }
    }

    /// Unsigned 8-bit stick centered at 128.
    pub const fn stick_u8(deadzone: f32) -> Self {
        Self::new(128.0, deadzone, 127.0)
    }

    /// Unsigned 10-bit stick centered at 512.
    pub const fn stick_u10(deadzone: f32) -> Self {
        Self::new(512.0, deadzone, 511.0)
    }

    /// 8-bit trigger resting at 0.
    pub const fn trigger_u8() -> Self {
        Self::new(0.0, 0.0, 255.0)
    }

    pub fn normalize(&self, raw: u16) -> f32 {
        let offset = raw as f32 - self.center;
        if offset.abs() <= self.deadzone {
            return 0.0;
        }
        (offset / self.scale).clamp(-1.0, 1.0)
    }

    fn validate(&self, axis: Axis) -> Result<(), ControllerError> {
        let reason = if !self.center.is_finite() {
            Some("center must be finite")
        } else if !self.scale.is_finite() || self.scale <= 0.0 {
            Some("scale must be a positive number")
        } else if !self.deadzone.is_finite() || self.deadzone < 0.0 {
            Some("deadzone must not be negative")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(ControllerError::InvalidCalibration { axis, reason }),
            None => Ok(()),
        }
    }
}

/// Per-axis calibration, fixed for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CalibrationProfile {
    axes: [Option<AxisCalibration>; AXIS_COUNT],
}

impl CalibrationProfile {
    pub fn new(
        entries: impl IntoIterator<Item = (Axis, AxisCalibration)>,
    ) -> Result<Self, ControllerError> {
        let mut profile = Self::default();
        for (axis, calibration) in entries {
            profile = profile.with_axis(axis, calibration)?;
        }
        Ok(profile)
    }

    /// Replace the calibration of one axis.
    pub fn with_axis(
        mut self,
        axis: Axis,
        calibration: AxisCalibration,
    ) -> Result<Self, ControllerError> {
        calibration.validate(axis)?;
        self.axes[axis.index()] = Some(calibration);
        Ok(self)
    }

    pub fn get(&self, axis: Axis) -> Option<&AxisCalibration> {
        self.axes[axis.index()].as_ref()
    }
}

/// Fold a raw report into normalized form.
///
/// Axes missing from the report or the profile read as 0.0. Bits without an
/// entry in `button_map` are ignored.
pub fn normalize(
    report: &RawReport,
    profile: &CalibrationProfile,
    button_map: &[ButtonBit],
) -> NormalizedReport {
    let mut axes = [0.0; AXIS_COUNT];
    for axis in Axis::ALL {
        if let (Some(raw), Some(calibration)) = (report.axis(axis), profile.get(axis)) {
            axes[axis.index()] = calibration.normalize(raw);
        }
    }

    let mask = report.buttons();
    let buttons: ButtonSet = button_map
        .iter()
        .filter(|entry| entry.bit < 32 && mask & (1 << entry.bit) != 0)
        .map(|entry| entry.button)
        .collect();

    NormalizedReport {
        axes,
        buttons,
        sequence: report.sequence(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Button;

    fn stick_report(value: u16) -> RawReport {
        let mut axes = [None; AXIS_COUNT];
        axes[Axis::LeftX.index()] = Some(value);
        RawReport::new(None, axes, 0, None)
    }

    #[test]
    fn test_extremes_saturate() {
        let cal = AxisCalibration::stick_u8(8.0);
        assert_eq!(cal.normalize(0), -1.0);
        assert_eq!(cal.normalize(255), 1.0);
    }

    #[test]
    fn test_all_byte_values_stay_in_range() {
        let cal = AxisCalibration::stick_u8(0.0);
        for raw in 0..=255u16 {
            let value = cal.normalize(raw);
            assert!((-1.0..=1.0).contains(&value), "raw {raw} -> {value}");
        }
    }

    #[test]
    fn test_deadzone_is_exactly_zero_and_symmetric() {
        let cal = AxisCalibration::stick_u8(8.0);
        for raw in 120..=136u16 {
            assert_eq!(cal.normalize(raw), 0.0, "raw {raw}");
        }
        let below = cal.normalize(119);
        let above = cal.normalize(137);
        assert!(below < 0.0 && above > 0.0);
        assert!((below + above).abs() < 1e-6);
    }

    #[test]
    fn test_outside_deadzone_is_linear() {
        let cal = AxisCalibration::stick_u8(0.0);
        assert!((cal.normalize(127) + 1.0 / 127.0).abs() < 1e-6);
        assert!((cal.normalize(191) - 63.0 / 127.0).abs() < 1e-6);
    }

    #[test]
    fn test_trigger_range() {
        let cal = AxisCalibration::trigger_u8();
        assert_eq!(cal.normalize(0), 0.0);
        assert_eq!(cal.normalize(255), 1.0);
    }

    #[test]
    fn test_ten_bit_stick_extremes() {
        let cal = AxisCalibration::stick_u10(16.0);
        assert_eq!(cal.normalize(0), -1.0);
        assert_eq!(cal.normalize(1023), 1.0);
        assert_eq!(cal.normalize(520), 0.0);
    }

    #[test]
    fn test_invalid_calibration_is_rejected() {
        let result = CalibrationProfile::new([(Axis::LeftX, AxisCalibration::new(128.0, 8.0, 0.0))]);
        assert!(matches!(
            result,
            Err(ControllerError::InvalidCalibration { axis: Axis::LeftX, .. })
        ));

        let result =
            CalibrationProfile::new([(Axis::LeftY, AxisCalibration::new(128.0, -1.0, 127.0))]);
        assert!(result.is_err());
    }

    #[test]
    fn test_normalize_maps_buttons_and_ignores_unmapped_bits() {
        let profile =
            CalibrationProfile::new([(Axis::LeftX, AxisCalibration::stick_u8(8.0))]).unwrap();
        let map = [ButtonBit::new(0, Button::A), ButtonBit::new(3, Button::Y)];
        let mut axes = [None; AXIS_COUNT];
        axes[Axis::LeftX.index()] = Some(255);
        let report = RawReport::new(None, axes, 0b1000_1001, None);

        let normalized = normalize(&report, &profile, &map);

        assert_eq!(normalized.axis(Axis::LeftX), 1.0);
        assert!(normalized.buttons.contains(Button::A));
        assert!(normalized.buttons.contains(Button::Y));
        assert_eq!(normalized.buttons.iter().count(), 2);
    }

    #[test]
    fn test_axis_without_calibration_reads_zero() {
        let report = stick_report(255);
        let normalized = normalize(&report, &CalibrationProfile::default(), &[]);
        assert_eq!(normalized.axis(Axis::LeftX), 0.0);
    }
}
