//! Absolute-axis calibration for the virtual pen.
//!
//! # What is axis calibration? (for beginners)
//!
//! An *absolute axis* reports a position within a fixed range instead of a
//! relative movement.  When a virtual device declares an absolute axis, it must
//! tell the kernel the range (`minimum..=maximum`) and the *resolution*, i.e. how
//! many units correspond to one millimetre (or one radian for tilt).  Drawing
//! applications use the resolution to map pen coordinates onto the screen with
//! the right aspect ratio.
//!
//! The values below describe the reMarkable digitizer.  They never change at
//! runtime, so they are plain `const` data.
//!
//! | Axis         | Range           | Resolution       | Initial |
//! |--------------|-----------------|------------------|---------|
//! | ABS_PRESSURE | 0..=4095        | 0                | 0       |
//! | ABS_DISTANCE | 0..=255         | 0                | 95      |
//! | ABS_TILT_X   | -9000..=9000    | 5074 units/rad   | 0       |
//! | ABS_TILT_Y   | -9000..=9000    | 5074 units/rad   | 0       |
//! | ABS_X        | 0..=20967       | 100 units/mm     | 11344   |
//! | ABS_Y        | 0..=15725       | 100 units/mm     | 10471   |

use crate::protocol::codes::{
    ABS_DISTANCE, ABS_PRESSURE, ABS_TILT_X, ABS_TILT_Y, ABS_X, ABS_Y, BTN_STYLUS, BTN_TOOL_PEN,
    BTN_TOUCH, EV_ABS, EV_KEY,
};

// ── Panel geometry ────────────────────────────────────────────────────────────

/// Largest X coordinate the digitizer reports.
pub const PANEL_MAX_X: i32 = 20967;

/// Largest Y coordinate the digitizer reports.
pub const PANEL_MAX_Y: i32 = 15725;

/// Physical length of the panel's long side, in millimetres.
pub const PANEL_LENGTH_MM: i32 = 210;

/// Position resolution in units per millimetre.
///
/// `max(PANEL_MAX_X, PANEL_MAX_Y) / PANEL_LENGTH_MM`, rounded to the nearest
/// integer (99.84 -> 100).  Both position axes share it.
pub const POSITION_RESOLUTION: i32 = div_round(max_i32(PANEL_MAX_X, PANEL_MAX_Y), PANEL_LENGTH_MM);

/// Largest tilt magnitude the pen reports on either axis.
pub const TILT_RANGE: i32 = 9000;

/// Tilt resolution in units per radian, as measured on the device.
pub const TILT_RESOLUTION: i32 = 5074;

/// Largest pressure value.
pub const PRESSURE_MAX: i32 = 4095;

/// Largest hover distance value.
pub const DISTANCE_MAX: i32 = 255;

const fn max_i32(a: i32, b: i32) -> i32 {
    if a > b {
        a
    } else {
        b
    }
}

/// Integer division rounded half away from zero, usable in `const` context.
const fn div_round(numerator: i32, denominator: i32) -> i32 {
    (numerator + denominator / 2) / denominator
}

// ── Descriptor ────────────────────────────────────────────────────────────────

/// Calibration of one absolute axis, mirroring the kernel's `input_absinfo`
/// plus the axis code it applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisCalibration {
    /// `ABS_*` code of the axis.
    pub code: u16,
    /// Value the axis reports before the first event arrives.
    pub value: i32,
    pub minimum: i32,
    pub maximum: i32,
    /// Units per millimetre (position) or per radian (tilt); 0 if unknown.
    pub resolution: i32,
    /// Noise filter width; 0 disables filtering.
    pub fuzz: i32,
    /// Dead zone around the centre; 0 disables it.
    pub flat: i32,
}

impl AxisCalibration {
    /// Creates a descriptor with no fuzz and no flat zone.
    pub const fn new(code: u16, value: i32, minimum: i32, maximum: i32, resolution: i32) -> Self {
        Self {
            code,
            value,
            minimum,
            maximum,
            resolution,
            fuzz: 0,
            flat: 0,
        }
    }

    /// Returns `true` if the range is non-empty and the initial value lies in it.
    pub fn is_consistent(&self) -> bool {
        self.minimum <= self.maximum && (self.minimum..=self.maximum).contains(&self.value)
    }
}

// ── Pen capability tables ─────────────────────────────────────────────────────

/// Event categories the virtual pen declares, in registration order.
pub const PEN_EVENT_TYPES: [u16; 2] = [EV_KEY, EV_ABS];

/// Button codes the virtual pen declares.
///
/// `BTN_STYLUS` is never emitted by the tablet; libinput refuses to treat a
/// device as a tablet tool without it.
pub const PEN_BUTTONS: [u16; 3] = [BTN_TOOL_PEN, BTN_TOUCH, BTN_STYLUS];

/// Absolute axes of the virtual pen, in registration order.
pub const PEN_AXES: [AxisCalibration; 6] = [
    AxisCalibration::new(ABS_PRESSURE, 0, 0, PRESSURE_MAX, 0),
    AxisCalibration::new(ABS_DISTANCE, 95, 0, DISTANCE_MAX, 0),
    AxisCalibration::new(ABS_TILT_X, 0, -TILT_RANGE, TILT_RANGE, TILT_RESOLUTION),
    AxisCalibration::new(ABS_TILT_Y, 0, -TILT_RANGE, TILT_RANGE, TILT_RESOLUTION),
    AxisCalibration::new(ABS_X, 11344, 0, PANEL_MAX_X, POSITION_RESOLUTION),
    AxisCalibration::new(ABS_Y, 10471, 0, PANEL_MAX_Y, POSITION_RESOLUTION),
];

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_position_resolution_rounds_to_100_units_per_mm() {
        assert_eq!(POSITION_RESOLUTION, 100);
    }

    #[test]
    fn test_div_round_rounds_half_up() {
        assert_eq!(div_round(5, 2), 3);
        assert_eq!(div_round(4, 2), 2);
        assert_eq!(div_round(20967, 210), 100);
    }

    #[test]
    fn test_every_pen_axis_is_consistent() {
        for axis in PEN_AXES {
            assert!(axis.is_consistent(), "axis 0x{:02X} inconsistent", axis.code);
        }
    }

    #[test]
    fn test_pen_axes_are_unique() {
        let codes: HashSet<u16> = PEN_AXES.iter().map(|a| a.code).collect();
        assert_eq!(codes.len(), PEN_AXES.len());
    }

    #[test]
    fn test_tilt_axes_are_symmetric() {
        for code in [ABS_TILT_X, ABS_TILT_Y] {
            let axis = PEN_AXES.iter().find(|a| a.code == code).unwrap();
            assert_eq!(axis.minimum, -axis.maximum);
            assert_eq!(axis.resolution, TILT_RESOLUTION);
        }
    }

    #[test]
    fn test_position_axes_share_resolution() {
        let x = PEN_AXES.iter().find(|a| a.code == ABS_X).unwrap();
        let y = PEN_AXES.iter().find(|a| a.code == ABS_Y).unwrap();
        assert_eq!(x.resolution, y.resolution);
        assert_eq!(x.maximum, PANEL_MAX_X);
        assert_eq!(y.maximum, PANEL_MAX_Y);
    }

    #[test]
    fn test_distance_axis_starts_hovering() {
        let distance = PEN_AXES.iter().find(|a| a.code == ABS_DISTANCE).unwrap();
        assert_eq!(distance.value, 95);
    }

    #[test]
    fn test_is_consistent_rejects_value_outside_range() {
        let axis = AxisCalibration::new(ABS_X, 500, 0, 100, 0);
        assert!(!axis.is_consistent());
    }

    #[test]
    fn test_pen_declares_key_events_before_abs_events() {
        assert_eq!(PEN_EVENT_TYPES, [EV_KEY, EV_ABS]);
    }

    #[test]
    fn test_pen_buttons_include_stylus_for_libinput() {
        assert!(PEN_BUTTONS.contains(&BTN_STYLUS));
    }
}
