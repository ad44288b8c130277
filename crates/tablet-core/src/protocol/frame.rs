//! Input event frame and its wire layouts.
//!
//! # What is an event frame? (for beginners)
//!
//! The Linux kernel reports every input change (pen moved, pen touched the
//! screen, pressure changed) as a fixed-size `struct input_event`.  Reading a
//! device node such as `/dev/input/event1` yields a plain concatenation of
//! these structs, with no header, length prefix, or resynchronisation marker.
//! A "frame" in this crate is one such struct.
//!
//! The C struct is:
//!
//! ```text
//! struct input_event {
//!     struct timeval time;   // two `long`s: seconds, microseconds
//!     __u16 type;
//!     __u16 code;
//!     __s32 value;
//! };
//! ```
//!
//! Because `long` is 8 bytes on 64-bit targets and 4 bytes on 32-bit targets,
//! the frame width depends on the *producer's* ABI.  Rather than relying on the
//! producer and consumer sharing an in-memory layout, the driver names the two
//! layouts explicitly in [`FrameLayout`] and converts between them.
//!
//! All integers are little-endian (every platform the driver targets is LE).

use serde::{Deserialize, Serialize};

/// Size of a frame produced by a 64-bit kernel.
pub const WIDE_FRAME_SIZE: usize = 24;

/// Size of a frame produced by a 32-bit kernel.
pub const NARROW_FRAME_SIZE: usize = 16;

/// One decoded input event.
///
/// Timestamps are widened to `i64` so a frame decoded from either layout fits
/// the same type.  The relay does not interpret any field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventFrame {
    /// Seconds part of the kernel timestamp.
    pub seconds: i64,
    /// Microseconds part of the kernel timestamp.
    pub microseconds: i64,
    /// Event type (`EV_KEY`, `EV_ABS`, ...).
    pub event_type: u16,
    /// Event code within the type (`ABS_X`, `BTN_TOUCH`, ...).
    pub code: u16,
    /// Raw value reported by the digitizer.
    pub value: i32,
}

impl EventFrame {
    /// Creates a frame with a zero timestamp.
    ///
    /// The kernel stamps events written to uinput itself, so a zero timestamp
    /// is what synthetic events normally carry.
    pub fn new(event_type: u16, code: u16, value: i32) -> Self {
        Self {
            seconds: 0,
            microseconds: 0,
            event_type,
            code,
            value,
        }
    }
}

/// Binary layout of a frame on the wire.
///
/// | Layout     | Bytes | Field order                                        |
/// |------------|-------|----------------------------------------------------|
/// | `Wide64`   | 24    | `sec:i64 usec:i64 type:u16 code:u16 value:i32`     |
/// | `Narrow32` | 16    | `sec:i32 usec:i32 type:u16 code:u16 value:i32`     |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FrameLayout {
    /// 64-bit producer (`aarch64`, `x86_64`).  Also the default remote layout.
    #[default]
    #[serde(rename = "wide64")]
    Wide64,
    /// 32-bit producer (`armv7`, e.g. the reMarkable 2).
    #[serde(rename = "narrow32")]
    Narrow32,
}

impl FrameLayout {
    /// Number of bytes one frame occupies in this layout.
    pub const fn frame_size(self) -> usize {
        match self {
            FrameLayout::Wide64 => WIDE_FRAME_SIZE,
            FrameLayout::Narrow32 => NARROW_FRAME_SIZE,
        }
    }

    /// Width in bytes of each timestamp field.
    pub(crate) const fn time_field_size(self) -> usize {
        match self {
            FrameLayout::Wide64 => 8,
            FrameLayout::Narrow32 => 4,
        }
    }

    /// The layout of `struct input_event` on the machine running this code.
    ///
    /// This is what the local uinput endpoint expects to receive.
    pub const fn native() -> Self {
        #[cfg(target_pointer_width = "64")]
        {
            FrameLayout::Wide64
        }
        #[cfg(not(target_pointer_width = "64"))]
        {
            FrameLayout::Narrow32
        }
    }

    /// Short name used in configuration files and on the command line.
    pub const fn as_str(self) -> &'static str {
        match self {
            FrameLayout::Wide64 => "wide64",
            FrameLayout::Narrow32 => "narrow32",
        }
    }
}

impl std::fmt::Display for FrameLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FrameLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wide64" => Ok(FrameLayout::Wide64),
            "narrow32" => Ok(FrameLayout::Narrow32),
            other => Err(format!(
                "unknown frame layout '{other}' (expected 'wide64' or 'narrow32')"
            )),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wide_layout_is_24_bytes() {
        assert_eq!(FrameLayout::Wide64.frame_size(), 24);
    }

    #[test]
    fn test_narrow_layout_is_16_bytes() {
        assert_eq!(FrameLayout::Narrow32.frame_size(), 16);
    }

    #[test]
    fn test_default_layout_is_wide() {
        assert_eq!(FrameLayout::default(), FrameLayout::Wide64);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_native_layout_on_64_bit_host_is_wide() {
        assert_eq!(FrameLayout::native(), FrameLayout::Wide64);
    }

    #[test]
    fn test_native_layout_matches_libc_timeval_width() {
        // `long` is pointer-sized on every Linux ABI the driver supports.
        assert_eq!(
            FrameLayout::native().time_field_size(),
            std::mem::size_of::<usize>()
        );
    }

    #[test]
    fn test_layout_parses_from_config_names() {
        assert_eq!("wide64".parse::<FrameLayout>().unwrap(), FrameLayout::Wide64);
        assert_eq!(
            "narrow32".parse::<FrameLayout>().unwrap(),
            FrameLayout::Narrow32
        );
    }

    #[test]
    fn test_layout_parse_rejects_unknown_name() {
        let err = "wide".parse::<FrameLayout>().unwrap_err();
        assert!(err.contains("wide"));
    }

    #[test]
    fn test_layout_display_matches_parse_name() {
        for layout in [FrameLayout::Wide64, FrameLayout::Narrow32] {
            assert_eq!(layout.to_string().parse::<FrameLayout>().unwrap(), layout);
        }
    }

    #[test]
    fn test_event_frame_new_has_zero_timestamp() {
        let frame = EventFrame::new(3, 0, 1200);
        assert_eq!(frame.seconds, 0);
        assert_eq!(frame.microseconds, 0);
        assert_eq!(frame.value, 1200);
    }
}
