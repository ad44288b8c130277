//! Linux input event codes used by the virtual pen.
//!
//! Only the handful of codes the driver registers are listed here.  The relay
//! itself never inspects the codes of forwarded frames; these constants exist
//! so the capability tables in [`crate::domain`] can name what they declare.
//!
//! Values match `linux/input-event-codes.h` and `linux/input.h`.

// ── Event types ───────────────────────────────────────────────────────────────

/// Synchronisation marker (`EV_SYN`).  Terminates one hardware report.
pub const EV_SYN: u16 = 0x00;
/// Key and button state changes (`EV_KEY`).
pub const EV_KEY: u16 = 0x01;
/// Absolute axis changes (`EV_ABS`).
pub const EV_ABS: u16 = 0x03;

/// `SYN_REPORT` code within `EV_SYN`.
pub const SYN_REPORT: u16 = 0x00;

// ── Buttons ───────────────────────────────────────────────────────────────────

/// Pen is within hover range of the digitizer.
pub const BTN_TOOL_PEN: u16 = 0x140;
/// Pen tip is in contact with the surface.
pub const BTN_TOUCH: u16 = 0x14a;
/// Barrel button.  Declared so libinput accepts the device as a tablet tool.
pub const BTN_STYLUS: u16 = 0x14b;

// ── Absolute axes ─────────────────────────────────────────────────────────────

pub const ABS_X: u16 = 0x00;
pub const ABS_Y: u16 = 0x01;
pub const ABS_PRESSURE: u16 = 0x18;
pub const ABS_DISTANCE: u16 = 0x19;
pub const ABS_TILT_X: u16 = 0x1a;
pub const ABS_TILT_Y: u16 = 0x1b;

// ── Bus types ─────────────────────────────────────────────────────────────────

/// `BUS_VIRTUAL` from `linux/input.h`.
pub const BUS_VIRTUAL: u16 = 0x06;

/// Human-readable label for the event types the driver declares.
///
/// Used in log lines and error messages; unknown values fall back to hex.
pub fn event_type_name(event_type: u16) -> String {
    match event_type {
        EV_SYN => "EV_SYN".to_string(),
        EV_KEY => "EV_KEY".to_string(),
        EV_ABS => "EV_ABS".to_string(),
        other => format!("0x{other:02X}"),
    }
}
