//! # tablet-core
//!
//! Shared library for the reMarkable tablet driver: the input-event frame
//! schema, its binary codec, and the static calibration of the virtual pen.
//!
//! This crate has no dependencies on OS APIs, SSH, or uinput, so everything in
//! it is testable on any host.
//!
//! # Architecture overview (for beginners)
//!
//! The driver logs into the tablet over SSH, runs `cat` on the digitizer's
//! device node, and forwards every raw kernel input event it receives into a
//! virtual pen device created locally through uinput.  To the local desktop the
//! tablet then looks like a directly attached drawing tablet.
//!
//! - **`protocol`** – The fixed-width `input_event` frame in its two wire
//!   layouts, and the codec converting bytes to [`EventFrame`] and back.
//!
//! - **`domain`** – The pen's capability tables (event types, buttons,
//!   absolute axes with calibration) and its device identity.

pub mod domain;
pub mod protocol;

pub use domain::calibration::{AxisCalibration, PEN_AXES, PEN_BUTTONS, PEN_EVENT_TYPES};
pub use domain::identity::{DeviceIdentity, IdentityError, PEN_IDENTITY};
pub use protocol::codec::{decode_frame, encode_frame, encode_frame_into, ProtocolError};
pub use protocol::frame::{EventFrame, FrameLayout};
