//! tablet-driver library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does tablet-driver do? (for beginners)
//!
//! A reMarkable tablet runs Linux, and its pen digitizer shows up there as an
//! ordinary evdev node.  This driver turns the tablet into a drawing tablet
//! for a Linux desktop without any software on the tablet itself:
//!
//! 1. Opens an SSH session to the tablet (USB networking address by default).
//! 2. Runs `readlink -f /dev/input/touchscreen0` to find the digitizer node.
//! 3. Runs `cat <node>` and keeps that channel open for the whole session.
//! 4. Creates a local virtual pen through `/dev/uinput` with the tablet's
//!    axis ranges and resolutions.
//! 5. Reassembles the raw `input_event` frames arriving over SSH and writes
//!    each one, unchanged, to the virtual pen.
//!
//! When the stream ends, or anything fails, the pen, the channel, and the
//! session are released in that order.

/// Application layer: the relay pipeline and its seams.
pub mod application;

/// Infrastructure layer: SSH, uinput, and configuration adapters.
pub mod infrastructure;
