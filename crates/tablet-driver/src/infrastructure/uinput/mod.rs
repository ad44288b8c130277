//! [`UinputBackend`](crate::application::virtual_device::UinputBackend)
//! implementations.
//!
//! The evdev-backed adapter is selected at compile time on Linux.  A
//! `RecordingBackend` is always available for tests.

pub mod mock;

#[cfg(target_os = "linux")]
pub mod linux;
