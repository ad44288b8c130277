//! Static description of the virtual pen.
//!
//! Pure data with no OS dependencies: the capability tables registered with
//! uinput and the identity the device reports.  The driver crate feeds these
//! into its `UinputBackend`; tests can inspect them on any platform.

/// Axis ranges, resolutions and the button/event-type tables.
pub mod calibration;

/// Name, bus and version reported by the virtual device.
pub mod identity;
