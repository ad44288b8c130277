//! Identity metadata of the virtual pen device.
//!
//! Graphics applications such as Krita classify input devices by *name*: a
//! device whose name ends in "pen" is treated as a stylus and gets pressure and
//! tilt handling.  The name is therefore not cosmetic, and [`DeviceIdentity::validate`]
//! rejects names that would silently downgrade the tablet to a mouse.

use thiserror::Error;

use crate::protocol::codes::BUS_VIRTUAL;

/// Suffix downstream applications match on (case-insensitive).
pub const PEN_NAME_SUFFIX: &str = "pen";

/// Size of the kernel's `uinput_setup.name` buffer, including the NUL terminator.
pub const UINPUT_MAX_NAME_SIZE: usize = 80;

/// Errors returned by [`DeviceIdentity::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("device name is empty")]
    EmptyName,

    #[error("device name '{0}' must end with \"pen\" to be recognised as a stylus")]
    MissingPenSuffix(String),

    #[error("device name is {len} bytes; uinput allows at most {max}")]
    NameTooLong { len: usize, max: usize },

    #[error("device name contains a NUL byte")]
    InteriorNul,
}

/// Bus, vendor, product, version and name reported to the input stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub name: &'static str,
    pub bus_type: u16,
    pub vendor: u16,
    pub product: u16,
    pub version: u16,
}

/// Identity of the reMarkable virtual pen.
pub const PEN_IDENTITY: DeviceIdentity = DeviceIdentity {
    name: "reMarkableTablet-FakePen",
    bus_type: BUS_VIRTUAL,
    vendor: 0,
    product: 0,
    version: 0x3,
};

impl DeviceIdentity {
    /// Checks the name against the kernel limit and the "pen" suffix rule.
    ///
    /// # Errors
    ///
    /// Returns the first [`IdentityError`] that applies.
    pub fn validate(&self) -> Result<(), IdentityError> {
        if self.name.is_empty() {
            return Err(IdentityError::EmptyName);
        }
        if self.name.contains('\0') {
            return Err(IdentityError::InteriorNul);
        }
        // One byte is reserved for the terminator.
        if self.name.len() >= UINPUT_MAX_NAME_SIZE {
            return Err(IdentityError::NameTooLong {
                len: self.name.len(),
                max: UINPUT_MAX_NAME_SIZE - 1,
            });
        }
        if !self.name.to_ascii_lowercase().ends_with(PEN_NAME_SUFFIX) {
            return Err(IdentityError::MissingPenSuffix(self.name.to_string()));
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
