//! uinput backend built on the `evdev` crate.
//!
//! # What is uinput? (for beginners)
//!
//! `/dev/uinput` lets a user-space process create an input device that the
//! kernel treats like real hardware.  The process declares which event types,
//! keys and axes the device supports, finalises it, and from then on every
//! `struct input_event` it writes to the file descriptor is delivered to the
//! desktop as if a tablet had produced it.
//!
//! `evdev::uinput::VirtualDeviceBuilder` wraps the declaration ioctls.  Frame
//! writes do not go through `VirtualDevice::emit`, because `emit` appends its
//! own `SYN_REPORT` after every batch and the tablet's stream already carries
//! its own.  Instead the relayed bytes are written verbatim to the device's
//! file descriptor with `libc::write`.
//!
//! # Permissions
//!
//! Opening `/dev/uinput` usually needs root or membership in the `input`
//! group (or a udev rule granting access).

use std::io;
use std::os::fd::AsRawFd;

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{
    AbsInfo, AbsoluteAxisType, AttributeSet, BusType, InputId, Key, UinputAbsSetup,
};
use tablet_core::protocol::codes::{EV_ABS, EV_KEY};
use tablet_core::{AxisCalibration, DeviceIdentity};
use tracing::debug;

use crate::application::virtual_device::{BackendError, UinputBackend};

/// Virtual pen backed by `/dev/uinput`.
#[derive(Default)]
pub struct EvdevBackend {
    builder: Option<VirtualDeviceBuilder<'static>>,
    device: Option<VirtualDevice>,
    declared: Declarations,
}

/// What has been declared on the pending builder.
///
/// `VirtualDeviceBuilder` has no call for a bare event type: the EV bit is
/// set as a side effect of adding keys or axes.  A declared type is only real
/// once at least one code of that type has been added, which
/// [`Declarations::check`] enforces before the device is built.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Declarations {
    pub event_types: Vec<u16>,
    pub keys: usize,
    pub axes: usize,
}

impl Declarations {
    /// Fails if a declared event type has no key or axis behind it.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Rejected`] naming the empty event type.
    pub fn check(&self) -> Result<(), BackendError> {
        for &event_type in &self.event_types {
            let backed = match event_type {
                EV_KEY => self.keys,
                EV_ABS => self.axes,
                _ => 0,
            };
            if backed == 0 {
                return Err(BackendError::Rejected(format!(
                    "event type 0x{event_type:02X} was declared but no codes were added"
                )));
            }
        }
        Ok(())
    }
}

impl EvdevBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `f` to the pending builder.
    ///
    /// The builder's methods consume it, so it is taken out and put back.
    fn configure<F>(&mut self, f: F) -> Result<(), BackendError>
    where
        F: FnOnce(VirtualDeviceBuilder<'static>) -> io::Result<VirtualDeviceBuilder<'static>>,
    {
        let builder = self
            .builder
            .take()
            .ok_or_else(|| BackendError::Rejected("uinput endpoint is not open".to_string()))?;
        self.builder = Some(f(builder)?);
        Ok(())
    }
}

impl UinputBackend for EvdevBackend {
    fn open(&mut self) -> Result<(), BackendError> {
        self.builder = Some(VirtualDeviceBuilder::new()?);
        self.declared = Declarations::default();
        debug!("opened /dev/uinput");
        Ok(())
    }

    fn enable_event_type(&mut self, event_type: u16) -> Result<(), BackendError> {
        // Recorded only; the builder sets the EV bit when codes are added.
        match event_type {
            EV_KEY | EV_ABS if self.builder.is_some() => {
                self.declared.event_types.push(event_type);
                Ok(())
            }
            EV_KEY | EV_ABS => Err(BackendError::Rejected(
                "uinput endpoint is not open".to_string(),
            )),
            other => Err(BackendError::Rejected(format!(
                "event type 0x{other:02X} is not supported by the virtual pen"
            ))),
        }
    }

    fn enable_key(&mut self, code: u16) -> Result<(), BackendError> {
        let mut keys = AttributeSet::<Key>::new();
        keys.insert(Key::new(code));
        self.configure(|b| b.with_keys(&keys))?;
        self.declared.keys += 1;
        Ok(())
    }

    fn enable_abs_axis(&mut self, axis: &AxisCalibration) -> Result<(), BackendError> {
        let info = AbsInfo::new(
            axis.value,
            axis.minimum,
            axis.maximum,
            axis.fuzz,
            axis.flat,
            axis.resolution,
        );
        let setup = UinputAbsSetup::new(AbsoluteAxisType(axis.code), info);
        self.configure(|b| b.with_absolute_axis(&setup))?;
        self.declared.axes += 1;
        Ok(())
    }

    fn set_identity(&mut self, identity: &DeviceIdentity) -> Result<(), BackendError> {
        let id = InputId::new(
            BusType(identity.bus_type),
            identity.vendor,
            identity.product,
            identity.version,
        );
        let name: &'static str = identity.name;
        self.configure(|b| Ok(b.name(name).input_id(id)))
    }

    fn create(&mut self) -> Result<(), BackendError> {
        self.declared.check()?;
        let builder = self
            .builder
            .take()
            .ok_or_else(|| BackendError::Rejected("uinput endpoint is not open".to_string()))?;
        self.device = Some(builder.build()?);
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), BackendError> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| BackendError::Rejected("virtual pen is not created".to_string()))?;
        // SAFETY: the fd is owned by `device`, which outlives this call, and the
        // pointer/length pair comes from a valid slice.
        let written = unsafe {
            libc::write(
                device.as_raw_fd(),
                bytes.as_ptr().cast::<libc::c_void>(),
                bytes.len(),
            )
        };
        if written < 0 {
            return Err(io::Error::last_os_error().into());
        }
        if written as usize != bytes.len() {
            return Err(BackendError::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short uinput write: {written} of {} bytes", bytes.len()),
            )));
        }
        Ok(())
    }

    fn destroy(&mut self) {
        // Dropping the device closes the fd, which makes the kernel remove it.
        self.device = None;
        self.builder = None;
    }
}
