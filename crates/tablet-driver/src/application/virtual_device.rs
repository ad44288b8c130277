//! Lifecycle of the local virtual pen.
//!
//! [`VirtualDeviceManager`] drives a [`UinputBackend`] through the fixed setup
//! sequence, forwards frames once the device exists, and tears it down.  The
//! backend is the only part that touches the OS; the manager owns ordering,
//! rollback, and the layout conversion for writes.
//!
//! # Setup sequence
//!
//! | Step                  | Backend call(s)                            |
//! |-----------------------|--------------------------------------------|
//! | `Open`                | `open`                                     |
//! | `DeclareEventTypes`   | `enable_event_type` for EV_KEY, EV_ABS     |
//! | `DeclareKeys`         | `enable_key` for each pen button           |
//! | `RegisterAxes`        | `enable_abs_axis` for each calibrated axis |
//! | `SetIdentity`         | `set_identity`                             |
//! | `Finalize`            | `create`                                   |
//!
//! A failure at any step releases what was allocated; `create` is never called
//! after an earlier failure.

use std::fmt;

use tablet_core::{
    encode_frame_into, AxisCalibration, DeviceIdentity, EventFrame, FrameLayout, IdentityError,
    PEN_AXES, PEN_BUTTONS, PEN_EVENT_TYPES, PEN_IDENTITY,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors reported by a [`UinputBackend`].
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("uinput I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid device identity: {0}")]
    Identity(#[from] IdentityError),

    /// The backend refused a request (unsupported code, wrong state, ...).
    #[error("{0}")]
    Rejected(String),
}

/// Local virtual-input endpoint.
///
/// Implementations must accept the calls in the order listed in the module
/// docs.  [`destroy`](UinputBackend::destroy) must be safe to call after any
/// prefix of that sequence.
#[cfg_attr(test, mockall::automock)]
pub trait UinputBackend: Send {
    /// Opens the uinput endpoint.
    fn open(&mut self) -> Result<(), BackendError>;

    /// Declares one event category (`EV_KEY`, `EV_ABS`).
    ///
    /// A backend may defer the category until codes of that type are added
    /// (the evdev builder only sets EV bits alongside keys or axes).  Such a
    /// backend must then fail [`create`](UinputBackend::create) if a declared
    /// category received no codes.
    fn enable_event_type(&mut self, event_type: u16) -> Result<(), BackendError>;

    /// Declares one key or button code.
    fn enable_key(&mut self, code: u16) -> Result<(), BackendError>;

    /// Declares one absolute axis together with its calibration.
    fn enable_abs_axis(&mut self, axis: &AxisCalibration) -> Result<(), BackendError>;

    /// Sets the name, bus and version reported by the device.
    fn set_identity(&mut self, identity: &DeviceIdentity) -> Result<(), BackendError>;

    /// Finalises device creation.
    fn create(&mut self) -> Result<(), BackendError>;

    /// Writes raw `input_event` bytes in the host's native layout.
    fn write(&mut self, bytes: &[u8]) -> Result<(), BackendError>;

    /// Destroys the device and closes the endpoint.
    fn destroy(&mut self);
}

/// One step of the setup sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStep {
    Open,
    DeclareEventTypes,
    DeclareKeys,
    RegisterAxes,
    SetIdentity,
    Finalize,
}

impl fmt::Display for SetupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SetupStep::Open => "open uinput",
            SetupStep::DeclareEventTypes => "declare event types",
            SetupStep::DeclareKeys => "declare pen buttons",
            SetupStep::RegisterAxes => "register absolute axes",
            SetupStep::SetIdentity => "set device identity",
            SetupStep::Finalize => "finalize device",
        };
        f.write_str(label)
    }
}

/// Device setup failed at `step`.
#[derive(Debug, Error)]
#[error("virtual device setup failed at '{step}': {source}")]
pub struct DeviceSetupError {
    pub step: SetupStep,
    #[source]
    pub source: BackendError,
}

/// Errors produced by [`VirtualDeviceManager::forward`].
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("virtual device has not been created")]
    NotCreated,

    #[error("writing to the virtual device failed: {0}")]
    Write(#[source] BackendError),
}

/// Where the device is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Nothing allocated yet.
    Idle,
    /// The endpoint is open but the device is not finalised.
    Partial,
    /// The device exists and accepts frames.
    Created,
    /// Torn down; the manager cannot be reused.
    Destroyed,
}

/// Builds the error mapper for one setup step.
fn at(step: SetupStep) -> impl Fn(BackendError) -> DeviceSetupError {
    move |source| DeviceSetupError { step, source }
}

/// Creates, feeds and destroys the virtual pen.
pub struct VirtualDeviceManager<B: UinputBackend> {
    backend: B,
    state: DeviceState,
    identity: DeviceIdentity,
    local_layout: FrameLayout,
    write_buf: Vec<u8>,
}

impl<B: UinputBackend> VirtualDeviceManager<B> {
    /// Manager for the reMarkable pen, writing frames in the host's layout.
    pub fn new(backend: B) -> Self {
        Self::with_local_layout(backend, FrameLayout::native())
    }

    /// Manager writing frames in `local_layout` instead of the host's.
    pub fn with_local_layout(backend: B, local_layout: FrameLayout) -> Self {
        Self {
            backend,
            state: DeviceState::Idle,
            identity: PEN_IDENTITY,
            local_layout,
            write_buf: Vec::with_capacity(local_layout.frame_size()),
        }
    }

    /// Replaces the identity used by [`create`](Self::create).
    pub fn with_identity(mut self, identity: DeviceIdentity) -> Self {
        self.identity = identity;
        self
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Runs the full setup sequence.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceSetupError`] naming the failed step.  Anything already
    /// allocated has been released by the time it returns.
    pub fn create(&mut self) -> Result<(), DeviceSetupError> {
        if self.state != DeviceState::Idle {
            return Err(DeviceSetupError {
                step: SetupStep::Open,
                source: BackendError::Rejected(format!(
                    "device manager is {:?}, expected Idle",
                    self.state
                )),
            });
        }

        match self.run_setup() {
            Ok(()) => {
                self.state = DeviceState::Created;
                info!(name = self.identity.name, "virtual pen created");
                Ok(())
            }
            Err(e) => {
                warn!("{e}; releasing partially created device");
                self.destroy();
                Err(e)
            }
        }
    }

    fn run_setup(&mut self) -> Result<(), DeviceSetupError> {
        self.backend.open().map_err(at(SetupStep::Open))?;
        self.state = DeviceState::Partial;

        for event_type in PEN_EVENT_TYPES {
            self.backend
                .enable_event_type(event_type)
                .map_err(at(SetupStep::DeclareEventTypes))?;
        }
        for code in PEN_BUTTONS {
            self.backend
                .enable_key(code)
                .map_err(at(SetupStep::DeclareKeys))?;
        }
        for axis in &PEN_AXES {
            if !axis.is_consistent() {
                return Err(at(SetupStep::RegisterAxes)(BackendError::Rejected(format!(
                    "axis 0x{:02X} has value {} outside {}..={}",
                    axis.code, axis.value, axis.minimum, axis.maximum
                ))));
            }
            debug!(
                code = axis.code,
                min = axis.minimum,
                max = axis.maximum,
                resolution = axis.resolution,
                "registering axis"
            );
            self.backend
                .enable_abs_axis(axis)
                .map_err(at(SetupStep::RegisterAxes))?;
        }

        self.identity
            .validate()
            .map_err(|e| at(SetupStep::SetIdentity)(BackendError::from(e)))?;
        self.backend
            .set_identity(&self.identity)
            .map_err(at(SetupStep::SetIdentity))?;

        self.backend.create().map_err(at(SetupStep::Finalize))
    }

    /// Writes one frame to the device in the local layout.
    ///
    /// # Errors
    ///
    /// [`ForwardError::NotCreated`] before a successful
    /// [`create`](Self::create); [`ForwardError::Write`] if the backend fails.
    pub fn forward(&mut self, frame: &EventFrame) -> Result<(), ForwardError> {
        if self.state != DeviceState::Created {
            return Err(ForwardError::NotCreated);
        }
        self.write_buf.clear();
        encode_frame_into(self.local_layout, frame, &mut self.write_buf);
        self.backend
            .write(&self.write_buf)
            .map_err(ForwardError::Write)
    }

    /// Destroys the device if anything was allocated.  Idempotent.
    pub fn destroy(&mut self) {
        match self.state {
            DeviceState::Partial | DeviceState::Created => {
                self.backend.destroy();
                debug!("virtual pen destroyed");
                self.state = DeviceState::Destroyed;
            }
            DeviceState::Idle | DeviceState::Destroyed => {}
        }
    }
}

impl<B: UinputBackend> Drop for VirtualDeviceManager<B> {
    fn drop(&mut self) {
        self.destroy();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
