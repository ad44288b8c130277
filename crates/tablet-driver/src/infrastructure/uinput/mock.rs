//! Recording uinput backend for tests.
//!
//! # Why a recording backend?
//!
//! Creating a real uinput device needs `/dev/uinput` access and adds an input
//! device to the test machine's desktop.  `RecordingBackend` records every
//! call in a [`CallJournal`] and keeps each written buffer, so tests can check
//! setup order, teardown, and the exact bytes that reached the device.
//!
//! # Failure injection
//!
//! [`fail_at`](RecordingBackend::fail_at) makes the backend call belonging to
//! one [`SetupStep`] fail; [`fail_writes_after`](RecordingBackend::fail_writes_after)
//! makes writes fail once a number of frames have gone through.

use std::sync::{Arc, Mutex, PoisonError};

use tablet_core::{AxisCalibration, DeviceIdentity};

use crate::application::virtual_device::{BackendError, SetupStep, UinputBackend};
use crate::infrastructure::journal::CallJournal;

/// Cloneable view of the buffers written to a [`RecordingBackend`].
#[derive(Debug, Clone, Default)]
pub struct WrittenFrames(Arc<Mutex<Vec<Vec<u8>>>>);

impl WrittenFrames {
    /// Every buffer passed to `write`, in order.
    pub fn buffers(&self) -> Vec<Vec<u8>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// All written buffers joined into one byte string.
    pub fn concatenated(&self) -> Vec<u8> {
        self.buffers().concat()
    }

    fn push(&self, bytes: &[u8]) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(bytes.to_vec());
    }
}

/// A uinput backend that records calls instead of touching the kernel.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    journal: CallJournal,
    written: WrittenFrames,
    fail_at: Option<SetupStep>,
    fail_writes_after: Option<usize>,
}

impl RecordingBackend {
    /// Creates a backend logging into `journal`.
    pub fn new(journal: CallJournal) -> Self {
        Self {
            journal,
            ..Self::default()
        }
    }

    /// Makes the call for `step` fail.
    pub fn fail_at(mut self, step: SetupStep) -> Self {
        self.fail_at = Some(step);
        self
    }

    /// Makes every write after the first `count` fail.
    pub fn fail_writes_after(mut self, count: usize) -> Self {
        self.fail_writes_after = Some(count);
        self
    }

    /// Handle to the written buffers that outlives the backend.
    pub fn written(&self) -> WrittenFrames {
        self.written.clone()
    }

    fn step(&self, step: SetupStep, entry: String) -> Result<(), BackendError> {
        self.journal.record(entry);
        if self.fail_at == Some(step) {
            return Err(BackendError::Rejected(format!("injected failure at {step}")));
        }
        Ok(())
    }
}

impl UinputBackend for RecordingBackend {
    fn open(&mut self) -> Result<(), BackendError> {
        self.step(SetupStep::Open, "uinput:open".to_string())
    }

    fn enable_event_type(&mut self, event_type: u16) -> Result<(), BackendError> {
        self.step(
            SetupStep::DeclareEventTypes,
            format!("uinput:event_type:0x{event_type:02X}"),
        )
    }

    fn enable_key(&mut self, code: u16) -> Result<(), BackendError> {
        self.step(SetupStep::DeclareKeys, format!("uinput:key:0x{code:03X}"))
    }

    fn enable_abs_axis(&mut self, axis: &AxisCalibration) -> Result<(), BackendError> {
        self.step(
            SetupStep::RegisterAxes,
            format!(
                "uinput:abs:0x{:02X}:{}..{}@{}",
                axis.code, axis.minimum, axis.maximum, axis.resolution
            ),
        )
    }

    fn set_identity(&mut self, identity: &DeviceIdentity) -> Result<(), BackendError> {
        self.step(
            SetupStep::SetIdentity,
            format!("uinput:identity:{}", identity.name),
        )
    }

    fn create(&mut self) -> Result<(), BackendError> {
        self.step(SetupStep::Finalize, "uinput:create".to_string())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), BackendError> {
        let done = self.written.buffers().len();
        if self.fail_writes_after.is_some_and(|limit| done >= limit) {
            self.journal.record("uinput:write:failed");
            return Err(BackendError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "injected write failure",
            )));
        }
        self.journal.record(format!("uinput:write:{}", bytes.len()));
        self.written.push(bytes);
        Ok(())
    }

    fn destroy(&mut self) {
        self.journal.record("uinput:destroy");
    }
}
