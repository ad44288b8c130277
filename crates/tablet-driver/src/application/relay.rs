//! The relay loop: resolve, open, create, then forward frames until EOF.
//!
//! # State machine (for beginners)
//!
//! ```text
//! INIT -> RESOLVE_PATH -> OPEN_CHANNEL -> CREATE_DEVICE -> STREAM -> SHUTDOWN
//!   \__________\______________\_______________\______________\____-> FATAL
//! ```
//!
//! Each arrow is taken at most once; nothing is retried.  Whatever the exit,
//! resources are released in reverse order of acquisition: the virtual device
//! first, then the streaming channel, then the SSH session.
//!
//! The loop runs as a single task.  In the `STREAM` state it only ever waits on
//! the next remote frame; the device write is synchronous.

use std::fmt;

use tablet_core::protocol::codes::event_type_name;
use tablet_core::FrameLayout;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::application::remote::{ConnectionError, RemoteShell};
use crate::application::resolve_path::{DevicePathResolver, ResolutionError};
use crate::application::stream_frames::{EventStreamReader, FrameError};
use crate::application::virtual_device::{
    DeviceSetupError, ForwardError, UinputBackend, VirtualDeviceManager,
};

/// A debug line is logged every this many forwarded frames.
pub const PROGRESS_INTERVAL: u64 = 500;

/// States of the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayStage {
    Init,
    ResolvePath,
    OpenChannel,
    CreateDevice,
    Stream,
    Shutdown,
    Fatal,
}

impl fmt::Display for RelayStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelayStage::Init => "INIT",
            RelayStage::ResolvePath => "RESOLVE_PATH",
            RelayStage::OpenChannel => "OPEN_CHANNEL",
            RelayStage::CreateDevice => "CREATE_DEVICE",
            RelayStage::Stream => "STREAM",
            RelayStage::Shutdown => "SHUTDOWN",
            RelayStage::Fatal => "FATAL",
        };
        f.write_str(name)
    }
}

/// Underlying cause of a relay failure.
#[derive(Debug, Error)]
pub enum RelayErrorKind {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    DeviceSetup(#[from] DeviceSetupError),
    #[error(transparent)]
    Forward(#[from] ForwardError),
}

/// Fatal relay error together with the stage it happened in.
#[derive(Debug, Error)]
#[error("relay failed in stage {stage}: {kind}")]
pub struct RelayError {
    pub stage: RelayStage,
    #[source]
    pub kind: RelayErrorKind,
}

impl RelayError {
    pub fn new(stage: RelayStage, kind: impl Into<RelayErrorKind>) -> Self {
        Self {
            stage,
            kind: kind.into(),
        }
    }
}

/// Outcome of a run that reached `SHUTDOWN`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySummary {
    /// Digitizer node the frames were read from.
    pub device_path: String,
    pub frames_forwarded: u64,
}

/// Owns the session, the path cache, and the virtual device for one run.
pub struct RelayLoop<S: RemoteShell, B: UinputBackend> {
    shell: S,
    resolver: DevicePathResolver,
    device: VirtualDeviceManager<B>,
    remote_layout: FrameLayout,
    stage: RelayStage,
    frames_forwarded: u64,
}

impl<S: RemoteShell, B: UinputBackend> RelayLoop<S, B> {
    /// Creates a relay over an authenticated `shell`.
    pub fn new(shell: S, device: VirtualDeviceManager<B>, remote_layout: FrameLayout) -> Self {
        Self {
            shell,
            resolver: DevicePathResolver::new(),
            device,
            remote_layout,
            stage: RelayStage::Init,
            frames_forwarded: 0,
        }
    }

    pub fn stage(&self) -> RelayStage {
        self.stage
    }

    /// Runs the relay to completion and tears everything down.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError`] naming the stage that failed.  Teardown has
    /// already happened when it is returned.
    pub async fn run(mut self) -> Result<RelaySummary, RelayError> {
        info!(stage = %self.stage, layout = %self.remote_layout, "session ready");

        let mut reader = None;
        let outcome = self.drive(&mut reader).await;

        match &outcome {
            Ok(_) => self.enter(RelayStage::Shutdown),
            Err(e) => {
                self.stage = RelayStage::Fatal;
                error!(stage = %e.stage, "{e}");
            }
        }
        self.teardown(reader).await;

        if let Ok(summary) = &outcome {
            info!(
                frames = summary.frames_forwarded,
                path = %summary.device_path,
                "relay finished"
            );
        }
        outcome
    }

    async fn drive(
        &mut self,
        reader: &mut Option<EventStreamReader<S::Channel>>,
    ) -> Result<RelaySummary, RelayError> {
        self.enter(RelayStage::ResolvePath);
        let device_path = self
            .resolver
            .resolve(&self.shell)
            .await
            .map_err(|e| RelayError::new(RelayStage::ResolvePath, e))?
            .to_string();

        self.enter(RelayStage::OpenChannel);
        let stream = EventStreamReader::open(&self.shell, &device_path, self.remote_layout)
            .await
            .map_err(|e| RelayError::new(RelayStage::OpenChannel, e))?;
        let stream = reader.insert(stream);

        self.enter(RelayStage::CreateDevice);
        self.device
            .create()
            .map_err(|e| RelayError::new(RelayStage::CreateDevice, e))?;

        self.enter(RelayStage::Stream);
        while let Some(frame) = stream
            .read_frame()
            .await
            .map_err(|e| RelayError::new(RelayStage::Stream, e))?
        {
            self.device
                .forward(&frame)
                .map_err(|e| RelayError::new(RelayStage::Stream, e))?;
            self.frames_forwarded += 1;
            if self.frames_forwarded == 1 {
                debug!(
                    event_type = %event_type_name(frame.event_type),
                    code = frame.code,
                    "first frame forwarded"
                );
            }
            if self.frames_forwarded % PROGRESS_INTERVAL == 0 {
                debug!(frames = self.frames_forwarded, "forwarding");
            }
        }
        debug!(frames = stream.frames_read(), "event stream ended");

        Ok(RelaySummary {
            device_path,
            frames_forwarded: self.frames_forwarded,
        })
    }

    fn enter(&mut self, stage: RelayStage) {
        self.stage = stage;
        info!(stage = %stage, "entering stage");
    }

    /// Releases the device, the channel, and the session, in that order.
    async fn teardown(&mut self, reader: Option<EventStreamReader<S::Channel>>) {
        self.device.destroy();
        if let Some(mut reader) = reader {
            if let Err(e) = reader.close().await {
                warn!("closing the event stream failed: {e}");
            }
        }
        self.shell.disconnect().await;
        debug!(frames = self.frames_forwarded, "teardown complete");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names_are_upper_snake_case() {
        let names: Vec<String> = [
            RelayStage::Init,
            RelayStage::ResolvePath,
            RelayStage::OpenChannel,
            RelayStage::CreateDevice,
            RelayStage::Stream,
            RelayStage::Shutdown,
            RelayStage::Fatal,
        ]
        .iter()
        .map(ToString::to_string)
        .collect();

        assert_eq!(
            names,
            [
                "INIT",
                "RESOLVE_PATH",
                "OPEN_CHANNEL",
                "CREATE_DEVICE",
                "STREAM",
                "SHUTDOWN",
                "FATAL"
            ]
        );
    }

    #[test]
    fn test_relay_error_message_names_the_stage() {
        let err = RelayError::new(RelayStage::ResolvePath, ResolutionError::EmptyOutput);

        let message = err.to_string();

        assert!(message.contains("RESOLVE_PATH"), "{message}");
        assert!(message.contains("no output"), "{message}");
    }

    #[test]
    fn test_relay_error_keeps_the_cause() {
        let err = RelayError::new(
            RelayStage::Stream,
            FrameError::Truncated {
                received: 10,
                expected: 24,
            },
        );

        assert!(matches!(
            err.kind,
            RelayErrorKind::Frame(FrameError::Truncated { received: 10, .. })
        ));
    }
}
