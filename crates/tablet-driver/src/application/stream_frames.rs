//! Persistent frame stream from the tablet's digitizer node.
//!
//! # Frame reassembly (for beginners)
//!
//! `cat /dev/input/eventN` on the tablet writes whole `input_event` structs,
//! but SSH delivers them in packets whose boundaries have nothing to do with
//! frame boundaries.  One read may return half a frame, or three and a half.
//! [`EventStreamReader::read_frame`] keeps reading until exactly one frame's
//! worth of bytes has been collected, then decodes it.  Bytes are never
//! reordered or skipped.

use tablet_core::protocol::{decode_frame, ProtocolError, WIDE_FRAME_SIZE};
use tablet_core::{EventFrame, FrameLayout};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::application::remote::{ConnectionError, RemoteShell};

/// Errors produced while reading frames.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The underlying channel read failed.
    #[error("reading the event stream failed: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended in the middle of a frame.
    #[error("event stream ended mid-frame after {received} of {expected} bytes")]
    Truncated { received: usize, expected: usize },

    #[error(transparent)]
    Decode(#[from] ProtocolError),
}

/// Remote command that streams raw frames from `path`.
pub fn stream_command(path: &str) -> String {
    format!("cat {path}")
}

/// Reads fixed-width frames from one exec channel.
pub struct EventStreamReader<C> {
    channel: C,
    layout: FrameLayout,
    frames_read: u64,
}

impl<C> EventStreamReader<C>
where
    C: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps an already-open channel carrying frames in `layout`.
    pub fn new(channel: C, layout: FrameLayout) -> Self {
        Self {
            channel,
            layout,
            frames_read: 0,
        }
    }

    /// Opens the streaming channel for the digitizer at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`] if the channel cannot be opened.
    pub async fn open<S>(shell: &S, path: &str, layout: FrameLayout) -> Result<Self, ConnectionError>
    where
        S: RemoteShell<Channel = C>,
    {
        let command = stream_command(path);
        debug!(%command, %layout, "opening event stream");
        let channel = shell.open_exec(&command).await?;
        Ok(Self::new(channel, layout))
    }

    /// Number of complete frames returned so far.
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Waits for the next complete frame.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly on a frame boundary.
    ///
    /// # Errors
    ///
    /// - [`FrameError::Io`] if a read fails.  The read is not retried.
    /// - [`FrameError::Truncated`] if the stream ends inside a frame.
    pub async fn read_frame(&mut self) -> Result<Option<EventFrame>, FrameError> {
        let size = self.layout.frame_size();
        let mut buf = [0u8; WIDE_FRAME_SIZE];
        let mut filled = 0;

        while filled < size {
            let n = self.channel.read(&mut buf[filled..size]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(FrameError::Truncated {
                    received: filled,
                    expected: size,
                });
            }
            filled += n;
        }

        let frame = decode_frame(self.layout, &buf[..size])?;
        self.frames_read += 1;
        Ok(Some(frame))
    }

    /// Shuts the channel down.
    ///
    /// # Errors
    ///
    /// Returns the I/O error reported by the channel, if any.
    pub async fn close(&mut self) -> std::io::Result<()> {
        self.channel.shutdown().await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
