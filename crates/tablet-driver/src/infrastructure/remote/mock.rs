//! Scripted remote shell for tests.
//!
//! # Why a scripted shell?
//!
//! The real [`SshSession`](super::ssh::SshSession) needs a reachable tablet.
//! `ScriptedShell` instead answers each command with a pre-recorded script: a
//! list of output chunks, optionally followed by a read error.  Every chunk is
//! returned by a separate read, so tests control exactly where the stream is
//! split.
//!
//! # Usage in tests
//!
//! ```ignore
//! let journal = CallJournal::new();
//! let shell = ScriptedShell::new(journal.clone())
//!     .script(RESOLVE_COMMAND, ExecScript::output(b"/dev/input/event1\n"))
//!     .script("cat /dev/input/event1", ExecScript::chunks(frames));
//!
//! // ... run the relay ...
//!
//! assert_eq!(journal.count("exec:"), 2);
//! ```
//!
//! Scripts are one-shot: a second `open_exec` of the same command fails,
//! which catches code that re-runs a command it should have cached.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::application::remote::{ConnectionError, RemoteShell};
use crate::infrastructure::journal::CallJournal;

/// What one remote command produces.
#[derive(Debug, Clone, Default)]
pub struct ExecScript {
    chunks: VecDeque<Vec<u8>>,
    error: Option<io::ErrorKind>,
    refuse: bool,
}

impl ExecScript {
    /// The command writes `bytes` in one piece and exits.
    pub fn output(bytes: &[u8]) -> Self {
        Self::chunks(vec![bytes.to_vec()])
    }

    /// The command writes each chunk as a separate read, then exits.
    pub fn chunks(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into(),
            ..Self::default()
        }
    }

    /// The command exits without writing anything.
    pub fn silent() -> Self {
        Self::default()
    }

    /// The channel cannot be opened at all.
    pub fn refused() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    /// After the chunks, the next read fails with `kind`.
    pub fn then_fail(mut self, kind: io::ErrorKind) -> Self {
        self.error = Some(kind);
        self
    }
}

/// A [`RemoteShell`] that replays [`ExecScript`]s.
#[derive(Debug, Default)]
pub struct ScriptedShell {
    scripts: Mutex<HashMap<String, ExecScript>>,
    journal: CallJournal,
}

impl ScriptedShell {
    pub fn new(journal: CallJournal) -> Self {
        Self {
            scripts: Mutex::default(),
            journal,
        }
    }

    /// Registers the script answering `command`.
    pub fn script(self, command: &str, script: ExecScript) -> Self {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(command.to_string(), script);
        self
    }
}

#[async_trait]
impl RemoteShell for ScriptedShell {
    type Channel = ScriptedChannel;

    async fn open_exec(&self, command: &str) -> Result<ScriptedChannel, ConnectionError> {
        self.journal.record(format!("exec:{command}"));
        let script = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(command);
        match script {
            Some(script) if !script.refuse => Ok(ScriptedChannel {
                command: command.to_string(),
                chunks: script.chunks,
                error: script.error,
                closed: false,
                journal: self.journal.clone(),
            }),
            Some(_) => Err(ConnectionError::Channel {
                command: command.to_string(),
                reason: "channel open refused".to_string(),
            }),
            None => Err(ConnectionError::Channel {
                command: command.to_string(),
                reason: "no script for command".to_string(),
            }),
        }
    }

    async fn disconnect(&self) {
        self.journal.record("disconnect");
    }
}

/// Channel replaying one [`ExecScript`].
#[derive(Debug)]
pub struct ScriptedChannel {
    command: String,
    chunks: VecDeque<Vec<u8>>,
    error: Option<io::ErrorKind>,
    closed: bool,
    journal: CallJournal,
}

impl AsyncRead for ScriptedChannel {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        while let Some(mut chunk) = this.chunks.pop_front() {
            if chunk.is_empty() {
                continue;
            }
            let n = chunk.len().min(buf.remaining());
            buf.put_slice(&chunk[..n]);
            if n < chunk.len() {
                this.chunks.push_front(chunk.split_off(n));
            }
            return Poll::Ready(Ok(()));
        }
        if let Some(kind) = this.error.take() {
            return Poll::Ready(Err(io::Error::new(kind, "scripted read failure")));
        }
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for ScriptedChannel {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if !this.closed {
            this.closed = true;
            this.journal.record(format!("close:{}", this.command));
        }
        Poll::Ready(Ok(()))
    }
}
