//! Boundary between the relay and the secure remote channel.
//!
//! The relay only needs two things from the transport: run a command on the
//! tablet and get its stdout/stdin back as a byte stream, and end the session.
//! Everything else about SSH (host keys, authentication, keepalive) stays in
//! the infrastructure layer behind [`RemoteShell`].

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

/// Errors raised by the remote transport.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The TCP connection or SSH handshake to the tablet failed.
    #[error("failed to connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    /// The tablet's host key was not trusted.
    #[error("host key for {address} rejected: {reason}")]
    HostKeyRejected { address: String, reason: String },

    /// Every configured authentication method was refused.
    #[error("authentication as '{user}' failed: {reason}")]
    Authentication { user: String, reason: String },

    /// A session channel could not be opened or the command not started.
    #[error("could not run '{command}' on the tablet: {reason}")]
    Channel { command: String, reason: String },
}

/// An authenticated session able to run commands on the tablet.
///
/// Each call to [`open_exec`](RemoteShell::open_exec) opens a fresh channel.
/// Reading the returned channel yields the command's stdout; partial reads are
/// normal.  Shutting the channel down (`AsyncWriteExt::shutdown`) closes it.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Byte stream attached to one remote command.
    type Channel: AsyncRead + AsyncWrite + Unpin + Send;

    /// Opens a session channel and starts `command` on it.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Channel`] if the channel cannot be opened or
    /// the command cannot be started.
    async fn open_exec(&self, command: &str) -> Result<Self::Channel, ConnectionError>;

    /// Ends the session.  Best effort; never fails.
    async fn disconnect(&self);
}
