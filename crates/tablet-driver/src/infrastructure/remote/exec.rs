//! Byte stream over one SSH exec channel.
//!
//! `russh`'s own `ChannelStream` only forwards stdout: the reply to the exec
//! request, the remote exit status and any signal are dropped, so a command
//! that fails on the tablet looks exactly like one that printed nothing.  The
//! relay must tell those apart, so this module:
//!
//! 1. waits for the server's reply to `exec` before handing the channel out
//!    ([`confirm_exec`]);
//! 2. moves the channel into a pump task that forwards stdout chunks, logs
//!    stderr, and turns a non-zero exit status or a signal into a read error
//!    delivered after the last chunk ([`ExecChannel`]).
//!
//! Shutting an [`ExecChannel`] down (or dropping it) tells the pump to close
//! the remote channel.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use russh::client::Msg;
use russh::{Channel, ChannelMsg};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Chunks buffered between the pump task and the reader.
const CHANNEL_DEPTH: usize = 32;

/// Waits for the reply to an `exec` sent with `want_reply`.
///
/// Returns any stdout that arrived before the reply, so no byte is lost.
///
/// # Errors
///
/// Returns a human-readable reason if the server refused the request or
/// closed the channel before answering.
pub async fn confirm_exec(channel: &mut Channel<Msg>) -> Result<Vec<u8>, String> {
    let mut early = Vec::new();
    loop {
        match channel.wait().await {
            Some(ChannelMsg::Success) => return Ok(early),
            Some(ChannelMsg::Failure) => {
                return Err("the tablet refused to start the command".to_string())
            }
            Some(ChannelMsg::Data { data }) => early.extend_from_slice(&data),
            Some(ChannelMsg::Close) | None => {
                return Err("channel closed before the command started".to_string())
            }
            Some(other) => debug!("ignoring {other:?} while waiting for exec reply"),
        }
    }
}

/// Read error reported once the remote command has ended, if it failed.
pub fn exit_error(command: &str, status: Option<u32>, signal: Option<&str>) -> Option<io::Error> {
    if let Some(signal) = signal {
        return Some(io::Error::new(
            io::ErrorKind::Other,
            format!("'{command}' was killed by signal {signal}"),
        ));
    }
    match status {
        Some(0) | None => None,
        Some(code) => Some(io::Error::new(
            io::ErrorKind::Other,
            format!("'{command}' exited with status {code}"),
        )),
    }
}

/// Read half of a running remote command.
///
/// Writes are not supported: neither remote command reads stdin.
#[derive(Debug)]
pub struct ExecChannel {
    incoming: mpsc::Receiver<io::Result<Vec<u8>>>,
    pending: Vec<u8>,
    offset: usize,
    close: Option<oneshot::Sender<()>>,
}

impl ExecChannel {
    /// Starts the pump task for a confirmed channel.
    pub fn spawn(channel: Channel<Msg>, command: &str, early: Vec<u8>) -> Self {
        let (tx, incoming) = mpsc::channel(CHANNEL_DEPTH);
        let (close, closed) = oneshot::channel();
        tokio::spawn(pump(channel, command.to_string(), tx, closed));
        Self::from_parts(incoming, close, early)
    }

    fn from_parts(
        incoming: mpsc::Receiver<io::Result<Vec<u8>>>,
        close: oneshot::Sender<()>,
        early: Vec<u8>,
    ) -> Self {
        Self {
            incoming,
            pending: early,
            offset: 0,
            close: Some(close),
        }
    }
}

async fn pump(
    mut channel: Channel<Msg>,
    command: String,
    tx: mpsc::Sender<io::Result<Vec<u8>>>,
    mut closed: oneshot::Receiver<()>,
) {
    let mut status = None;
    let mut signal = None;
    loop {
        let msg = tokio::select! {
            msg = channel.wait() => msg,
            // Explicit shutdown, or the reader was dropped.
            _ = &mut closed => {
                if let Err(e) = channel.close().await {
                    debug!(%command, "closing channel failed: {e}");
                }
                return;
            }
        };
        match msg {
            Some(ChannelMsg::Data { data }) => {
                if tx.send(Ok(data.to_vec())).await.is_err() {
                    break;
                }
            }
            Some(ChannelMsg::ExtendedData { data, .. }) => {
                warn!(%command, "remote: {}", String::from_utf8_lossy(&data).trim_end());
            }
            Some(ChannelMsg::ExitStatus { exit_status }) => status = Some(exit_status),
            Some(ChannelMsg::ExitSignal { signal_name, .. }) => {
                signal = Some(format!("{signal_name:?}"));
            }
            Some(ChannelMsg::Close) | None => break,
            Some(_) => {}
        }
    }
    if let Some(e) = exit_error(&command, status, signal.as_deref()) {
        let _ = tx.send(Err(e)).await;
    }
}

impl AsyncRead for ExecChannel {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        while this.offset == this.pending.len() {
            match ready!(this.incoming.poll_recv(cx)) {
                Some(Ok(chunk)) => {
                    this.pending = chunk;
                    this.offset = 0;
                }
                Some(Err(e)) => return Poll::Ready(Err(e)),
                None => return Poll::Ready(Ok(())),
            }
        }
        let n = (this.pending.len() - this.offset).min(buf.remaining());
        buf.put_slice(&this.pending[this.offset..this.offset + n]);
        this.offset += n;
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for ExecChannel {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "remote command does not read stdin",
        )))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if let Some(close) = self.get_mut().close.take() {
            let _ = close.send(());
        }
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn channel_with(
        early: &[u8],
    ) -> (
        ExecChannel,
        mpsc::Sender<io::Result<Vec<u8>>>,
        oneshot::Receiver<()>,
    ) {
        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
        let (close, closed) = oneshot::channel();
        (ExecChannel::from_parts(rx, close, early.to_vec()), tx, closed)
    }

    #[test]
    fn test_clean_exit_is_not_an_error() {
        assert!(exit_error("cat /dev/input/event1", Some(0), None).is_none());
        assert!(exit_error("cat /dev/input/event1", None, None).is_none());
    }

    #[test]
    fn test_failed_exit_names_command_and_status() {
        let err = exit_error("cat /dev/input/event9", Some(1), None).unwrap();

        let message = err.to_string();
        assert!(message.contains("cat /dev/input/event9"), "{message}");
        assert!(message.contains("status 1"), "{message}");
    }

    #[test]
    fn test_signal_wins_over_status() {
        let err = exit_error("cat /dev/input/event1", Some(0), Some("KILL")).unwrap();

        assert!(err.to_string().contains("signal KILL"));
    }

    #[tokio::test]
    async fn test_early_output_is_read_before_pumped_chunks() {
        // Arrange
        let (mut channel, tx, _closed) = channel_with(b"ab");
        tx.send(Ok(b"cd".to_vec())).await.unwrap();
        drop(tx);
        let mut out = Vec::new();

        // Act
        channel.read_to_end(&mut out).await.unwrap();

        // Assert
        assert_eq!(out, b"abcd");
    }

    #[tokio::test]
    async fn test_failed_command_surfaces_as_read_error_after_output() {
        // Arrange: stdout, then the exit-status error the pump sends last.
        let (mut channel, tx, _closed) = channel_with(b"");
        tx.send(Ok(b"x".to_vec())).await.unwrap();
        tx.send(Err(exit_error("cat /dev/input/event9", Some(1), None).unwrap()))
            .await
            .unwrap();
        drop(tx);
        let mut out = Vec::new();

        // Act
        let err = channel.read_to_end(&mut out).await.unwrap_err();

        // Assert
        assert_eq!(out, b"x");
        assert!(err.to_string().contains("status 1"));
    }

    #[tokio::test]
    async fn test_failed_command_without_output_is_not_a_clean_eof() {
        let (mut channel, tx, _closed) = channel_with(b"");
        tx.send(Err(exit_error("cat /dev/input/event9", Some(1), None).unwrap()))
            .await
            .unwrap();
        drop(tx);
        let mut buf = [0u8; 24];

        let result = channel.read(&mut buf).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_signals_the_pump_once() {
        let (mut channel, _tx, mut closed) = channel_with(b"");

        channel.shutdown().await.unwrap();
        channel.shutdown().await.unwrap();

        assert!(closed.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_writes_are_rejected() {
        let (mut channel, _tx, _closed) = channel_with(b"");

        let err = channel.write_all(b"q").await.unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }
}
