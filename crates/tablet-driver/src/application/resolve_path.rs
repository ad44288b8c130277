//! Discovers which `/dev/input/eventN` node is the tablet's digitizer.
//!
//! On the tablet, `/dev/input/touchscreen0` is a symlink whose target changes
//! between firmware versions.  The resolver asks the tablet to canonicalise it
//! once, validates the answer, and caches it for the rest of the process.

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::application::remote::{ConnectionError, RemoteShell};

/// Command run on the tablet to find the digitizer node.
pub const RESOLVE_COMMAND: &str = "readlink -f /dev/input/touchscreen0";

/// Longest path accepted, excluding the trailing newline.
pub const MAX_PATH_LEN: usize = 127;

/// Errors produced while resolving the device path.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("could not run the path lookup: {0}")]
    Channel(#[from] ConnectionError),

    #[error("reading the path lookup output failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("path lookup returned no output")]
    EmptyOutput,

    #[error("path lookup output exceeds {limit} bytes")]
    TooLong { limit: usize },

    #[error("path lookup output is not valid UTF-8")]
    NotUtf8,

    #[error("path lookup returned an unusable path: {0:?}")]
    UnexpectedPath(String),
}

/// Resolves the digitizer path at most once per process.
#[derive(Debug, Default)]
pub struct DevicePathResolver {
    cached: Option<String>,
}

impl DevicePathResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// The path from an earlier successful [`resolve`](Self::resolve), if any.
    pub fn cached(&self) -> Option<&str> {
        self.cached.as_deref()
    }

    /// Returns the digitizer path, running [`RESOLVE_COMMAND`] on the first call.
    ///
    /// Later calls return the cached value without touching `shell`.  A failed
    /// attempt caches nothing.
    ///
    /// # Errors
    ///
    /// Returns a [`ResolutionError`] if the command cannot be run, its output
    /// cannot be read, or the output is not an acceptable device path.
    pub async fn resolve<S: RemoteShell>(&mut self, shell: &S) -> Result<&str, ResolutionError> {
        let path = match self.cached.take() {
            Some(path) => path,
            None => {
                let path = run_lookup(shell).await?;
                info!(path = %path, "resolved tablet input device");
                path
            }
        };
        Ok(self.cached.insert(path).as_str())
    }
}

async fn run_lookup<S: RemoteShell>(shell: &S) -> Result<String, ResolutionError> {
    debug!(command = RESOLVE_COMMAND, "looking up tablet input device");
    let mut channel = shell.open_exec(RESOLVE_COMMAND).await?;

    // Read one byte past the limit so overlong output is detected, not truncated.
    let limit = (MAX_PATH_LEN + 2) as u64;
    let mut output = Vec::with_capacity(MAX_PATH_LEN + 2);
    let read = (&mut channel).take(limit).read_to_end(&mut output).await;

    if let Err(e) = channel.shutdown().await {
        warn!("closing the path lookup channel failed: {e}");
    }

    read?;
    parse_resolved_path(&output)
}

/// Validates raw lookup output and strips exactly one trailing newline.
///
/// Accepted paths are absolute and contain only `[A-Za-z0-9/._-]`, so they can
/// be spliced into the streaming command without quoting.
///
/// # Errors
///
/// See [`ResolutionError`]; every variant except `Channel` and `Io` can be
/// returned.
///
/// # Examples
///
/// ```rust
/// use tablet_driver::application::resolve_path::parse_resolved_path;
///
/// assert_eq!(parse_resolved_path(b"/dev/input/event3\n").unwrap(), "/dev/input/event3");
/// ```
pub fn parse_resolved_path(output: &[u8]) -> Result<String, ResolutionError> {
    if output.is_empty() {
        return Err(ResolutionError::EmptyOutput);
    }
    let raw = output.strip_suffix(b"\n").unwrap_or(output);
    if raw.is_empty() {
        return Err(ResolutionError::EmptyOutput);
    }
    if raw.len() > MAX_PATH_LEN {
        return Err(ResolutionError::TooLong {
            limit: MAX_PATH_LEN,
        });
    }
    let path = std::str::from_utf8(raw).map_err(|_| ResolutionError::NotUtf8)?;
    let safe = path
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'/' | b'.' | b'_' | b'-'));
    if !path.starts_with('/') || !safe {
        return Err(ResolutionError::UnexpectedPath(path.to_string()));
    }
    Ok(path.to_string())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
