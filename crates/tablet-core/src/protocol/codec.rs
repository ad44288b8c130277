//! Binary codec between raw frame bytes and [`EventFrame`].
//!
//! Wire format (all integers little-endian):
//! ```text
//! wide64:   [sec:8][usec:8][type:2][code:2][value:4]   = 24 bytes
//! narrow32: [sec:4][usec:4][type:2][code:2][value:4]   = 16 bytes
//! ```
//!
//! Decoding then encoding with the same layout reproduces the input bytes
//! exactly.  Encoding a wide frame as narrow truncates the timestamp to 32 bits;
//! the kernel overwrites uinput timestamps anyway, so nothing downstream sees it.

use thiserror::Error;

use crate::protocol::frame::{EventFrame, FrameLayout};

/// Errors that can occur while decoding a frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The byte slice is not exactly one frame long.
    #[error("frame length mismatch: {layout} frames are {expected} bytes, got {actual}")]
    LengthMismatch {
        layout: FrameLayout,
        expected: usize,
        actual: usize,
    },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Decodes exactly one frame from `bytes`.
///
/// # Errors
///
/// Returns [`ProtocolError::LengthMismatch`] unless `bytes.len()` equals
/// `layout.frame_size()`.
///
/// # Examples
///
/// ```rust
/// use tablet_core::protocol::{decode_frame, encode_frame, FrameLayout};
///
/// let bytes = [0u8; 24];
/// let frame = decode_frame(FrameLayout::Wide64, &bytes).unwrap();
/// assert_eq!(encode_frame(FrameLayout::Wide64, &frame), bytes.to_vec());
/// ```
pub fn decode_frame(layout: FrameLayout, bytes: &[u8]) -> Result<EventFrame, ProtocolError> {
    if bytes.len() != layout.frame_size() {
        return Err(ProtocolError::LengthMismatch {
            layout,
            expected: layout.frame_size(),
            actual: bytes.len(),
        });
    }

    let t = layout.time_field_size();
    let (seconds, microseconds) = match layout {
        FrameLayout::Wide64 => (read_i64(bytes, 0), read_i64(bytes, t)),
        FrameLayout::Narrow32 => (
            i64::from(read_i32(bytes, 0)),
            i64::from(read_i32(bytes, t)),
        ),
    };

    let body = 2 * t;
    Ok(EventFrame {
        seconds,
        microseconds,
        event_type: read_u16(bytes, body),
        code: read_u16(bytes, body + 2),
        value: read_i32(bytes, body + 4),
    })
}

/// Encodes `frame` into a freshly allocated buffer of `layout.frame_size()` bytes.
pub fn encode_frame(layout: FrameLayout, frame: &EventFrame) -> Vec<u8> {
    let mut buf = Vec::with_capacity(layout.frame_size());
    encode_frame_into(layout, frame, &mut buf);
    buf
}

/// Appends the encoding of `frame` to `buf`.
///
/// Lets the hot forwarding path reuse one buffer instead of allocating per frame.
pub fn encode_frame_into(layout: FrameLayout, frame: &EventFrame, buf: &mut Vec<u8>) {
    match layout {
        FrameLayout::Wide64 => {
            buf.extend_from_slice(&frame.seconds.to_le_bytes());
            buf.extend_from_slice(&frame.microseconds.to_le_bytes());
        }
        FrameLayout::Narrow32 => {
            buf.extend_from_slice(&(frame.seconds as i32).to_le_bytes());
            buf.extend_from_slice(&(frame.microseconds as i32).to_le_bytes());
        }
    }
    buf.extend_from_slice(&frame.event_type.to_le_bytes());
    buf.extend_from_slice(&frame.code.to_le_bytes());
    buf.extend_from_slice(&frame.value.to_le_bytes());
}

// ── Field readers ─────────────────────────────────────────────────────────────
//
// Callers have already checked the total length, so every index below is in
// bounds.

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_i32(bytes: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn read_i64(bytes: &[u8], offset: usize) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[offset..offset + 8]);
    i64::from_le_bytes(raw)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
