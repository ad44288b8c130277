//! Frame schema, event codes, and the binary frame codec.

pub mod codec;
pub mod codes;
pub mod frame;

pub use codec::{decode_frame, encode_frame, encode_frame_into, ProtocolError};
pub use frame::{EventFrame, FrameLayout, NARROW_FRAME_SIZE, WIDE_FRAME_SIZE};
