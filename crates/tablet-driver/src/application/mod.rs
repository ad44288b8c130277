//! Application layer of the tablet driver.
//!
//! # What lives here?
//!
//! - **`remote`** – The [`RemoteShell`](remote::RemoteShell) seam: run a command
//!   on the tablet and get a byte stream back.
//!
//! - **`resolve_path`** – Finds the digitizer's `/dev/input/eventN` node once
//!   and caches it.
//!
//! - **`stream_frames`** – Reassembles fixed-width input-event frames from the
//!   persistent `cat` channel.
//!
//! - **`virtual_device`** – Creates, calibrates, feeds, and destroys the local
//!   virtual pen through a [`UinputBackend`](virtual_device::UinputBackend).
//!
//! - **`relay`** – The state machine tying the above together, with its
//!   teardown order.
//!
//! Nothing in this layer talks to SSH or uinput directly; the concrete
//! adapters live in `crate::infrastructure`.

pub mod relay;
pub mod remote;
pub mod resolve_path;
pub mod stream_frames;
pub mod virtual_device;
