//! Infrastructure layer of the tablet driver.
//!
//! Contains the OS- and network-facing adapters behind the application
//! layer's traits.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `tablet_core`, but MUST NOT be imported by the `application` layer.
//!
//! # Sub-modules
//!
//! - **`remote`** – `SshSession`, the `russh` implementation of `RemoteShell`,
//!   plus the scripted shell used in tests.
//!
//! - **`uinput`** – `EvdevBackend`, the Linux `UinputBackend`, selected at
//!   compile time with `#[cfg(target_os = "linux")]`, plus a recording backend
//!   for tests.
//!
//! - **`storage`** – TOML configuration file.
//!
//! - **`journal`** – Shared call log the test doubles write to.

pub mod journal;
pub mod remote;
pub mod storage;
pub mod uinput;
