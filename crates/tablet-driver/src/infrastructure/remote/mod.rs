//! [`RemoteShell`](crate::application::remote::RemoteShell) implementations.
//!
//! - **`ssh`** – The production session over `russh`, including host-key
//!   verification and authentication.
//! - **`exec`** – `ExecChannel`, the byte stream of one exec channel, which
//!   also reports the command's exit status.
//! - **`prompt`** – Terminal prompts for host-key trust, passphrases, and
//!   passwords.
//! - **`mock`** – `ScriptedShell`, replaying canned command output for tests.

pub mod exec;
pub mod mock;
pub mod prompt;
pub mod ssh;
