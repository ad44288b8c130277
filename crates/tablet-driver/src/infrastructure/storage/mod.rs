//! Persistent settings.
//!
//! Only a read-mostly TOML config file; the driver stores no other state.

pub mod config;
