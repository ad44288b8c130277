//! TOML configuration for the tablet driver.
//!
//! Read from `--config FILE` when given, otherwise from
//! `$XDG_CONFIG_HOME/tablet-driver/config.toml` (falling back to
//! `~/.config/tablet-driver/config.toml`).  A missing file is not an error:
//! every field has a default, so the driver works out of the box against a
//! tablet connected over USB.
//!
//! ```toml
//! [remote]
//! address = "10.11.99.1"
//! port = 22
//! user = "root"
//! key = "/home/me/.ssh/id_ed25519"
//! host_key_policy = "prompt"      # strict | accept-new | prompt
//! keepalive_secs = 15
//! frame_layout = "wide64"         # narrow32 for the 32-bit reMarkable 2
//!
//! [driver]
//! orientation = "right"           # top | left | right | bottom
//! threshold = 600
//! log_level = "info"
//! ```
//!
//! Command-line flags and their environment variables override the file; see
//! `main.rs` for the merge.

use std::fmt;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tablet_core::FrameLayout;
use thiserror::Error;

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither `XDG_CONFIG_HOME` nor `HOME` is set.
    #[error("could not determine the config directory")]
    NoPlatformConfigDir,

    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value parsed but is not usable.
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Enumerated settings ───────────────────────────────────────────────────────

/// What to do when the tablet's host key is not in `known_hosts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    /// Refuse unknown keys.
    Strict,
    /// Record unknown keys without asking.
    AcceptNew,
    /// Show the fingerprint and ask on the terminal.
    #[default]
    Prompt,
}

impl fmt::Display for HostKeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HostKeyPolicy::Strict => "strict",
            HostKeyPolicy::AcceptNew => "accept-new",
            HostKeyPolicy::Prompt => "prompt",
        })
    }
}

/// Side of the tablet the buttons face.  Logged only; frames are relayed
/// unrotated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Top,
    Left,
    #[default]
    Right,
    Bottom,
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Orientation::Top => "top",
            Orientation::Left => "left",
            Orientation::Right => "right",
            Orientation::Bottom => "bottom",
        })
    }
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub driver: DriverConfig,
}

/// How to reach and log into the tablet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_user")]
    pub user: String,
    /// Private key for public-key authentication.  Password auth if absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<PathBuf>,
    #[serde(default)]
    pub host_key_policy: HostKeyPolicy,
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
    /// Layout of the frames the tablet's kernel produces.
    #[serde(default)]
    pub frame_layout: FrameLayout,
}

/// Local behaviour of the driver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriverConfig {
    #[serde(default)]
    pub orientation: Orientation,
    /// Pen pressure threshold.  Logged only.
    #[serde(default = "default_threshold")]
    pub threshold: u32,
    /// `tracing` level used when neither `RUST_LOG` nor `--verbose` is set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_address() -> String {
    "10.11.99.1".to_string()
}
fn default_port() -> u16 {
    22
}
fn default_user() -> String {
    "root".to_string()
}
fn default_keepalive_secs() -> u64 {
    15
}
fn default_threshold() -> u32 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            user: default_user(),
            key: None,
            host_key_policy: HostKeyPolicy::default(),
            keepalive_secs: default_keepalive_secs(),
            frame_layout: FrameLayout::default(),
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            orientation: Orientation::default(),
            threshold: default_threshold(),
            log_level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// Checks values serde cannot: address shape, port, keepalive.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let address = &self.remote.address;
        if address.is_empty() {
            return Err(ConfigError::Invalid {
                field: "address",
                reason: "must not be empty".to_string(),
            });
        }
        if address.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid {
                field: "address",
                reason: format!("{address:?} contains whitespace"),
            });
        }
        if self.remote.port == 0 {
            return Err(ConfigError::Invalid {
                field: "port",
                reason: "must be between 1 and 65535".to_string(),
            });
        }
        if self.remote.user.is_empty() {
            return Err(ConfigError::Invalid {
                field: "user",
                reason: "must not be empty".to_string(),
            });
        }
        if self.remote.keepalive_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "keepalive_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Pretty TOML rendering, printed when running verbosely.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the default config file path.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if neither `XDG_CONFIG_HOME`
/// nor `HOME` is set.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok_or(ConfigError::NoPlatformConfigDir)?;
    Ok(base.join("tablet-driver").join("config.toml"))
}

/// Loads the config at `path`, returning defaults if the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Loads the config from the default location.
///
/// # Errors
///
/// See [`config_file_path`] and [`load_config_from`].
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
