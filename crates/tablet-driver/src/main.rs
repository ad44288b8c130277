//! tablet-driver binary entry point.
//!
//! # Startup sequence
//!
//! 1. Parse command-line flags (each with an environment-variable fallback).
//! 2. Load the TOML config file and lay the flags over it.
//! 3. Initialise structured logging.
//! 4. Validate the merged settings.
//! 5. Open the SSH session to the tablet.
//! 6. Either print the digitizer path (`--probe`) or run the relay until the
//!    stream ends.
//!
//! The process exits with status 0 after a clean end of stream and non-zero
//! after any fatal error.
//!
//! # Usage
//!
//! ```text
//! tablet-driver [OPTIONS]
//!
//! Options:
//!   -a, --address <ADDRESS>          Tablet address   [env: TABLET_DRIVER_ADDRESS]
//!   -p, --port <PORT>                SSH port         [env: TABLET_DRIVER_PORT]
//!       --user <USER>                SSH user         [env: TABLET_DRIVER_USER]
//!   -k, --key <FILE>                 Private key      [env: TABLET_DRIVER_KEY]
//!   -o, --orientation <SIDE>         top|left|right|bottom
//!   -t, --threshold <PRESSURE>       Pressure threshold
//!       --frame-layout <LAYOUT>      wide64|narrow32
//!       --host-key-policy <POLICY>   strict|accept-new|prompt
//!       --keepalive <SECS>           SSH keepalive interval
//!       --config <FILE>              Config file
//!       --probe                      Print the digitizer path and exit
//!   -v, --verbose                    Debug logging and config dump
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tablet_core::FrameLayout;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use tablet_driver::application::relay::RelayStage;
use tablet_driver::application::remote::RemoteShell;
use tablet_driver::application::resolve_path::DevicePathResolver;
use tablet_driver::infrastructure::remote::ssh::{SshSession, SshSettings};
use tablet_driver::infrastructure::storage::config::{
    load_config, load_config_from, AppConfig, ConfigError, HostKeyPolicy, Orientation,
};

// ── CLI ───────────────────────────────────────────────────────────────────────

/// Relay a reMarkable tablet's pen to a local virtual input device over SSH.
///
/// Flags left unset fall back to their environment variable, then to the
/// config file, then to the built-in default.
#[derive(Debug, Parser)]
#[command(
    name = "tablet-driver",
    about = "Use a reMarkable tablet as a drawing tablet over SSH",
    version
)]
struct Cli {
    /// Tablet address (default 10.11.99.1, the USB network address).
    #[arg(short = 'a', long, env = "TABLET_DRIVER_ADDRESS")]
    address: Option<String>,

    /// SSH port on the tablet (default 22).
    #[arg(short = 'p', long, env = "TABLET_DRIVER_PORT")]
    port: Option<u16>,

    /// SSH user (default root).
    #[arg(long, env = "TABLET_DRIVER_USER")]
    user: Option<String>,

    /// Private key file; without one, password authentication is used.
    #[arg(short = 'k', long, value_name = "FILE", env = "TABLET_DRIVER_KEY")]
    key: Option<PathBuf>,

    /// Side of the screen the tablet's buttons face.
    #[arg(short = 'o', long, value_enum, env = "TABLET_DRIVER_ORIENTATION")]
    orientation: Option<Orientation>,

    /// Pen pressure threshold.
    #[arg(short = 't', long, env = "TABLET_DRIVER_THRESHOLD")]
    threshold: Option<u32>,

    /// Frame layout produced by the tablet.
    #[arg(long, env = "TABLET_DRIVER_FRAME_LAYOUT")]
    frame_layout: Option<FrameLayout>,

    /// What to do with a host key not yet in known_hosts.
    #[arg(long, value_enum, env = "TABLET_DRIVER_HOST_KEY_POLICY")]
    host_key_policy: Option<HostKeyPolicy>,

    /// SSH keepalive interval in seconds.
    #[arg(long, value_name = "SECS", env = "TABLET_DRIVER_KEEPALIVE")]
    keepalive: Option<u64>,

    /// Config file (default $XDG_CONFIG_HOME/tablet-driver/config.toml).
    #[arg(long, value_name = "FILE", env = "TABLET_DRIVER_CONFIG")]
    config: Option<PathBuf>,

    /// Resolve and print the digitizer device path, then exit.
    #[arg(long)]
    probe: bool,

    /// Log at debug level and print the effective configuration.
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl Cli {
    /// Overrides the loaded config with every flag that was given.
    fn apply_to(&self, config: &mut AppConfig) {
        let remote = &mut config.remote;
        if let Some(address) = &self.address {
            remote.address = address.clone();
        }
        if let Some(port) = self.port {
            remote.port = port;
        }
        if let Some(user) = &self.user {
            remote.user = user.clone();
        }
        if let Some(key) = &self.key {
            remote.key = Some(key.clone());
        }
        if let Some(policy) = self.host_key_policy {
            remote.host_key_policy = policy;
        }
        if let Some(secs) = self.keepalive {
            remote.keepalive_secs = secs;
        }
        if let Some(layout) = self.frame_layout {
            remote.frame_layout = layout;
        }

        let driver = &mut config.driver;
        if let Some(orientation) = self.orientation {
            driver.orientation = orientation;
        }
        if let Some(threshold) = self.threshold {
            driver.threshold = threshold;
        }
    }

    /// Loads the config file and applies the flags on top of it.
    fn resolve_config(&self) -> anyhow::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => load_config_from(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => match load_config() {
                Ok(config) => config,
                Err(ConfigError::NoPlatformConfigDir) => AppConfig::default(),
                Err(e) => return Err(e).context("loading config"),
            },
        };
        self.apply_to(&mut config);
        Ok(config)
    }
}

fn ssh_settings(config: &AppConfig) -> SshSettings {
    let remote = &config.remote;
    SshSettings {
        address: remote.address.clone(),
        port: remote.port,
        user: remote.user.clone(),
        key_path: remote.key.clone(),
        host_key_policy: remote.host_key_policy,
        keepalive: Duration::from_secs(remote.keepalive_secs),
    }
}

/// Filter used when `RUST_LOG` is not set.
fn default_directive(verbose: bool, configured: &str) -> &str {
    if verbose {
        "debug"
    } else {
        configured
    }
}

fn init_logging(verbose: bool, configured: &str) {
    // Logs go to stderr so `--probe` output on stdout stays clean.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, configured)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    init_logging(cli.verbose, &config.driver.log_level);
    config.validate().context("invalid configuration")?;

    if cli.verbose {
        debug!("effective configuration:\n{}", config.to_toml()?);
    }
    info!(
        orientation = %config.driver.orientation,
        threshold = config.driver.threshold,
        "pen settings"
    );

    let session = match SshSession::connect(&ssh_settings(&config)).await {
        Ok(session) => session,
        Err(e) => {
            error!(stage = %RelayStage::Init, "{e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    if cli.probe {
        return Ok(probe(session).await);
    }
    run_relay(session, config.remote.frame_layout).await
}

/// Prints the resolved digitizer path on stdout.
async fn probe<S: RemoteShell>(session: S) -> ExitCode {
    let mut resolver = DevicePathResolver::new();
    let resolved = resolver.resolve(&session).await.map(str::to_owned);
    session.disconnect().await;
    match resolved {
        Ok(path) => {
            println!("{path}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(stage = %RelayStage::ResolvePath, "{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(target_os = "linux")]
async fn run_relay(session: SshSession, remote_layout: FrameLayout) -> anyhow::Result<ExitCode> {
    use tablet_driver::application::relay::RelayLoop;
    use tablet_driver::application::virtual_device::VirtualDeviceManager;
    use tablet_driver::infrastructure::uinput::linux::EvdevBackend;

    let device = VirtualDeviceManager::new(EvdevBackend::new());
    // The relay logs its own summary and fatal diagnostic.
    match RelayLoop::new(session, device, remote_layout).run().await {
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(_) => Ok(ExitCode::FAILURE),
    }
}

#[cfg(not(target_os = "linux"))]
async fn run_relay(session: SshSession, _remote_layout: FrameLayout) -> anyhow::Result<ExitCode> {
    session.disconnect().await;
    anyhow::bail!("the virtual pen needs Linux uinput; only --probe works on this platform")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{CommandFactory, FromArgMatches};

    /// Parses `args` with every `env` fallback removed, so the result does not
    /// depend on `TABLET_DRIVER_*` variables in the test environment.
    fn try_parse(args: &[&str]) -> Result<Cli, clap::Error> {
        let matches = Cli::command()
            .mut_args(|arg| arg.env(None::<&'static str>))
            .try_get_matches_from(args)?;
        Cli::from_arg_matches(&matches)
    }

    fn parse(args: &[&str]) -> Cli {
        try_parse(args).unwrap()
    }

    #[test]
    fn test_cli_defaults_leave_config_untouched() {
        // Arrange
        let cli = parse(&["tablet-driver"]);
        let mut config = AppConfig::default();

        // Act
        cli.apply_to(&mut config);

        // Assert
        assert_eq!(config, AppConfig::default());
        assert!(!cli.probe);
        assert!(!cli.verbose);
    }

    #[test]
    fn test_short_flags_override_config() {
        let cli = parse(&[
            "tablet-driver",
            "-a",
            "192.168.1.20",
            "-p",
            "2222",
            "-k",
            "/tmp/id_ed25519",
            "-v",
        ]);
        let mut config = AppConfig::default();

        cli.apply_to(&mut config);

        assert_eq!(config.remote.address, "192.168.1.20");
        assert_eq!(config.remote.port, 2222);
        assert_eq!(config.remote.key, Some(PathBuf::from("/tmp/id_ed25519")));
        assert!(cli.verbose);
    }

    #[test]
    fn test_long_flags_override_config() {
        let cli = parse(&[
            "tablet-driver",
            "--user",
            "admin",
            "--orientation",
            "left",
            "--threshold",
            "800",
            "--frame-layout",
            "narrow32",
            "--host-key-policy",
            "accept-new",
            "--keepalive",
            "30",
            "--probe",
        ]);
        let mut config = AppConfig::default();

        cli.apply_to(&mut config);

        assert_eq!(config.remote.user, "admin");
        assert_eq!(config.driver.orientation, Orientation::Left);
        assert_eq!(config.driver.threshold, 800);
        assert_eq!(config.remote.frame_layout, FrameLayout::Narrow32);
        assert_eq!(config.remote.host_key_policy, HostKeyPolicy::AcceptNew);
        assert_eq!(config.remote.keepalive_secs, 30);
        assert!(cli.probe);
    }

    #[test]
    fn test_flags_win_over_file_values() {
        // Arrange
        let mut config: AppConfig = toml::from_str(
            "[remote]\naddress = \"10.0.0.5\"\nport = 2200\n[driver]\nthreshold = 400\n",
        )
        .unwrap();
        let cli = parse(&["tablet-driver", "--port", "22"]);

        // Act
        cli.apply_to(&mut config);

        // Assert
        assert_eq!(config.remote.address, "10.0.0.5");
        assert_eq!(config.remote.port, 22);
        assert_eq!(config.driver.threshold, 400);
    }

    #[test]
    fn test_unknown_orientation_is_rejected() {
        let result = try_parse(&["tablet-driver", "--orientation", "diagonal"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_frame_layout_is_rejected() {
        let result = try_parse(&["tablet-driver", "--frame-layout", "wide128"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_config_file_falls_back_to_defaults() {
        let cli = parse(&[
            "tablet-driver",
            "--config",
            "/nonexistent/tablet-driver/config.toml",
            "--threshold",
            "700",
        ]);

        let config = cli.resolve_config().unwrap();

        assert_eq!(config.remote, AppConfig::default().remote);
        assert_eq!(config.driver.threshold, 700);
    }

    #[test]
    fn test_ssh_settings_carry_remote_section() {
        let mut config = AppConfig::default();
        config.remote.keepalive_secs = 5;

        let settings = ssh_settings(&config);

        assert_eq!(settings.address, "10.11.99.1");
        assert_eq!(settings.port, 22);
        assert_eq!(settings.user, "root");
        assert_eq!(settings.key_path, None);
        assert_eq!(settings.keepalive, Duration::from_secs(5));
    }

    #[test]
    fn test_verbose_selects_debug_filter() {
        assert_eq!(default_directive(true, "warn"), "debug");
        assert_eq!(default_directive(false, "warn"), "warn");
    }
}
