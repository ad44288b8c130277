//! SSH session to the tablet, built on `russh`.
//!
//! # Connection sequence
//!
//! 1. TCP connect and SSH handshake, with a keepalive so a dead link is noticed
//!    even while the pen is idle.
//! 2. Host-key check against `~/.ssh/known_hosts` according to the configured
//!    [`HostKeyPolicy`].  A key that differs from the recorded one is always
//!    rejected.
//! 3. Authentication as the configured user: with the private key if one was
//!    given (asking for its passphrase if it is encrypted), otherwise with a
//!    password from `TABLET_DRIVER_PASSWORD` or the terminal.
//!
//! After that, [`SshSession`] implements [`RemoteShell`]: each `open_exec`
//! opens a session channel, starts the command, waits for the server to
//! confirm it, and returns an [`ExecChannel`] that reports a failed command as
//! a read error.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, AuthResult, Handle};
use russh::keys::known_hosts::learn_known_hosts;
use russh::keys::{check_known_hosts, load_secret_key, HashAlg, PrivateKey, PrivateKeyWithHashAlg, PublicKey};
use russh::Disconnect;
use tracing::{debug, info, warn};

use crate::application::remote::{ConnectionError, RemoteShell};
use crate::infrastructure::remote::exec::{confirm_exec, ExecChannel};
use crate::infrastructure::remote::prompt::{is_affirmative, prompt_line, prompt_secret};
use crate::infrastructure::storage::config::HostKeyPolicy;

/// Environment variable consulted before prompting for a password.
pub const PASSWORD_ENV: &str = "TABLET_DRIVER_PASSWORD";

/// Everything needed to open a session.
#[derive(Debug, Clone)]
pub struct SshSettings {
    pub address: String,
    pub port: u16,
    pub user: String,
    pub key_path: Option<PathBuf>,
    pub host_key_policy: HostKeyPolicy,
    pub keepalive: Duration,
}

/// An authenticated SSH session to the tablet.
pub struct SshSession {
    handle: Handle<HostKeyVerifier>,
    address: String,
}

impl SshSession {
    /// Connects, verifies the host key, and authenticates.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::Connect`] if the handshake fails.
    /// - [`ConnectionError::HostKeyRejected`] if the host key is not trusted.
    /// - [`ConnectionError::Authentication`] if the credentials are refused.
    pub async fn connect(settings: &SshSettings) -> Result<Self, ConnectionError> {
        let address = format!("{}:{}", settings.address, settings.port);
        let config = Arc::new(client::Config {
            keepalive_interval: Some(settings.keepalive),
            inactivity_timeout: None,
            ..Default::default()
        });
        let rejection = Arc::new(Mutex::new(None));
        let verifier = HostKeyVerifier {
            host: settings.address.clone(),
            port: settings.port,
            policy: settings.host_key_policy,
            rejection: Arc::clone(&rejection),
        };

        info!(%address, user = %settings.user, "connecting to tablet");
        let connected =
            client::connect(config, (settings.address.as_str(), settings.port), verifier).await;
        let mut handle = match connected {
            Ok(handle) => handle,
            Err(e) => {
                let reason = rejection
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                return Err(match reason {
                    Some(reason) => ConnectionError::HostKeyRejected { address, reason },
                    None => ConnectionError::Connect {
                        address,
                        reason: e.to_string(),
                    },
                });
            }
        };

        authenticate(&mut handle, settings).await?;
        info!(%address, "authenticated");
        Ok(Self { handle, address })
    }
}

#[async_trait]
impl RemoteShell for SshSession {
    type Channel = ExecChannel;

    async fn open_exec(&self, command: &str) -> Result<Self::Channel, ConnectionError> {
        let failed = |reason: String| ConnectionError::Channel {
            command: command.to_string(),
            reason,
        };
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| failed(e.to_string()))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| failed(e.to_string()))?;
        let early = confirm_exec(&mut channel).await.map_err(failed)?;
        debug!(%command, "remote command started");
        Ok(ExecChannel::spawn(channel, command, early))
    }

    async fn disconnect(&self) {
        match self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            Ok(()) => debug!(address = %self.address, "disconnected"),
            Err(e) => debug!(address = %self.address, "disconnect failed: {e}"),
        }
    }
}

// ── Authentication ────────────────────────────────────────────────────────────

async fn authenticate(
    handle: &mut Handle<HostKeyVerifier>,
    settings: &SshSettings,
) -> Result<(), ConnectionError> {
    let failed = |reason: String| ConnectionError::Authentication {
        user: settings.user.clone(),
        reason,
    };

    let result = match &settings.key_path {
        Some(path) => {
            let key = load_key(path).await.map_err(failed)?;
            debug!(key = %path.display(), "trying public key authentication");
            handle
                .authenticate_publickey(
                    settings.user.as_str(),
                    PrivateKeyWithHashAlg::new(Arc::new(key), None),
                )
                .await
        }
        None => {
            let password = password_for(settings).await.map_err(failed)?;
            debug!("trying password authentication");
            handle
                .authenticate_password(settings.user.as_str(), password)
                .await
        }
    };

    match result {
        Ok(AuthResult::Success) => Ok(()),
        Ok(_) => Err(failed("the tablet refused the credentials".to_string())),
        Err(e) => Err(failed(e.to_string())),
    }
}

/// Loads the private key, asking for a passphrase only if it is encrypted.
async fn load_key(path: &Path) -> Result<PrivateKey, String> {
    match load_secret_key(path, None) {
        Ok(key) => Ok(key),
        Err(russh::keys::Error::KeyIsEncrypted) => {
            let passphrase = prompt_secret(&format!("Passphrase for {}: ", path.display()))
                .await
                .map_err(|e| format!("could not read passphrase: {e}"))?;
            load_secret_key(path, Some(passphrase.as_str()))
                .map_err(|e| format!("could not decrypt {}: {e}", path.display()))
        }
        Err(e) => Err(format!("could not load {}: {e}", path.display())),
    }
}

async fn password_for(settings: &SshSettings) -> Result<String, String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        debug!("using password from {PASSWORD_ENV}");
        return Ok(password);
    }
    prompt_secret(&format!(
        "Password for {}@{}: ",
        settings.user, settings.address
    ))
    .await
    .map_err(|e| format!("could not read password: {e}"))
}

// ── Host-key verification ─────────────────────────────────────────────────────

/// russh handler that checks the server key against `known_hosts`.
///
/// When it refuses a key it leaves the reason in `rejection`, because russh
/// itself only reports a generic "unknown key" error.
struct HostKeyVerifier {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
    rejection: Arc<Mutex<Option<String>>>,
}

impl HostKeyVerifier {
    fn reject(&self, reason: String) -> bool {
        warn!(host = %self.host, "{reason}");
        *self.rejection.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason);
        false
    }

    fn learn(&self, key: &PublicKey) -> bool {
        match learn_known_hosts(&self.host, self.port, key) {
            Ok(()) => info!(host = %self.host, "host key added to known_hosts"),
            Err(e) => warn!(host = %self.host, "could not record host key: {e}"),
        }
        true
    }

    async fn decide_unknown(&self, key: &PublicKey) -> bool {
        let fingerprint = key.fingerprint(HashAlg::Sha256);
        match self.policy {
            HostKeyPolicy::Strict => {
                self.reject(format!("unknown host key {fingerprint} (policy is strict)"))
            }
            HostKeyPolicy::AcceptNew => {
                info!(host = %self.host, %fingerprint, "trusting new host key");
                self.learn(key)
            }
            HostKeyPolicy::Prompt => {
                let question = format!(
                    "The authenticity of host '{}' can't be established.\n\
                     {} key fingerprint is {fingerprint}.\n\
                     Type 'yes' to trust it and continue: ",
                    self.host,
                    key.algorithm(),
                );
                match prompt_line(&question).await {
                    Ok(answer) if is_affirmative(&answer) => self.learn(key),
                    Ok(_) => self.reject("host key not accepted".to_string()),
                    Err(e) => self.reject(format!("could not ask about host key: {e}")),
                }
            }
        }
    }
}

impl client::Handler for HostKeyVerifier {
    type Error = russh::Error;

    async fn check_server_key(&mut self, key: &PublicKey) -> Result<bool, Self::Error> {
        let trusted = match check_known_hosts(&self.host, self.port, key) {
            Ok(true) => {
                debug!(host = %self.host, "host key matches known_hosts");
                true
            }
            Ok(false) => self.decide_unknown(key).await,
            Err(russh::keys::Error::KeyChanged { line }) => self.reject(format!(
                "host key differs from known_hosts line {line}; refusing to connect"
            )),
            Err(e) => self.reject(format!("could not check known_hosts: {e}")),
        };
        Ok(trusted)
    }
}
