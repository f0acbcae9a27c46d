//! SSH transport implementation using russh.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info, warn};
use russh::client::{self, Handle, Msg};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey, load_secret_key};
use russh::ChannelStream;
use secrecy::ExposeSecret;
use tokio::io::{ReadHalf, WriteHalf};

use super::Transport;
use super::config::{AuthMethod, DeviceInfo, HostKeyVerification};
use crate::error::{Result, TransportError};

/// SSH subsystem name for NETCONF (RFC 6242).
pub const NETCONF_SUBSYSTEM: &str = "netconf";

/// NETCONF transport over an SSH `netconf` subsystem channel.
pub struct SshTransport {
    /// The russh session handle (None when closed).
    session: Option<Handle<SshHandler>>,

    /// Device this transport connects to.
    device: DeviceInfo,
}

impl SshTransport {
    /// Create a transport for the device. Nothing is connected until [`Transport::open`].
    pub fn new(device: DeviceInfo) -> Self {
        Self {
            session: None,
            device,
        }
    }

    /// Connect to the SSH server and authenticate.
    async fn connect_session(&self) -> Result<Handle<SshHandler>> {
        let device = &self.device;
        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: Some(device.idle_timeout),
            ..Default::default()
        });

        let host_key_error: Arc<Mutex<Option<TransportError>>> = Arc::new(Mutex::new(None));

        let handler = SshHandler {
            host: device.host.clone(),
            port: device.port,
            host_key_verification: device.host_key_verification.clone(),
            known_hosts_path: device.known_hosts_path.clone(),
            host_key_error: host_key_error.clone(),
        };

        info!("{}: Starting SSH session", device);
        let mut session = tokio::time::timeout(
            device.connect_timeout,
            client::connect(ssh_config, (device.host.as_str(), device.port), handler),
        )
        .await
        .map_err(|_| TransportError::Timeout(device.connect_timeout))?
        .map_err(|e| {
            // Prefer the detailed host-key error over russh's generic UnknownKey
            let stored = host_key_error.lock().ok().and_then(|mut slot| slot.take());
            match (stored, e) {
                (Some(hk_err), _) => hk_err,
                (None, russh::Error::IO(io)) => TransportError::ConnectionFailed {
                    host: device.host.clone(),
                    port: device.port,
                    source: io,
                },
                (None, other) => TransportError::Ssh(other),
            }
        })?;
        debug!("{}: SSH session created", device);

        tokio::time::timeout(device.connect_timeout, Self::authenticate(&mut session, device))
            .await
            .map_err(|_| TransportError::Timeout(device.connect_timeout))??;
        info!("{}: SSH session authenticated", device);

        Ok(session)
    }

    /// Authenticate with the server.
    async fn authenticate(session: &mut Handle<SshHandler>, device: &DeviceInfo) -> Result<()> {
        let success = match &device.auth {
            AuthMethod::None => session
                .authenticate_none(&device.username)
                .await
                .map_err(TransportError::Ssh)?
                .success(),
            AuthMethod::Password(password) => session
                .authenticate_password(&device.username, password.expose_secret())
                .await
                .map_err(TransportError::Ssh)?
                .success(),
            AuthMethod::PrivateKey { path, passphrase } => {
                let key = load_secret_key(path, passphrase.as_ref().map(|p| p.expose_secret()))
                    .map_err(|e| TransportError::Key(e.to_string()))?;

                // Get the best RSA hash algorithm supported by the server
                let hash_alg = session
                    .best_supported_rsa_hash()
                    .await
                    .map_err(TransportError::Ssh)?
                    .flatten();

                session
                    .authenticate_publickey(
                        &device.username,
                        PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                    )
                    .await
                    .map_err(TransportError::Ssh)?
                    .success()
            }
        };

        if !success {
            return Err(TransportError::AuthenticationFailed {
                user: device.username.clone(),
            }
            .into());
        }

        Ok(())
    }
}

impl Transport for SshTransport {
    type Reader = ReadHalf<ChannelStream<Msg>>;
    type Writer = WriteHalf<ChannelStream<Msg>>;

    async fn open(&mut self) -> Result<(Self::Reader, Self::Writer)> {
        if self.session.is_some() {
            self.close().await?;
        }

        let session = self.connect_session().await?;

        let channel = session
            .channel_open_session()
            .await
            .map_err(TransportError::Ssh)?;
        channel
            .request_subsystem(true, NETCONF_SUBSYSTEM)
            .await
            .map_err(TransportError::Ssh)?;
        info!("{}: SSH NETCONF subsystem channel opened", self.device);

        self.session = Some(session);
        Ok(tokio::io::split(channel.into_stream()))
    }

    fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(|s| !s.is_closed())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            debug!("{}: closing SSH session", self.device);
            session
                .disconnect(russh::Disconnect::ByApplication, "", "en")
                .await
                .map_err(TransportError::Ssh)?;
        }
        Ok(())
    }
}

impl Drop for SshTransport {
    fn drop(&mut self) {
        if self.is_connected() {
            warn!("{}: SshTransport dropped without close()", self.device);
        }
    }
}

/// Host-key policy applied during the SSH handshake.
struct SshHandler {
    host: String,
    port: u16,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    /// Why the key was rejected; russh itself only reports `UnknownKey`.
    host_key_error: Arc<Mutex<Option<TransportError>>>,
}

impl SshHandler {
    fn verify(&self, key: &PublicKey) -> std::result::Result<(), TransportError> {
        let strict = match self.host_key_verification {
            HostKeyVerification::Disabled => return Ok(()),
            HostKeyVerification::Strict => true,
            HostKeyVerification::AcceptNew => false,
        };

        let path = self.known_hosts_path.as_deref();
        if known_host(&self.host, self.port, key, path)? {
            return Ok(());
        }
        if strict {
            return Err(TransportError::HostKeyUnknown {
                host: self.host.clone(),
                port: self.port,
            });
        }

        debug!("{}:{}: recording new host key", self.host, self.port);
        if let Err(e) = remember_host(&self.host, self.port, key, path) {
            warn!("{}:{}: failed to save host key: {}", self.host, self.port, e);
        }
        Ok(())
    }
}

/// `Ok(false)` when the host has no known_hosts entry yet.
fn known_host(
    host: &str,
    port: u16,
    key: &PublicKey,
    path: Option<&Path>,
) -> std::result::Result<bool, TransportError> {
    let found = match path {
        Some(path) => russh::keys::check_known_hosts_path(host, port, key, path),
        None => russh::keys::check_known_hosts(host, port, key),
    };
    found.map_err(|e| match e {
        russh::keys::Error::KeyChanged { line } => TransportError::HostKeyChanged {
            host: host.to_string(),
            port,
            line,
        },
        other => TransportError::KnownHosts(other.to_string()),
    })
}

fn remember_host(
    host: &str,
    port: u16,
    key: &PublicKey,
    path: Option<&Path>,
) -> std::result::Result<(), TransportError> {
    match path {
        Some(path) => russh::keys::known_hosts::learn_known_hosts_path(host, port, key, path),
        None => russh::keys::known_hosts::learn_known_hosts(host, port, key),
    }
    .map_err(|e| TransportError::KnownHosts(e.to_string()))
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match self.verify(key) {
            Ok(()) => Ok(true),
            Err(e) => {
                let mut rejected = self
                    .host_key_error
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                *rejected = Some(e);
                Ok(false)
            }
        }
    }
}
