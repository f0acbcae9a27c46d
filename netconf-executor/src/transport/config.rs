//! Device connection configuration.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::{Error, Result};
use crate::rpc::{NETCONF_BASE_1_0, NETCONF_BASE_1_1};

/// Default NETCONF-over-SSH port (RFC 6242).
pub const DEFAULT_NETCONF_PORT: u16 = 830;

/// Host key verification mode, analogous to OpenSSH's `StrictHostKeyChecking`.
#[derive(Debug, Clone, Default)]
pub enum HostKeyVerification {
    /// Reject unknown and changed keys.
    Strict,

    /// Accept and auto-learn unknown keys, but reject changed keys.
    AcceptNew,

    /// Accept all keys without checking. Network elements in a lab are
    /// rarely in known_hosts, so this is the default.
    #[default]
    Disabled,
}

/// Authentication method for the SSH connection.
#[derive(Debug, Clone)]
pub enum AuthMethod {
    /// No authentication (for testing only).
    None,

    /// Password authentication.
    Password(SecretString),

    /// Private key authentication.
    PrivateKey {
        /// Path to the private key file.
        path: PathBuf,
        /// Optional passphrase for encrypted keys.
        passphrase: Option<SecretString>,
    },
}

/// Everything needed to reach a NETCONF device.
///
/// Immutable once built; a session owns the `DeviceInfo` it was created from.
/// Displays as `host:port`, which prefixes every log line and error message
/// about the device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Target host (hostname or IP address).
    pub host: String,

    /// NETCONF SSH port (default: 830).
    pub port: u16,

    /// Username for authentication.
    pub username: String,

    /// Authentication method.
    pub auth: AuthMethod,

    /// Time allowed for TCP connect, SSH handshake and authentication.
    pub connect_timeout: Duration,

    /// Default time to wait for an RPC reply.
    pub reply_timeout: Duration,

    /// SSH inactivity timeout.
    pub idle_timeout: Duration,

    /// Capabilities advertised in the client hello.
    pub capabilities: Vec<String>,

    /// Host key verification mode.
    pub host_key_verification: HostKeyVerification,

    /// Path to known_hosts file.
    pub known_hosts_path: Option<PathBuf>,
}

impl DeviceInfo {
    /// Start building a `DeviceInfo` for the given host.
    pub fn builder(host: impl Into<String>) -> DeviceInfoBuilder {
        DeviceInfoBuilder::new(host)
    }

    /// Get the socket address for connection.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Builder for [`DeviceInfo`].
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use netconf_executor::DeviceInfo;
///
/// let device = DeviceInfo::builder("192.168.1.1")
///     .username("admin")
///     .password("secret")
///     .reply_timeout(Duration::from_secs(60))
///     .build()
///     .unwrap();
/// assert_eq!(device.to_string(), "192.168.1.1:830");
/// ```
#[derive(Debug)]
pub struct DeviceInfoBuilder {
    host: String,
    port: u16,
    username: Option<String>,
    auth: AuthMethod,
    connect_timeout: Duration,
    reply_timeout: Duration,
    idle_timeout: Duration,
    capabilities: Vec<String>,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
}

impl DeviceInfoBuilder {
    /// Create a new builder for the specified host.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_NETCONF_PORT,
            username: None,
            auth: AuthMethod::None,
            connect_timeout: Duration::from_secs(30),
            reply_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(99_999),
            capabilities: vec![NETCONF_BASE_1_0.to_string(), NETCONF_BASE_1_1.to_string()],
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
        }
    }

    /// Set the SSH port (default: 830).
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the username for authentication.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set password authentication.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.auth = AuthMethod::Password(SecretString::from(password.into()));
        self
    }

    /// Set private key authentication.
    pub fn private_key(mut self, key_path: impl Into<PathBuf>) -> Self {
        self.auth = AuthMethod::PrivateKey {
            path: key_path.into(),
            passphrase: None,
        };
        self
    }

    /// Set private key authentication with passphrase.
    pub fn private_key_with_passphrase(
        mut self,
        key_path: impl Into<PathBuf>,
        passphrase: impl Into<String>,
    ) -> Self {
        self.auth = AuthMethod::PrivateKey {
            path: key_path.into(),
            passphrase: Some(SecretString::from(passphrase.into())),
        };
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the default RPC reply timeout.
    pub fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Set the SSH inactivity timeout.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Replace the capabilities advertised in the client hello.
    pub fn capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    /// Set the host key verification mode.
    pub fn host_key_verification(mut self, mode: HostKeyVerification) -> Self {
        self.host_key_verification = mode;
        self
    }

    /// Use a specific known_hosts file.
    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    /// Validate the settings and build the [`DeviceInfo`].
    pub fn build(self) -> Result<DeviceInfo> {
        let username = self
            .username
            .ok_or_else(|| Error::invalid_argument("Username is required"))?;

        if self.host.is_empty() {
            return Err(Error::invalid_argument("Host is required"));
        }
        if self.connect_timeout.is_zero() || self.reply_timeout.is_zero() {
            return Err(Error::invalid_argument(
                "Connect and reply timeouts must be non-zero",
            ));
        }
        if self.capabilities.is_empty() {
            return Err(Error::invalid_argument(
                "At least one client capability must be advertised",
            ));
        }

        Ok(DeviceInfo {
            host: self.host,
            port: self.port,
            username,
            auth: self.auth,
            connect_timeout: self.connect_timeout,
            reply_timeout: self.reply_timeout,
            idle_timeout: self.idle_timeout,
            capabilities: self.capabilities,
            host_key_verification: self.host_key_verification,
            known_hosts_path: self.known_hosts_path,
        })
    }
}
