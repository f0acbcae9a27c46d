//! Error types for netconf-executor.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Main error type for NETCONF operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SSH transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Message framing errors
    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    /// Session-level errors (connect, dispatch, waiting for replies)
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// NETCONF protocol errors reported by, or detected in, the peer
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Caller supplied parameters that can never form a valid request
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl Error {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument {
            message: message.into(),
        }
    }
}

/// Transport layer errors (SSH connection, authentication, subsystem).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// SSH key error
    #[error("SSH key error: {0}")]
    Key(String),

    /// Host is not present in known_hosts (strict checking)
    #[error("Host key for {host}:{port} is unknown")]
    HostKeyUnknown { host: String, port: u16 },

    /// Host key differs from the one recorded in known_hosts
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Connection was closed unexpectedly
    #[error("Connection disconnected")]
    Disconnected,

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Framing errors raised while splitting the inbound byte stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// Expected `\n#` at the start of a chunk header
    #[error("Invalid chunk header: {0:?}")]
    InvalidChunkHeader(String),

    /// The chunk-size field is not a valid RFC 6242 size
    #[error("Invalid chunk size: {0:?}")]
    InvalidChunkSize(String),

    /// A decoded message grew beyond the configured limit
    #[error("Message exceeds maximum size of {max} bytes")]
    MessageTooLarge { max: usize },
}

/// Session layer errors.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Could not establish the SSH/NETCONF session
    #[error("{device}: failed to establish NETCONF session: {source}")]
    Connection {
        device: String,
        #[source]
        source: Box<Error>,
    },

    /// The transport failed while a reply was outstanding
    #[error("{device}: transport failure, closing session {session_id} for request {request}: {reason}")]
    Transport {
        device: String,
        session_id: String,
        request: String,
        reason: String,
    },

    /// No reply arrived within the configured window
    #[error("{device}: timed out while waiting for reply for request {request} after {timeout:?}")]
    Timeout {
        device: String,
        request: String,
        timeout: Duration,
    },

    /// The pending reply was discarded before it was resolved
    #[error("{device}: interrupted while waiting for reply for request: {request}")]
    Interrupted { device: String, request: String },

    /// The session is not connected
    #[error("{device}: session is not connected")]
    NotConnected { device: String },

    /// A reply with this message-id is already outstanding
    #[error("message-id '{0}' is already awaiting a reply")]
    DuplicateMessageId(String),
}

/// NETCONF protocol errors.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The device answered with an `<rpc-error>`
    #[error("RPC reply did not pass validation: {reply}")]
    RpcError { reply: String },

    /// The server hello carried no `<session-id>`
    #[error("Missing session-id in server hello message: {hello}")]
    MissingSessionId { hello: String },
}

/// Result type alias using netconf-executor's Error.
pub type Result<T> = std::result::Result<T, Error>;
