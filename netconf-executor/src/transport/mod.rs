//! SSH transport layer wrapping russh.
//!
//! This module provides the low-level connection management: connection
//! setup, authentication and opening the `netconf` SSH subsystem. The session
//! layer only sees the [`Transport`] trait, so tests can substitute an
//! in-memory byte stream for a real device.

pub mod config;
mod ssh;

use std::future::Future;

use tokio::io::{AsyncRead, AsyncWrite};

pub use config::{AuthMethod, DeviceInfo, DeviceInfoBuilder, HostKeyVerification};
pub use ssh::SshTransport;

use crate::error::Result;

/// A duplex byte stream to a NETCONF server.
pub trait Transport: Send + Sync + 'static {
    /// Inbound half, drained by the session's background reader.
    type Reader: AsyncRead + Send + Unpin + 'static;

    /// Outbound half, shared by all callers issuing RPCs.
    type Writer: AsyncWrite + Send + Unpin + 'static;

    /// Establish the connection and hand back both halves of the stream.
    ///
    /// Calling `open` on an already-open transport replaces the old connection.
    fn open(&mut self) -> impl Future<Output = Result<(Self::Reader, Self::Writer)>> + Send;

    /// Check whether the underlying connection is still alive.
    fn is_connected(&self) -> bool;

    /// Tear the connection down. Closing a closed transport is a no-op.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}
