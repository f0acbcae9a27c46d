//! # netconf-executor
//!
//! Async NETCONF (RFC 6241) over SSH (RFC 6242) for network device automation.
//!
//! netconf-executor opens a `netconf` SSH subsystem on a device, exchanges
//! hellos, and multiplexes any number of concurrent RPCs over the one
//! channel. On top of the session sits a service layer that runs the usual
//! lock → edit → validate → commit → unlock transaction and reports each
//! step as a [`DeviceResponse`].
//!
//! ## Features
//!
//! - Async SSH connections via russh
//! - End-of-message (base:1.0) and chunked (base:1.1) framing, negotiated from the hellos
//! - Concurrent in-flight RPCs correlated by message-id, with per-call timeouts
//! - Automatic re-establishment when the channel drops under a connected session
//! - Builders for every base protocol operation
//! - `edit-config` transactions with precise abort and unlock semantics
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use netconf_executor::{DeviceInfo, EditConfigOptions, NetconfRpcService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), netconf_executor::Error> {
//!     let device = DeviceInfo::builder("192.168.1.1")
//!         .username("admin")
//!         .password("secret")
//!         .build()?;
//!
//!     let service = NetconfRpcService::new(device);
//!     service.connect().await?;
//!
//!     let response = service
//!         .edit_config(
//!             "<system><host-name>edge1</host-name></system>",
//!             &EditConfigOptions::default().validate(true),
//!         )
//!         .await;
//!     println!("{}", response);
//!
//!     service.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod framing;
pub mod rpc;
pub mod service;
pub mod session;
pub mod transport;

// Re-export main types for convenience
pub use error::Error;
pub use framing::Framing;
pub use rpc::Datastore;
pub use service::{
    ApplyConfigRecorder, DeviceResponse, EditConfigOptions, NetconfRpcService, NoopRecorder,
    RpcStatus,
};
pub use session::{NetconfSession, PendingReply, SessionState};
pub use transport::{AuthMethod, DeviceInfo, HostKeyVerification, SshTransport, Transport};
