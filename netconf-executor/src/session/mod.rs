//! NETCONF session: hello exchange, RPC multiplexing and lifecycle.
//!
//! A [`NetconfSession`] owns one [`Transport`] and a background reader. Any
//! number of tasks may have RPCs in flight at once; replies are matched to
//! callers by message-id, in whatever order the device sends them.
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──hello──▶ HelloExchanged ──▶ Connected
//!                               ▲                                       │
//!                               └──────────────reconnect────────────────┤
//!                                                                       ▼
//!                                                     disconnect ──▶ Closed
//! ```
//!
//! Connect, disconnect and reconnect take the lifecycle lock exclusively;
//! RPC dispatch shares it. Callers therefore never write into a half-torn-down
//! channel, and waiting for a reply holds no lock at all.

mod communicator;
mod replies;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex as AsyncMutex, RwLock};

pub use replies::PendingReply;

use communicator::DeviceCommunicator;
use replies::{ReplyTable, RequestContext};

use crate::error::{Error, ProtocolError, Result, SessionError, TransportError};
use crate::framing::{Framing, encode};
use crate::rpc::{self, HELLO_MESSAGE_ID};
use crate::transport::{DeviceInfo, SshTransport, Transport};

/// Lifecycle state of a [`NetconfSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Never connected, or the last connect attempt failed.
    Disconnected,

    /// Transport is being opened.
    Connecting,

    /// Hello exchanged; capabilities and session-id are known.
    HelloExchanged,

    /// Ready for RPCs.
    Connected,

    /// Explicitly disconnected.
    Closed,
}

#[derive(Debug)]
struct Negotiated {
    state: SessionState,
    session_id: Option<String>,
    capabilities: Vec<String>,
    framing: Framing,
}

/// The parts of a session that are replaced on every (re)connect.
struct Link<T: Transport> {
    transport: T,
    writer: AsyncMutex<Option<T::Writer>>,
    communicator: Option<DeviceCommunicator>,
}

impl<T: Transport> Link<T> {
    fn is_alive(&self) -> bool {
        self.transport.is_connected()
            && self
                .communicator
                .as_ref()
                .is_some_and(DeviceCommunicator::is_running)
    }

    fn detach(&mut self) {
        if let Some(communicator) = self.communicator.take() {
            communicator.stop();
        }
        *self.writer.get_mut() = None;
    }
}

/// A NETCONF session with one device.
///
/// # Example
///
/// ```rust,no_run
/// use netconf_executor::{DeviceInfo, NetconfSession};
///
/// # async fn example() -> Result<(), netconf_executor::Error> {
/// let device = DeviceInfo::builder("192.168.1.1")
///     .username("admin")
///     .password("secret")
///     .build()?;
///
/// let session = NetconfSession::new(device);
/// session.connect().await?;
///
/// let id = session.next_message_id();
/// let request = netconf_executor::rpc::get_config(&id, "running".parse()?, None);
/// let reply = session.sync_rpc(&request, &id, None).await?;
/// println!("{}", reply);
///
/// session.disconnect().await?;
/// # Ok(())
/// # }
/// ```
pub struct NetconfSession<T: Transport = SshTransport> {
    device: DeviceInfo,
    identity: String,
    link: RwLock<Link<T>>,
    replies: ReplyTable,
    negotiated: Mutex<Negotiated>,
    message_ids: AtomicU64,
}

impl NetconfSession<SshTransport> {
    /// Create a session that will talk to `device` over SSH.
    pub fn new(device: DeviceInfo) -> Self {
        let transport = SshTransport::new(device.clone());
        Self::with_transport(device, transport)
    }
}

impl<T: Transport> NetconfSession<T> {
    /// Create a session over an arbitrary transport.
    pub fn with_transport(device: DeviceInfo, transport: T) -> Self {
        let identity = device.to_string();
        Self {
            device,
            identity,
            link: RwLock::new(Link {
                transport,
                writer: AsyncMutex::new(None),
                communicator: None,
            }),
            replies: ReplyTable::new(),
            negotiated: Mutex::new(Negotiated {
                state: SessionState::Disconnected,
                session_id: None,
                capabilities: Vec::new(),
                framing: Framing::EndOfMessage,
            }),
            message_ids: AtomicU64::new(1),
        }
    }

    fn negotiated(&self) -> MutexGuard<'_, Negotiated> {
        self.negotiated.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: SessionState) {
        let mut negotiated = self.negotiated();
        if negotiated.state != state {
            debug!("{}: session state {:?} -> {:?}", self.identity, negotiated.state, state);
            negotiated.state = state;
        }
    }

    /// Device this session was built for.
    pub fn device_info(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn state(&self) -> SessionState {
        self.negotiated().state
    }

    /// Session-id assigned by the device in its hello.
    pub fn session_id(&self) -> Option<String> {
        self.negotiated().session_id.clone()
    }

    /// Capabilities the device advertised in its hello.
    ///
    /// Empty until the first successful hello exchange.
    pub fn device_capabilities(&self) -> Vec<String> {
        self.negotiated().capabilities.clone()
    }

    /// Framing used for requests after the hello exchange.
    pub fn framing(&self) -> Framing {
        self.negotiated().framing
    }

    /// Number of requests still waiting for a reply.
    pub fn pending_replies(&self) -> usize {
        self.replies.len()
    }

    /// Allocate the next message-id. Ids start at 1 and never repeat within a session.
    pub fn next_message_id(&self) -> String {
        self.message_ids.fetch_add(1, Ordering::Relaxed).to_string()
    }

    /// Open the transport and exchange hellos.
    ///
    /// Connecting an already connected session is a no-op.
    ///
    /// # Errors
    ///
    /// [`SessionError::Connection`] naming the device's `host:port` and
    /// wrapping whatever went wrong underneath.
    pub async fn connect(&self) -> Result<()> {
        let mut link = self.link.write().await;
        if self.state() == SessionState::Connected && link.is_alive() {
            debug!("{}: already connected", self.identity);
            return Ok(());
        }
        self.establish(&mut link).await
    }

    /// Close the session gracefully with `<close-session>`, then the transport.
    pub async fn disconnect(&self) -> Result<()> {
        self.disconnect_with(false).await
    }

    /// Close the session, with `<kill-session>` when `force` is set.
    ///
    /// The RPC is sent once; whatever its outcome, the transport is closed and
    /// the session ends up [`SessionState::Closed`]. Only a failure to close
    /// the transport is returned.
    pub async fn disconnect_with(&self, force: bool) -> Result<()> {
        let mut link = self.link.write().await;
        self.teardown(&mut link, force).await
    }

    /// Disconnect and connect again, without letting RPCs in between.
    pub async fn reconnect(&self) -> Result<()> {
        let mut link = self.link.write().await;
        info!("{}: reconnecting", self.identity);
        if let Err(e) = self.teardown(&mut link, false).await {
            warn!("{}: error while disconnecting for reconnect: {}", self.identity, e);
        }
        self.establish(&mut link).await
    }

    /// Send `request` and return a handle to its eventual reply.
    ///
    /// The request is normalised with [`rpc::format_request`] so that it
    /// carries `message_id`. If the channel was lost while the session was
    /// connected, outstanding replies are discarded and the session is
    /// re-established before sending.
    pub async fn async_rpc(&self, request: &str, message_id: &str) -> Result<PendingReply> {
        let request = rpc::format_request(request, message_id);
        {
            let link = self.link.read().await;
            self.ensure_connected()?;
            if link.is_alive() {
                return self.dispatch(&link, &request, message_id).await;
            }
        }

        self.reestablish().await?;
        let link = self.link.read().await;
        self.ensure_connected()?;
        self.dispatch(&link, &request, message_id).await
    }

    /// Send `request` and wait for its reply.
    ///
    /// `timeout` defaults to the device's reply timeout.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Timeout`]: other outstanding requests are unaffected.
    /// - [`SessionError::Transport`]: the channel failed; all outstanding
    ///   replies are discarded and the channel is closed before returning.
    /// - [`SessionError::Interrupted`]: the session was reset while waiting.
    pub async fn sync_rpc(
        &self,
        request: &str,
        message_id: &str,
        timeout: Option<Duration>,
    ) -> Result<String> {
        let timeout = timeout.unwrap_or(self.device.reply_timeout);
        let outcome = match self.async_rpc(request, message_id).await {
            Ok(pending) => pending.wait(timeout).await,
            Err(e) => Err(e),
        };
        if let Err(err @ Error::Session(SessionError::Transport { .. })) = &outcome {
            warn!("{}: {}", self.identity, err);
            self.abandon_link().await;
        }
        outcome
    }

    /// Discard every outstanding reply and close the channel after a
    /// transport failure. The session stays connected so the next RPC
    /// re-establishes it.
    async fn abandon_link(&self) {
        let discarded = self.replies.clear();
        if discarded > 0 {
            debug!("{}: discarded {} pending replies", self.identity, discarded);
        }
        if let Err(e) = self.close_transport().await {
            warn!("{}: failed to close channel after transport error: {}", self.identity, e);
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.state() == SessionState::Connected {
            Ok(())
        } else {
            Err(SessionError::NotConnected {
                device: self.identity.clone(),
            }
            .into())
        }
    }

    fn context(&self, request: &str) -> RequestContext {
        RequestContext {
            device: self.identity.clone(),
            session_id: self.session_id().unwrap_or_default(),
            request: request.to_string(),
        }
    }

    /// Register the reply slot, then write the framed request.
    async fn dispatch(
        &self,
        link: &Link<T>,
        request: &str,
        message_id: &str,
    ) -> Result<PendingReply> {
        let pending = self.replies.register(message_id, self.context(request))?;
        let framed = encode(self.framing(), request);
        debug!("{}: sending request {}: {}", self.identity, message_id, request);

        let mut writer = link.writer.lock().await;
        let writer = writer.as_mut().ok_or_else(|| SessionError::NotConnected {
            device: self.identity.clone(),
        })?;
        let written = async {
            writer.write_all(&framed).await?;
            writer.flush().await
        }
        .await;

        match written {
            Ok(()) => Ok(pending),
            Err(e) => Err(SessionError::Transport {
                device: self.identity.clone(),
                session_id: self.session_id().unwrap_or_default(),
                request: request.to_string(),
                reason: e.to_string(),
            }
            .into()),
        }
    }

    async fn reestablish(&self) -> Result<()> {
        let mut link = self.link.write().await;
        self.ensure_connected()?;
        if link.is_alive() {
            return Ok(());
        }
        let dropped = self.replies.clear();
        warn!(
            "{}: NETCONF channel lost, re-establishing session ({} pending replies discarded)",
            self.identity, dropped
        );
        self.establish(&mut link).await
    }

    async fn establish(&self, link: &mut Link<T>) -> Result<()> {
        self.set_state(SessionState::Connecting);
        link.detach();
        self.replies.clear();

        match self.open_and_hello(link).await {
            Ok(()) => {
                self.set_state(SessionState::Connected);
                info!(
                    "{}: NETCONF session {} established",
                    self.identity,
                    self.session_id().unwrap_or_default()
                );
                Ok(())
            }
            Err(e) => {
                link.detach();
                self.replies.clear();
                if let Err(close_err) = link.transport.close().await {
                    debug!("{}: close after failed connect: {}", self.identity, close_err);
                }
                self.set_state(SessionState::Disconnected);
                Err(SessionError::Connection {
                    device: self.identity.clone(),
                    source: Box::new(e),
                }
                .into())
            }
        }
    }

    async fn open_and_hello(&self, link: &mut Link<T>) -> Result<()> {
        info!("{}: opening NETCONF session", self.identity);
        let (reader, writer) = link.transport.open().await?;
        *link.writer.get_mut() = Some(writer);
        self.negotiated().framing = Framing::EndOfMessage;

        let server_hello = self.replies.register(HELLO_MESSAGE_ID, self.context("<hello>"))?;
        link.communicator = Some(DeviceCommunicator::spawn(
            reader,
            self.replies.clone(),
            self.identity.clone(),
            self.device.capabilities.clone(),
        ));

        let hello = rpc::hello(&self.device.capabilities);
        debug!("{}: sending hello: {}", self.identity, hello);
        if let Some(writer) = link.writer.get_mut().as_mut() {
            writer
                .write_all(&encode(Framing::EndOfMessage, &hello))
                .await
                .map_err(TransportError::Io)?;
            writer.flush().await.map_err(TransportError::Io)?;
        }

        let server_hello = server_hello.wait(self.device.connect_timeout).await?;
        let session_id = rpc::extract_session_id(&server_hello).ok_or_else(|| {
            ProtocolError::MissingSessionId {
                hello: server_hello.clone(),
            }
        })?;
        let capabilities = rpc::extract_capabilities(&server_hello);
        let framing = Framing::negotiate(&self.device.capabilities, &capabilities);
        debug!(
            "{}: session-id {}, {} device capabilities, {:?} framing",
            self.identity,
            session_id,
            capabilities.len(),
            framing
        );

        let mut negotiated = self.negotiated();
        negotiated.session_id = Some(session_id);
        negotiated.capabilities = capabilities;
        negotiated.framing = framing;
        drop(negotiated);
        self.set_state(SessionState::HelloExchanged);
        Ok(())
    }

    async fn teardown(&self, link: &mut Link<T>, force: bool) -> Result<()> {
        if link.is_alive() && self.state() == SessionState::Connected {
            let message_id = self.next_message_id();
            let request = rpc::close_session(&message_id, force);
            let outcome = match self.dispatch(link, &request, &message_id).await {
                Ok(pending) => pending.wait(self.device.reply_timeout).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(reply) if rpc::check_reply(Some(&reply)) => {
                    debug!("{}: session closed by device", self.identity)
                }
                Ok(reply) => warn!("{}: close-session rejected: {}", self.identity, reply),
                Err(e) => warn!("{}: close-session failed: {}", self.identity, e),
            }
        }

        link.detach();
        let discarded = self.replies.clear();
        if discarded > 0 {
            debug!("{}: discarded {} pending replies", self.identity, discarded);
        }
        let closed = link.transport.close().await;
        self.set_state(SessionState::Closed);
        info!("{}: NETCONF session closed", self.identity);
        closed
    }

    async fn close_transport(&self) -> Result<()> {
        let mut link = self.link.write().await;
        link.detach();
        link.transport.close().await
    }
}

impl<T: Transport> std::fmt::Debug for NetconfSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let negotiated = self.negotiated();
        f.debug_struct("NetconfSession")
            .field("device", &self.identity)
            .field("state", &negotiated.state)
            .field("session_id", &negotiated.session_id)
            .field("pending_replies", &self.replies.len())
            .finish()
    }
}
