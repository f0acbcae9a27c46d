//! High-level NETCONF operations reporting [`DeviceResponse`]s.
//!
//! Every primitive builds its RPC, sends it over the session and folds the
//! outcome into a `DeviceResponse`. Device-side and transport failures come
//! back as `RpcStatus::Failure` with the error text rather than as `Err`, so
//! a caller driving a multi-step change can look at each step and decide
//! what to do next. Only requests that can never be valid (a commit with
//! conflicting parameters, deleting `running`) are rejected with an error.

mod edit;
mod response;

use std::sync::Arc;
use std::time::Duration;

use log::{error, info};

pub use edit::EditConfigOptions;
pub use response::{DeviceResponse, RpcStatus};

use crate::error::{ProtocolError, Result};
use crate::rpc::{self, Datastore};
use crate::session::NetconfSession;
use crate::transport::{DeviceInfo, SshTransport, Transport};

/// Receives the final status of every `edit_config` pipeline.
///
/// The surrounding service plugs in whatever keeps an audit trail of applied
/// configuration; the default does nothing.
pub trait ApplyConfigRecorder: Send + Sync {
    fn record(&self, request_id: &str, status: RpcStatus);
}

/// Recorder that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecorder;

impl ApplyConfigRecorder for NoopRecorder {
    fn record(&self, _request_id: &str, _status: RpcStatus) {}
}

/// NETCONF operations against one device.
///
/// # Example
///
/// ```rust,no_run
/// use netconf_executor::{Datastore, DeviceInfo, EditConfigOptions, NetconfRpcService};
///
/// # async fn example() -> Result<(), netconf_executor::Error> {
/// let device = DeviceInfo::builder("192.168.1.1")
///     .username("admin")
///     .password("secret")
///     .build()?;
///
/// let service = NetconfRpcService::new(device);
/// service.connect().await?;
///
/// let options = EditConfigOptions::default().validate(true);
/// let response = service
///     .edit_config("<system><host-name>edge1</host-name></system>", &options)
///     .await;
/// println!("{}", serde_json::to_string_pretty(&response).unwrap());
///
/// let running = service.get_config(Datastore::Running, None).await;
/// assert!(running.is_success());
///
/// service.disconnect().await?;
/// # Ok(())
/// # }
/// ```
pub struct NetconfRpcService<T: Transport = SshTransport> {
    session: Arc<NetconfSession<T>>,
    recorder: Arc<dyn ApplyConfigRecorder>,
}

impl NetconfRpcService<SshTransport> {
    /// Create a service talking to `device` over SSH.
    pub fn new(device: DeviceInfo) -> Self {
        Self::with_session(Arc::new(NetconfSession::new(device)))
    }
}

impl<T: Transport> NetconfRpcService<T> {
    /// Wrap an existing session.
    pub fn with_session(session: Arc<NetconfSession<T>>) -> Self {
        Self {
            session,
            recorder: Arc::new(NoopRecorder),
        }
    }

    /// Replace the recorder notified after each `edit_config`.
    pub fn with_recorder(mut self, recorder: Arc<dyn ApplyConfigRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn session(&self) -> &Arc<NetconfSession<T>> {
        &self.session
    }

    fn reply_timeout(&self) -> Duration {
        self.session.device_info().reply_timeout
    }

    pub async fn connect(&self) -> Result<()> {
        self.session.connect().await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.session.disconnect().await
    }

    pub async fn reconnect(&self) -> Result<()> {
        self.session.reconnect().await
    }

    /// Send `request` and fold the outcome into a [`DeviceResponse`].
    ///
    /// Succeeds only when a reply arrives and contains no `rpc-error`.
    async fn execute(
        &self,
        operation: &str,
        message_id: &str,
        request: String,
        timeout: Option<Duration>,
    ) -> DeviceResponse {
        info!("{}: {}: messageId({})", self.session.device_info(), operation, message_id);
        let timeout = timeout.unwrap_or_else(|| self.reply_timeout());
        match self.session.sync_rpc(&request, message_id, Some(timeout)).await {
            Ok(reply) if rpc::check_reply(Some(&reply)) => DeviceResponse::success(request, reply),
            Ok(reply) => {
                let err = ProtocolError::RpcError { reply: reply.clone() };
                error!(
                    "{}: '{}' rejected by device: {}",
                    self.session.device_info(),
                    operation,
                    err
                );
                DeviceResponse::failed(
                    Some(request),
                    Some(reply),
                    format!(
                        "{}: failed in '{}' command. Message: {}",
                        self.session.device_info(),
                        operation,
                        err
                    ),
                )
            }
            Err(e) => {
                error!("{}: failed in '{}' command: {}", self.session.device_info(), operation, e);
                DeviceResponse::failed(
                    Some(request),
                    None,
                    format!(
                        "{}: failed in '{}' command. Message: {}",
                        self.session.device_info(),
                        operation,
                        e
                    ),
                )
            }
        }
    }

    /// Send a caller-supplied `<rpc>`, renumbered with the next message-id.
    pub async fn invoke_rpc(&self, rpc: &str) -> DeviceResponse {
        let message_id = self.session.next_message_id();
        let original = rpc::extract_message_id(rpc);
        info!(
            "{}: invoke-rpc: renumbering message-id {:?} to {}",
            self.session.device_info(),
            original,
            message_id
        );
        let request = rpc::format_request(rpc, &message_id);
        self.execute("invoke-rpc", &message_id, request, None).await
    }

    /// Retrieve operational state and configuration with `<get>`.
    pub async fn get(&self, filter: Option<&str>) -> DeviceResponse {
        let message_id = self.session.next_message_id();
        let request = rpc::get(&message_id, filter);
        self.execute("get", &message_id, request, None).await
    }

    pub async fn get_config(&self, datastore: Datastore, filter: Option<&str>) -> DeviceResponse {
        let message_id = self.session.next_message_id();
        let request = rpc::get_config(&message_id, datastore, filter);
        self.execute("get-config", &message_id, request, None).await
    }

    /// Send a single `<edit-config>`, without locking or committing.
    pub async fn edit_config_once(
        &self,
        config: &str,
        datastore: Datastore,
        default_operation: Option<&str>,
    ) -> DeviceResponse {
        let message_id = self.session.next_message_id();
        let request = rpc::edit_config(&message_id, datastore, default_operation, config);
        self.execute("edit-config", &message_id, request, None).await
    }

    /// Delete a datastore.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for [`Datastore::Running`], before anything is sent.
    pub async fn delete_config(&self, datastore: Datastore) -> Result<DeviceResponse> {
        let message_id = self.session.next_message_id();
        let request = rpc::delete_config(&message_id, datastore)?;
        Ok(self.execute("delete-config", &message_id, request, None).await)
    }

    pub async fn lock(&self, datastore: Datastore) -> DeviceResponse {
        let message_id = self.session.next_message_id();
        let request = rpc::lock(&message_id, datastore);
        self.execute("lock", &message_id, request, None).await
    }

    pub async fn unlock(&self, datastore: Datastore) -> DeviceResponse {
        let message_id = self.session.next_message_id();
        let request = rpc::unlock(&message_id, datastore);
        self.execute("unlock", &message_id, request, None).await
    }

    /// Commit the candidate configuration.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when `persist` and `persist_id` are both given, or
    /// when a confirmed commit names a `persist_id`.
    pub async fn commit(
        &self,
        confirmed: bool,
        confirm_timeout: u32,
        persist: &str,
        persist_id: &str,
    ) -> Result<DeviceResponse> {
        let message_id = self.session.next_message_id();
        let request = rpc::commit(&message_id, confirmed, confirm_timeout, persist, persist_id)?;
        Ok(self.execute("commit", &message_id, request, None).await)
    }

    pub async fn cancel_commit(&self, persist_id: &str) -> DeviceResponse {
        let message_id = self.session.next_message_id();
        let request = rpc::cancel_commit(&message_id, persist_id);
        self.execute("cancel-commit", &message_id, request, None).await
    }

    /// Discard uncommitted changes in the candidate datastore.
    pub async fn discard_config(&self) -> DeviceResponse {
        let message_id = self.session.next_message_id();
        let request = rpc::discard_changes(&message_id);
        self.execute("discard-changes", &message_id, request, None).await
    }

    pub async fn validate(&self, datastore: Datastore) -> DeviceResponse {
        let message_id = self.session.next_message_id();
        let request = rpc::validate(&message_id, datastore);
        self.execute("validate", &message_id, request, None).await
    }

    /// Send `<close-session>`, or `<kill-session>` when `force` is set.
    ///
    /// This only exchanges the RPC; use [`disconnect`](Self::disconnect) to
    /// also tear down the transport.
    pub async fn close(&self, force: bool) -> DeviceResponse {
        let message_id = self.session.next_message_id();
        let request = rpc::close_session(&message_id, force);
        self.execute("close-session", &message_id, request, None).await
    }
}

impl<T: Transport> std::fmt::Debug for NetconfRpcService<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetconfRpcService")
            .field("session", &self.session)
            .finish()
    }
}
