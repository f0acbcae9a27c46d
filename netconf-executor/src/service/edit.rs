//! The `edit-config` transaction: lock, prepare, edit, validate, commit, unlock.

use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::{DeviceResponse, NetconfRpcService, RpcStatus};
use crate::error::Result;
use crate::rpc::{self, Datastore};
use crate::transport::Transport;

/// Knobs for [`NetconfRpcService::edit_config`].
///
/// ```rust
/// use std::time::Duration;
/// use netconf_executor::EditConfigOptions;
///
/// let options = EditConfigOptions::default()
///     .clear_candidate(true)
///     .validate(true)
///     .discard_changes_on_commit_failure(true)
///     .wait(Duration::from_secs(2));
/// assert!(options.lock && options.commit && options.unlock);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditConfigOptions {
    /// Reconnect the session before starting.
    pub reconnect: bool,

    /// Delay before the transaction starts.
    pub wait: Duration,

    /// Lock `target` first and abort if the lock is refused.
    pub lock: bool,

    /// Datastore that is locked, edited and unlocked.
    pub target: Datastore,

    /// `<default-operation>` of the edit (`merge`, `replace` or `none`).
    pub default_operation: Option<String>,

    /// Delete the candidate datastore before editing.
    pub clear_candidate: bool,

    /// Discard stray uncommitted changes before editing.
    pub discard_changes: bool,

    /// Validate the candidate after editing.
    pub validate: bool,

    /// Commit after editing.
    pub commit: bool,

    /// Issue `<discard-changes>` when the commit is rejected.
    pub discard_changes_on_commit_failure: bool,

    /// Settle time before an (external) device restart.
    pub pre_restart_wait: Duration,

    /// Settle time after an (external) device restart.
    pub post_restart_wait: Duration,

    /// Release the lock at the end, whatever happened before.
    pub unlock: bool,

    /// Reply timeout for the edit itself; other steps use the device's.
    pub message_timeout: Option<Duration>,
}

impl Default for EditConfigOptions {
    fn default() -> Self {
        Self {
            reconnect: false,
            wait: Duration::ZERO,
            lock: true,
            target: Datastore::Candidate,
            default_operation: Some("merge".to_string()),
            clear_candidate: false,
            discard_changes: false,
            validate: false,
            commit: true,
            discard_changes_on_commit_failure: false,
            pre_restart_wait: Duration::ZERO,
            post_restart_wait: Duration::ZERO,
            unlock: true,
            message_timeout: None,
        }
    }
}

impl EditConfigOptions {
    pub fn reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    pub fn lock(mut self, lock: bool) -> Self {
        self.lock = lock;
        self
    }

    pub fn target(mut self, target: Datastore) -> Self {
        self.target = target;
        self
    }

    /// Set the `<default-operation>`; `None` leaves the element out.
    pub fn default_operation(mut self, operation: Option<&str>) -> Self {
        self.default_operation = operation.map(str::to_string);
        self
    }

    pub fn clear_candidate(mut self, clear: bool) -> Self {
        self.clear_candidate = clear;
        self
    }

    pub fn discard_changes(mut self, discard: bool) -> Self {
        self.discard_changes = discard;
        self
    }

    pub fn validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn commit(mut self, commit: bool) -> Self {
        self.commit = commit;
        self
    }

    pub fn discard_changes_on_commit_failure(mut self, discard: bool) -> Self {
        self.discard_changes_on_commit_failure = discard;
        self
    }

    pub fn pre_restart_wait(mut self, wait: Duration) -> Self {
        self.pre_restart_wait = wait;
        self
    }

    pub fn post_restart_wait(mut self, wait: Duration) -> Self {
        self.post_restart_wait = wait;
        self
    }

    pub fn unlock(mut self, unlock: bool) -> Self {
        self.unlock = unlock;
        self
    }

    pub fn message_timeout(mut self, timeout: Duration) -> Self {
        self.message_timeout = Some(timeout);
        self
    }
}

impl<T: Transport> NetconfRpcService<T> {
    /// Apply `config` as one transaction.
    ///
    /// Steps run in this order, each recorded under
    /// `"<message-id>-<step>"` in the returned response:
    ///
    /// | step | key | on failure |
    /// |------|-----|------------|
    /// | reconnect (optional) | | abort, no unlock |
    /// | lock | `-lock` | abort, no unlock |
    /// | delete candidate | `-delete` | abort |
    /// | discard changes | `-discard` | abort |
    /// | edit-config | `-edit` | abort |
    /// | validate | `-validate` | abort |
    /// | commit | `-commit` | continue; optional `-discard-changes` |
    /// | unlock (only after lock) | `-unlock` | overall status becomes failure |
    ///
    /// The restart waits run between commit and unlock whatever happened
    /// before. The overall status is success only if every step succeeded.
    pub async fn edit_config(&self, config: &str, options: &EditConfigOptions) -> DeviceResponse {
        let message_id = self.session.next_message_id();
        let device = self.session.device_info().to_string();
        let mut response = DeviceResponse {
            status: RpcStatus::Success,
            request_message: None,
            response_message: None,
            error_message: None,
            sub_responses: Default::default(),
        };

        let may_unlock = self.transaction(&message_id, config, options, &mut response).await;

        if !options.pre_restart_wait.is_zero() {
            info!("{}: waiting {:?} before restart", device, options.pre_restart_wait);
            tokio::time::sleep(options.pre_restart_wait).await;
        }
        if !options.post_restart_wait.is_zero() {
            info!("{}: waiting {:?} after restart", device, options.post_restart_wait);
            tokio::time::sleep(options.post_restart_wait).await;
        }

        if options.lock && options.unlock && may_unlock {
            let target = options.target;
            let unlocked = self
                .step(&mut response, &message_id, "unlock", None, |id| {
                    Ok(rpc::unlock(id, target))
                })
                .await;
            if !unlocked {
                warn!("{}: datastore {} may still be locked", device, target);
            }
        }

        self.recorder.record(&message_id, response.status);
        response
    }

    /// Steps up to and including commit. Returns `false` when a requested
    /// lock was never acquired, so no unlock must be attempted.
    async fn transaction(
        &self,
        message_id: &str,
        config: &str,
        options: &EditConfigOptions,
        response: &mut DeviceResponse,
    ) -> bool {
        let device = self.session.device_info().to_string();
        let target = options.target;

        if options.reconnect {
            if let Err(e) = self.session.reconnect().await {
                response.fail(format!("{}: reconnect before edit-config failed: {}", device, e));
                return false;
            }
        }

        if !options.wait.is_zero() {
            info!("{}: waiting {:?} for the transaction to start", device, options.wait);
            tokio::time::sleep(options.wait).await;
        }

        if options.lock
            && !self
                .step(response, message_id, "lock", None, |id| Ok(rpc::lock(id, target)))
                .await
        {
            return false;
        }

        if options.clear_candidate
            && !self
                .step(response, message_id, "delete", None, |id| {
                    rpc::delete_config(id, Datastore::Candidate)
                })
                .await
        {
            return true;
        }

        if options.discard_changes
            && !self
                .step(response, message_id, "discard", None, |id| Ok(rpc::discard_changes(id)))
                .await
        {
            return true;
        }

        let default_operation = options.default_operation.as_deref();
        let edited = self
            .step(response, message_id, "edit", options.message_timeout, |id| {
                Ok(rpc::edit_config(id, target, default_operation, config))
            })
            .await;
        let edit_messages = response
            .sub_response(&format!("{message_id}-edit"))
            .map(|edit| (edit.request_message.clone(), edit.response_message.clone()));
        if let Some((request, reply)) = edit_messages {
            response.request_message = request;
            response.response_message = reply;
        }
        if !edited {
            return true;
        }

        if options.validate
            && !self
                .step(response, message_id, "validate", None, |id| {
                    Ok(rpc::validate(id, Datastore::Candidate))
                })
                .await
        {
            return true;
        }

        if options.commit
            && !self
                .step(response, message_id, "commit", None, |id| rpc::commit(id, false, 0, "", ""))
                .await
            && options.discard_changes_on_commit_failure
        {
            let discard_id = format!("{message_id}-discard-changes");
            let discarded = self
                .execute("discard-changes", &discard_id, rpc::discard_changes(&discard_id), None)
                .await;
            if !discarded.is_success() {
                warn!("{}: discard after failed commit was rejected", device);
            }
            response.add_sub_response(discard_id, discarded);
        }

        true
    }

    /// Run one pipeline step under `"<message_id>-<step>"`, recording it in
    /// `parent` and failing `parent` if it failed.
    async fn step<F>(
        &self,
        parent: &mut DeviceResponse,
        message_id: &str,
        step: &str,
        timeout: Option<Duration>,
        build: F,
    ) -> bool
    where
        F: FnOnce(&str) -> Result<String>,
    {
        let step_id = format!("{message_id}-{step}");
        let result = match build(&step_id) {
            Ok(request) => self.execute(step, &step_id, request, timeout).await,
            Err(e) => DeviceResponse::failed(None, None, e.to_string()),
        };

        let succeeded = result.is_success();
        if !succeeded {
            let reason = result
                .error_message
                .clone()
                .unwrap_or_else(|| format!("{step} failed"));
            parent.fail(reason);
        }
        parent.add_sub_response(step_id, result);
        succeeded
    }
}
