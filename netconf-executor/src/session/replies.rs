//! Reply-correlation table.
//!
//! Maps message-id to the one-shot slot its reply is delivered into. Callers
//! register before sending, the background reader resolves, and a session
//! reset clears. Entries are removed on resolution, on clear, or when the
//! caller's [`PendingReply`] is dropped unresolved.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::debug;
use tokio::sync::oneshot;

use crate::error::{Result, SessionError};

/// Why a pending reply could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LinkFailure {
    pub(crate) reason: String,
}

type ReplySlot = oneshot::Sender<std::result::Result<String, LinkFailure>>;

/// Who is waiting for a reply; used to build error messages.
#[derive(Debug, Clone)]
pub(crate) struct RequestContext {
    pub(crate) device: String,
    pub(crate) session_id: String,
    pub(crate) request: String,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ReplyTable {
    slots: Arc<Mutex<HashMap<String, ReplySlot>>>,
}

impl ReplyTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, ReplySlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a slot for `message_id`.
    ///
    /// Fails if a reply with the same id is still outstanding.
    pub(crate) fn register(
        &self,
        message_id: &str,
        context: RequestContext,
    ) -> Result<PendingReply> {
        let (tx, rx) = oneshot::channel();
        let mut slots = self.slots();
        if slots.get(message_id).is_some_and(|slot| !slot.is_closed()) {
            return Err(SessionError::DuplicateMessageId(message_id.to_string()).into());
        }
        slots.insert(message_id.to_string(), tx);
        drop(slots);

        Ok(PendingReply {
            message_id: message_id.to_string(),
            receiver: rx,
            replies: self.clone(),
            context,
        })
    }

    /// Deliver `reply` to whoever registered `message_id`.
    ///
    /// Returns `false` when nobody is waiting (unknown or abandoned id).
    pub(crate) fn resolve(&self, message_id: &str, reply: String) -> bool {
        let slot = self.slots().remove(message_id);
        match slot {
            Some(slot) => slot.send(Ok(reply)).is_ok(),
            None => false,
        }
    }

    /// Fail every outstanding reply with a link failure. Returns how many were failed.
    pub(crate) fn fail_all(&self, reason: &str) -> usize {
        let slots: Vec<_> = self.slots().drain().collect();
        let count = slots.len();
        for (message_id, slot) in slots {
            debug!("Failing pending reply for message-id {}: {}", message_id, reason);
            let _ = slot.send(Err(LinkFailure {
                reason: reason.to_string(),
            }));
        }
        count
    }

    /// Drop every outstanding slot; waiters observe an interruption.
    pub(crate) fn clear(&self) -> usize {
        let mut slots = self.slots();
        let count = slots.len();
        slots.clear();
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.slots().len()
    }

    /// Remove `message_id` if its slot has been abandoned by the waiter.
    fn forget_abandoned(&self, message_id: &str) {
        let mut slots = self.slots();
        if slots.get(message_id).is_some_and(|slot| slot.is_closed()) {
            slots.remove(message_id);
        }
    }
}

/// Handle to a reply that has been requested but not yet received.
///
/// Returned by [`NetconfSession::async_rpc`](crate::NetconfSession::async_rpc).
/// Await it with [`wait`](Self::wait); dropping it unresolved withdraws the
/// request from the correlation table, so a late reply is discarded.
#[derive(Debug)]
pub struct PendingReply {
    message_id: String,
    receiver: oneshot::Receiver<std::result::Result<String, LinkFailure>>,
    replies: ReplyTable,
    context: RequestContext,
}

impl PendingReply {
    /// Message-id this handle is waiting on.
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Wait up to `timeout` for the reply.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Timeout`] when no reply arrived in time; other
    ///   outstanding replies are untouched.
    /// - [`SessionError::Transport`] when the reader lost the link.
    /// - [`SessionError::Interrupted`] when the table was cleared underneath us.
    pub async fn wait(mut self, timeout: Duration) -> Result<String> {
        match tokio::time::timeout(timeout, &mut self.receiver).await {
            Ok(Ok(Ok(reply))) => Ok(reply),
            Ok(Ok(Err(failure))) => Err(SessionError::Transport {
                device: self.context.device.clone(),
                session_id: self.context.session_id.clone(),
                request: self.context.request.clone(),
                reason: failure.reason,
            }
            .into()),
            Ok(Err(_)) => Err(SessionError::Interrupted {
                device: self.context.device.clone(),
                request: self.context.request.clone(),
            }
            .into()),
            Err(_) => Err(SessionError::Timeout {
                device: self.context.device.clone(),
                request: self.context.request.clone(),
                timeout,
            }
            .into()),
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        self.receiver.close();
        self.replies.forget_abandoned(&self.message_id);
    }
}
