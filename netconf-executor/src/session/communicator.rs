//! Background reader feeding the reply-correlation table.

use bytes::BytesMut;
use log::{debug, info, trace, warn};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

use super::replies::ReplyTable;
use crate::framing::{FrameDecoder, Framing};
use crate::rpc::{extract_capabilities, extract_message_id, is_hello_message};

const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Owns the task draining the device's byte stream.
///
/// Messages are split with a [`FrameDecoder`] and routed by message-id. The
/// first message is the server hello; once it is seen the decoder switches
/// to chunked framing if both sides advertised base:1.1. When the stream
/// ends or breaks, every outstanding reply is failed.
#[derive(Debug)]
pub(crate) struct DeviceCommunicator {
    task: JoinHandle<()>,
}

impl DeviceCommunicator {
    pub(crate) fn spawn<R>(
        reader: R,
        replies: ReplyTable,
        device: String,
        local_capabilities: Vec<String>,
    ) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let task = tokio::spawn(read_loop(reader, replies, device, local_capabilities));
        Self { task }
    }

    /// `false` once the reader has hit end-of-stream or an error.
    pub(crate) fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub(crate) fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for DeviceCommunicator {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn read_loop<R>(
    mut reader: R,
    replies: ReplyTable,
    device: String,
    local_capabilities: Vec<String>,
) where
    R: AsyncRead + Unpin,
{
    let mut decoder = FrameDecoder::new();
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
    let mut hello_seen = false;

    let reason = loop {
        buf.clear();
        match reader.read_buf(&mut buf).await {
            Ok(0) => break "channel closed by device".to_string(),
            Ok(n) => {
                trace!("{}: read {} bytes: {:?}", device, n, String::from_utf8_lossy(&buf));
                decoder.extend(&buf);
            }
            Err(e) => break format!("read failed: {e}"),
        }

        let drained = loop {
            let message = match decoder.next_message() {
                Ok(Some(message)) => message,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            };
            let message = String::from_utf8_lossy(&message).trim().to_string();
            if message.is_empty() {
                continue;
            }

            if !hello_seen && is_hello_message(&message) {
                hello_seen = true;
                let remote = extract_capabilities(&message);
                let framing = Framing::negotiate(&local_capabilities, &remote);
                debug!("{}: received server hello, framing is now {:?}", device, framing);
                decoder.set_framing(framing);
            }
            dispatch(&replies, &device, message);
        };

        if let Err(e) = drained {
            break format!("framing error: {e}");
        }
    };

    let failed = replies.fail_all(&reason);
    if failed > 0 {
        warn!("{}: reader stopped ({}), failed {} pending replies", device, reason, failed);
    } else {
        info!("{}: reader stopped ({})", device, reason);
    }
}

fn dispatch(replies: &ReplyTable, device: &str, message: String) {
    let message_id = extract_message_id(&message);
    if message_id.is_empty() {
        warn!("{}: dropping message without message-id: {}", device, message);
        return;
    }
    debug!("{}: received reply for message-id {}: {}", device, message_id, message);
    if !replies.resolve(&message_id, message) {
        debug!(
            "{}: no pending request for message-id {}, reply dropped",
            device, message_id
        );
    }
}
