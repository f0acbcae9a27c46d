//! Scripted in-memory NETCONF device for integration tests.

#![allow(dead_code)]

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use netconf_executor::error::TransportError;
use netconf_executor::framing::{FrameDecoder, Framing, encode};
use netconf_executor::rpc::{
    NETCONF_BASE_1_0, NETCONF_BASE_1_1, NETCONF_BASE_NAMESPACE, extract_capabilities,
    extract_message_id,
};
use netconf_executor::{DeviceInfo, NetconfSession, Transport};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

pub const CANDIDATE: &str = "urn:ietf:params:netconf:capability:candidate:1.0";

/// What the device does with one request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// `<rpc-reply><ok/></rpc-reply>`
    Ok,
    /// `<rpc-reply><data>..</data></rpc-reply>`
    Data(String),
    /// `<rpc-reply><rpc-error>` with the given error-tag
    Error(&'static str),
    /// Never answer
    Silent,
    /// Answer with `Ok` after a delay
    Delayed(Duration),
    /// Send this raw message first, then answer with `Ok`
    Stray(String),
    /// Drop the connection
    Hangup,
}

type Responder = Arc<dyn Fn(&str) -> Reply + Send + Sync>;

/// Behaviour of the fake device.
#[derive(Clone)]
pub struct FakeDevice {
    pub capabilities: Vec<String>,
    pub session_id: Option<String>,
    /// Hold replies until this many requests arrived, then send them in
    /// reverse order. Zero answers immediately.
    pub reverse_batch: usize,
    /// Fail `open` instead of connecting.
    pub refuse_connect: bool,
    /// Accept the first `open`, fail every later one.
    pub refuse_reconnect: bool,
    /// While set, writes from the client fail with a broken pipe.
    pub break_writes: Arc<AtomicBool>,
    pub responder: Responder,
    pub received: Arc<Mutex<Vec<String>>>,
}

impl Default for FakeDevice {
    fn default() -> Self {
        Self {
            capabilities: vec![
                NETCONF_BASE_1_0.to_string(),
                NETCONF_BASE_1_1.to_string(),
                CANDIDATE.to_string(),
            ],
            session_id: Some("4711".to_string()),
            reverse_batch: 0,
            refuse_connect: false,
            refuse_reconnect: false,
            break_writes: Arc::new(AtomicBool::new(false)),
            responder: Arc::new(|_| Reply::Ok),
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl FakeDevice {
    pub fn respond_with<F>(mut self, responder: F) -> Self
    where
        F: Fn(&str) -> Reply + Send + Sync + 'static,
    {
        self.responder = Arc::new(responder);
        self
    }

    pub fn base_1_0_only(mut self) -> Self {
        self.capabilities = vec![NETCONF_BASE_1_0.to_string(), CANDIDATE.to_string()];
        self
    }

    /// Every request received after the hello, in arrival order.
    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    pub fn received_containing(&self, needle: &str) -> usize {
        self.received().iter().filter(|r| r.contains(needle)).count()
    }

    fn hello(&self) -> String {
        let mut hello = format!("<hello xmlns=\"{NETCONF_BASE_NAMESPACE}\">\n<capabilities>\n");
        for cap in &self.capabilities {
            hello.push_str(&format!("<capability>{cap}</capability>\n"));
        }
        hello.push_str("</capabilities>\n");
        if let Some(id) = &self.session_id {
            hello.push_str(&format!("<session-id>{id}</session-id>\n"));
        }
        hello.push_str("</hello>");
        hello
    }
}

pub fn rpc_reply(message_id: &str, body: &str) -> String {
    format!(
        "<rpc-reply message-id=\"{message_id}\" xmlns=\"{NETCONF_BASE_NAMESPACE}\">{body}</rpc-reply>"
    )
}

fn rpc_error(tag: &str) -> String {
    format!(
        "<rpc-error><error-type>protocol</error-type><error-tag>{tag}</error-tag>\
         <error-severity>error</error-severity></rpc-error>"
    )
}

type Writer = Arc<AsyncMutex<WriteHalf<DuplexStream>>>;

async fn send(writer: &Writer, framing: Framing, message: &str) {
    let mut writer = writer.lock().await;
    let _ = writer.write_all(&encode(framing, message)).await;
    let _ = writer.flush().await;
}

async fn serve(stream: DuplexStream, device: FakeDevice) {
    let (mut reader, writer) = tokio::io::split(stream);
    let writer: Writer = Arc::new(AsyncMutex::new(writer));
    send(&writer, Framing::EndOfMessage, &device.hello()).await;

    let mut decoder = FrameDecoder::new();
    let mut framing = Framing::EndOfMessage;
    let mut held: Vec<String> = Vec::new();
    let mut buf = vec![0u8; 8192];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        decoder.extend(&buf[..n]);

        while let Ok(Some(message)) = decoder.next_message() {
            let message = String::from_utf8_lossy(&message).into_owned();
            if message.contains("<hello") {
                framing = Framing::negotiate(&device.capabilities, &extract_capabilities(&message));
                decoder.set_framing(framing);
                continue;
            }

            device.received.lock().unwrap().push(message.clone());
            let message_id = extract_message_id(&message);
            let reply = match (device.responder)(&message) {
                Reply::Ok => rpc_reply(&message_id, "<ok/>"),
                Reply::Data(data) => rpc_reply(&message_id, &format!("<data>{data}</data>")),
                Reply::Error(tag) => rpc_reply(&message_id, &rpc_error(tag)),
                Reply::Silent => continue,
                Reply::Delayed(delay) => {
                    let writer = writer.clone();
                    let reply = rpc_reply(&message_id, "<ok/>");
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        send(&writer, framing, &reply).await;
                    });
                    continue;
                }
                Reply::Stray(raw) => {
                    send(&writer, framing, &raw).await;
                    rpc_reply(&message_id, "<ok/>")
                }
                Reply::Hangup => return,
            };

            if device.reverse_batch == 0 {
                send(&writer, framing, &reply).await;
            } else {
                held.push(reply);
                if held.len() == device.reverse_batch {
                    for reply in held.drain(..).rev() {
                        send(&writer, framing, &reply).await;
                    }
                }
            }
        }
    }
}

/// Client write half that can be made to fail on demand.
pub struct FaultyWriter {
    inner: WriteHalf<DuplexStream>,
    broken: Arc<AtomicBool>,
}

impl FaultyWriter {
    fn check(&self) -> io::Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"))
        } else {
            Ok(())
        }
    }
}

impl AsyncWrite for FaultyWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.check()?;
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.check()?;
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// [`Transport`] that connects to a [`FakeDevice`] over `tokio::io::duplex`.
pub struct FakeTransport {
    device: FakeDevice,
    server: Option<JoinHandle<()>>,
    connected: Arc<AtomicBool>,
    opens: Arc<AtomicUsize>,
}

impl FakeTransport {
    pub fn new(device: FakeDevice) -> Self {
        Self {
            device,
            server: None,
            connected: Arc::new(AtomicBool::new(false)),
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter of successful `open` calls.
    pub fn opens(&self) -> Arc<AtomicUsize> {
        self.opens.clone()
    }
}

impl Transport for FakeTransport {
    type Reader = ReadHalf<DuplexStream>;
    type Writer = FaultyWriter;

    async fn open(&mut self) -> netconf_executor::error::Result<(Self::Reader, Self::Writer)> {
        if let Some(server) = self.server.take() {
            server.abort();
        }
        let reopen = self.opens.load(Ordering::SeqCst) > 0;
        if self.device.refuse_connect || (self.device.refuse_reconnect && reopen) {
            return Err(TransportError::ConnectionFailed {
                host: "fake-device".to_string(),
                port: 830,
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            }
            .into());
        }

        let (client, server) = tokio::io::duplex(64 * 1024);
        self.server = Some(tokio::spawn(serve(server, self.device.clone())));
        self.connected.store(true, Ordering::SeqCst);
        self.opens.fetch_add(1, Ordering::SeqCst);
        let (reader, writer) = tokio::io::split(client);
        let writer = FaultyWriter {
            inner: writer,
            broken: self.device.break_writes.clone(),
        };
        Ok((reader, writer))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
            && self.server.as_ref().is_some_and(|s| !s.is_finished())
    }

    async fn close(&mut self) -> netconf_executor::error::Result<()> {
        if let Some(server) = self.server.take() {
            server.abort();
        }
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn device_info() -> DeviceInfo {
    DeviceInfo::builder("fake-device")
        .username("admin")
        .password("admin")
        .connect_timeout(Duration::from_secs(2))
        .reply_timeout(Duration::from_secs(2))
        .build()
        .unwrap()
}

/// A session over a fresh fake device, not yet connected.
pub fn session(device: &FakeDevice) -> (Arc<NetconfSession<FakeTransport>>, Arc<AtomicUsize>) {
    init_logging();
    let transport = FakeTransport::new(device.clone());
    let opens = transport.opens();
    (
        Arc::new(NetconfSession::with_transport(device_info(), transport)),
        opens,
    )
}

/// A connected session over a fresh fake device.
pub async fn connected(
    device: &FakeDevice,
) -> (Arc<NetconfSession<FakeTransport>>, Arc<AtomicUsize>) {
    let (session, opens) = session(device);
    session.connect().await.unwrap();
    (session, opens)
}
