//! Gateway connection supervisor and per-socket session loop.
//!
//! [`GatewayClient::connect`] spawns a supervisor task that owns the whole
//! connection lifecycle:
//!
//! ```text
//! Disconnected -> Connecting -> (AwaitingHello) -> Identifying -> Connected
//!       ^                                                             |
//!       +------------------ close (any cause) + backoff -------------+
//! ```
//!
//! Each open socket gets a write pump, a heartbeat pump (started on hello),
//! and a read loop running on the supervisor task itself. Attachment handling
//! is spawned per attachment and never awaited by the read loop.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use super::backoff::{Backoff, DEFAULT_RECONNECT_BASE, DEFAULT_RECONNECT_CAP};
use super::error::GatewayError;
use super::heartbeat::{heartbeat_message, heartbeat_pump};
use super::protocol::{
    DEFAULT_INTENTS, DispatchEvent, GatewayFrame, InboundFrame, MessagePayload, UserPayload,
};
use super::state::{ConnectionPhase, GatewayStatus};
use super::writer::write_pump;
use crate::download::AttachmentHandler;

/// Default gateway endpoint (API v10, JSON encoding).
pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// Outbound queue depth per socket.
const WRITE_QUEUE_CAPACITY: usize = 64;

/// How long to wait for the write pump to flush its close frame.
const WRITER_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Protocol delays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayTimings {
    /// Wait between hello and identify.
    pub identify_delay: Duration,
    /// Wait between an invalid-session directive and re-identify.
    pub invalid_session_delay: Duration,
    /// First reconnect delay.
    pub reconnect_base: Duration,
    /// Upper bound on the reconnect delay.
    pub reconnect_cap: Duration,
}

impl Default for GatewayTimings {
    fn default() -> Self {
        Self {
            identify_delay: Duration::from_millis(2000),
            invalid_session_delay: Duration::from_millis(5000),
            reconnect_base: DEFAULT_RECONNECT_BASE,
            reconnect_cap: DEFAULT_RECONNECT_CAP,
        }
    }
}

/// Everything the gateway client needs to connect and filter messages.
#[derive(Clone)]
pub struct GatewayConfig {
    pub url: String,
    pub token: String,
    pub intents: u64,
    pub monitored_channels: HashSet<u64>,
    /// Author ids or usernames whose attachments are ignored.
    pub blacklisted_authors: HashSet<String>,
    pub timings: GatewayTimings,
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("intents", &self.intents)
            .field("monitored_channels", &self.monitored_channels)
            .field("blacklisted_authors", &self.blacklisted_authors)
            .field("timings", &self.timings)
            .finish()
    }
}

impl GatewayConfig {
    /// Config with default URL, intents, and timings.
    #[must_use]
    pub fn new(token: impl Into<String>, monitored_channels: HashSet<u64>) -> Self {
        Self {
            url: DEFAULT_GATEWAY_URL.to_string(),
            token: token.into(),
            intents: DEFAULT_INTENTS,
            monitored_channels,
            blacklisted_authors: HashSet::new(),
            timings: GatewayTimings::default(),
        }
    }

    fn is_blacklisted(&self, author: &UserPayload) -> bool {
        self.blacklisted_authors.contains(&author.id)
            || self.blacklisted_authors.contains(&author.username)
    }
}

struct Shared {
    config: GatewayConfig,
    handler: Arc<dyn AttachmentHandler>,
    status: Arc<GatewayStatus>,
    shutdown: CancellationToken,
}

/// Long-lived gateway connection.
pub struct GatewayClient {
    shared: Arc<Shared>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayClient")
            .field("config", &self.shared.config)
            .field("phase", &self.shared.status.phase())
            .finish_non_exhaustive()
    }
}

impl GatewayClient {
    /// Creates an idle client. Nothing happens until [`Self::connect`].
    #[must_use]
    pub fn new(config: GatewayConfig, handler: Arc<dyn AttachmentHandler>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                handler,
                status: Arc::new(GatewayStatus::new()),
                shutdown: CancellationToken::new(),
            }),
            supervisor: Mutex::new(None),
        }
    }

    /// Shared status handle, for health reporting.
    #[must_use]
    pub fn status(&self) -> Arc<GatewayStatus> {
        Arc::clone(&self.shared.status)
    }

    /// Starts the connection supervisor and waits for the first socket open.
    ///
    /// Failed connection attempts are retried with backoff, so this only
    /// returns once a socket is open. Everything after that (hello, identify,
    /// reconnects) runs in the background until [`Self::cleanup`].
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::AlreadyStarted` on a second call, and
    /// `GatewayError::Shutdown` if `cleanup` runs first.
    pub async fn connect(&self) -> Result<(), GatewayError> {
        let mut supervisor = self.supervisor.lock().await;
        if supervisor.is_some() {
            return Err(GatewayError::AlreadyStarted);
        }
        if self.shared.shutdown.is_cancelled() {
            return Err(GatewayError::Shutdown);
        }

        let (opened_tx, opened_rx) = oneshot::channel();
        *supervisor = Some(tokio::spawn(supervise(
            Arc::clone(&self.shared),
            opened_tx,
        )));
        drop(supervisor);

        opened_rx.await.map_err(|_| GatewayError::Shutdown)
    }

    /// Stops heartbeating, closes the socket, and disables reconnection.
    ///
    /// In-flight attachment downloads are not cancelled.
    pub async fn cleanup(&self) {
        self.shared.shutdown.cancel();
        let handle = self.supervisor.lock().await.take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!(error = %e, "gateway supervisor ended abnormally");
        }
        self.shared.status.set_phase(ConnectionPhase::Disconnected);
        info!("gateway client stopped");
    }
}

/// Connect, run, back off, repeat; never gives up on its own.
async fn supervise(shared: Arc<Shared>, opened_tx: oneshot::Sender<()>) {
    let mut opened_tx = Some(opened_tx);
    let mut backoff = Backoff::new(
        shared.config.timings.reconnect_base,
        shared.config.timings.reconnect_cap,
    );
    let mut has_connected = false;

    loop {
        shared.status.set_phase(ConnectionPhase::Connecting);
        info!(url = %shared.config.url, "connecting to gateway");

        let attempt = tokio::select! {
            () = shared.shutdown.cancelled() => break,
            result = tokio_tungstenite::connect_async(shared.config.url.as_str()) => result,
        };

        match attempt {
            Ok((stream, _response)) => {
                shared.status.begin_socket(has_connected);
                has_connected = true;
                if let Some(tx) = opened_tx.take() {
                    let _ = tx.send(());
                }

                let end = run_session(&shared, stream).await;
                if end.reached_ready {
                    backoff.reset();
                }
                info!(reason = %end.reason, "gateway socket closed");
            }
            Err(e) => {
                warn!(error = %e, "gateway connection failed");
            }
        }

        shared.status.set_phase(ConnectionPhase::Disconnected);
        if shared.shutdown.is_cancelled() {
            break;
        }

        let delay = backoff.next_delay();
        info!(
            attempt = backoff.attempt(),
            delay_ms = delay.as_millis() as u64,
            "reconnecting after backoff"
        );
        tokio::select! {
            () = shared.shutdown.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    shared.status.set_phase(ConnectionPhase::Disconnected);
    debug!("gateway supervisor exiting");
}

/// Why a socket stopped being read.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CloseReason {
    Shutdown,
    ReconnectRequested,
    ClosedByServer(Option<u16>),
    StreamEnded,
    ReadError(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shutdown => f.write_str("shutdown"),
            Self::ReconnectRequested => f.write_str("reconnect requested"),
            Self::ClosedByServer(Some(code)) => write!(f, "closed by server ({code})"),
            Self::ClosedByServer(None) => f.write_str("closed by server"),
            Self::StreamEnded => f.write_str("stream ended"),
            Self::ReadError(e) => write!(f, "read error: {e}"),
        }
    }
}

struct SessionEnd {
    reason: CloseReason,
    reached_ready: bool,
}

/// What the read loop should do after a frame.
enum Action {
    Continue,
    ScheduleIdentify(Duration),
    Close(CloseReason),
}

/// Per-socket state for the read loop.
struct Session<'a> {
    shared: &'a Shared,
    write_tx: mpsc::Sender<Message>,
    cancel: CancellationToken,
    heartbeat: Option<CancellationToken>,
    awaiting_first_frame: bool,
    reached_ready: bool,
}

#[instrument(skip_all)]
async fn run_session(
    shared: &Shared,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
) -> SessionEnd {
    let (sink, mut read) = stream.split();
    let (write_tx, write_rx) = mpsc::channel::<Message>(WRITE_QUEUE_CAPACITY);
    let cancel = shared.shutdown.child_token();
    let writer = tokio::spawn(write_pump(sink, write_rx, cancel.clone()));

    let mut session = Session {
        shared,
        write_tx,
        cancel: cancel.clone(),
        heartbeat: None,
        awaiting_first_frame: true,
        reached_ready: false,
    };

    let identify_timer = tokio::time::sleep(Duration::ZERO);
    tokio::pin!(identify_timer);
    let mut identify_pending = false;

    let reason = loop {
        let action = tokio::select! {
            () = cancel.cancelled() => Action::Close(CloseReason::Shutdown),

            () = &mut identify_timer, if identify_pending => {
                identify_pending = false;
                session.send_identify().await;
                Action::Continue
            }

            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => session.handle_text(text.as_str()).await,
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => session.handle_text(text).await,
                    Err(e) => {
                        error!(error = %e, "binary gateway frame is not UTF-8");
                        Action::Continue
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    Action::Close(CloseReason::ClosedByServer(frame.map(|f| u16::from(f.code))))
                }
                Some(Ok(_)) => Action::Continue,
                Some(Err(e)) => Action::Close(CloseReason::ReadError(e.to_string())),
                None => Action::Close(CloseReason::StreamEnded),
            },
        };

        match action {
            Action::Continue => {}
            Action::ScheduleIdentify(delay) => {
                identify_timer.as_mut().reset(Instant::now() + delay);
                identify_pending = true;
            }
            Action::Close(reason) => break reason,
        }
    };

    // Stops the heartbeat pump and makes the writer send its close frame.
    cancel.cancel();
    if tokio::time::timeout(WRITER_SHUTDOWN_GRACE, writer)
        .await
        .is_err()
    {
        debug!("write pump did not finish in time");
    }

    SessionEnd {
        reason,
        reached_ready: session.reached_ready,
    }
}

impl Session<'_> {
    async fn send(&self, message: Message) {
        if self.write_tx.send(message).await.is_err() {
            debug!("write pump gone, dropping outbound frame");
        }
    }

    async fn send_identify(&self) {
        let config = &self.shared.config;
        self.shared.status.begin_identify();
        info!(intents = config.intents, "sending identify");
        let frame = GatewayFrame::identify(&config.token, config.intents);
        self.send(Message::Text(frame.to_text().into())).await;
    }

    fn start_heartbeat(&mut self, interval: Duration) {
        if let Some(previous) = self.heartbeat.take() {
            previous.cancel();
        }
        let token = self.cancel.child_token();
        tokio::spawn(heartbeat_pump(
            interval,
            Arc::clone(&self.shared.status),
            self.write_tx.clone(),
            token.clone(),
        ));
        self.heartbeat = Some(token);
    }

    async fn handle_text(&mut self, text: &str) -> Action {
        let frame = match GatewayFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, "failed to decode gateway frame");
                return Action::Continue;
            }
        };

        if let Some(sequence) = frame.s {
            self.shared.status.record_sequence(sequence);
        }

        let op = frame.op;
        let inbound = match frame.into_inbound() {
            Ok(inbound) => inbound,
            Err(e) => {
                error!(op, error = %e, "failed to decode gateway payload");
                return Action::Continue;
            }
        };

        if std::mem::take(&mut self.awaiting_first_frame)
            && !matches!(inbound, InboundFrame::Hello { .. })
        {
            self.shared.status.set_phase(ConnectionPhase::AwaitingHello);
        }

        self.handle_frame(inbound).await
    }

    async fn handle_frame(&mut self, inbound: InboundFrame) -> Action {
        let status = &self.shared.status;
        match inbound {
            InboundFrame::Hello { heartbeat_interval } => {
                info!(
                    interval_ms = heartbeat_interval.as_millis() as u64,
                    "received hello"
                );
                self.start_heartbeat(heartbeat_interval);
                status.set_phase(ConnectionPhase::Identifying);
                Action::ScheduleIdentify(self.shared.config.timings.identify_delay)
            }
            InboundFrame::HeartbeatAck => {
                trace!("heartbeat acknowledged");
                status.record_ack();
                Action::Continue
            }
            InboundFrame::Heartbeat => {
                debug!("server requested heartbeat");
                self.send(heartbeat_message(status)).await;
                Action::Continue
            }
            InboundFrame::Reconnect => {
                info!("server requested reconnect");
                Action::Close(CloseReason::ReconnectRequested)
            }
            InboundFrame::InvalidSession { resumable } => {
                warn!(resumable, "session invalidated, re-identifying");
                status.clear_session();
                status.set_phase(ConnectionPhase::Identifying);
                Action::ScheduleIdentify(self.shared.config.timings.invalid_session_delay)
            }
            InboundFrame::Dispatch(event) => {
                self.handle_dispatch(event);
                Action::Continue
            }
            InboundFrame::Unknown { op } => {
                debug!(op, "ignoring unknown opcode");
                Action::Continue
            }
        }
    }

    fn handle_dispatch(&mut self, event: DispatchEvent) {
        match event {
            DispatchEvent::Ready(ready) => {
                info!(
                    session_id = %ready.session_id,
                    username = %ready.user.username,
                    "gateway session ready"
                );
                self.shared
                    .status
                    .record_ready(ready.session_id, ready.user.username);
                self.reached_ready = true;
            }
            DispatchEvent::Resumed => {
                info!("gateway session resumed");
                self.shared.status.set_phase(ConnectionPhase::Connected);
            }
            DispatchEvent::MessageCreate(message) => self.dispatch_message(&message),
            DispatchEvent::Unknown(name) => {
                trace!(event = %name, "ignoring dispatch");
            }
        }
    }

    fn dispatch_message(&self, message: &MessagePayload) {
        if message.attachments.is_empty() {
            return;
        }
        let config = &self.shared.config;
        let monitored = message
            .channel()
            .is_some_and(|channel| config.monitored_channels.contains(&channel));
        if !monitored {
            trace!(channel = %message.channel_id, "channel not monitored");
            return;
        }
        if config.is_blacklisted(&message.author) {
            debug!(author = %message.author.username, "ignoring blacklisted author");
            return;
        }

        for attachment in message.descriptors() {
            debug!(file = %attachment.filename, channel = %message.channel_id, "queueing attachment");
            let handler = Arc::clone(&self.shared.handler);
            tokio::spawn(async move {
                handler.handle(attachment).await;
            });
        }
    }
}
