use futures::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex, MutexGuard, Once, PoisonError};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ConnectionError;
use crate::frame::{ControlTag, Frame, OutboundFrame, classify};
use crate::keepalive::KeepAliveScheduler;
use crate::target::{ClientId, RepoTarget, endpoint_url};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const FRAME_BROADCAST_CAPACITY: usize = 256;

/// Connection settings. The base endpoint is opaque to the session; it is
/// resolved by whoever constructs the session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub base_endpoint: String,
    pub connect_timeout: Duration,
    pub keepalive_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_endpoint: "ws://localhost:8000".to_string(),
            connect_timeout: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(240),
        }
    }
}

/// Whether the backend is still analysing the repository.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenPhase {
    Processing,
    Ready,
}

/// Lifecycle of a session: `Idle -> Connecting -> Open(Processing) -> Open(Ready) -> Closed`.
///
/// `Closed` is terminal for the socket; a new `connect` starts a fresh session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Open(OpenPhase),
    Closed,
}

impl SessionState {
    pub fn is_open(&self) -> bool {
        matches!(self, SessionState::Open(_))
    }

    /// An attempt is in flight or a socket is open.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Open(_))
    }
}

/// Observable view of a session, republished on every transition.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    /// Most recent classified inbound frame
    pub last_frame: Option<Frame>,
    pub client_id: Option<ClientId>,
    pub target: Option<RepoTarget>,
}

impl SessionSnapshot {
    pub fn is_connected(&self) -> bool {
        self.state.is_open()
    }

    pub fn is_processing(&self) -> bool {
        self.state == SessionState::Open(OpenPhase::Processing)
    }

    /// The server rejection that ended this session, if any.
    pub fn rejection(&self) -> Option<ConnectionError> {
        self.last_frame
            .as_ref()
            .and_then(Frame::rejection)
            .map(ConnectionError::from)
    }
}

/// Handles to an open socket. Dropped as a unit when the socket leaves `Open`.
struct Link {
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    close: CancellationToken,
    keepalive: KeepAliveScheduler,
}

impl Link {
    fn shutdown(mut self) {
        self.keepalive.disarm();
        self.close.cancel();
    }
}

#[derive(Default)]
struct Inner {
    state: SessionState,
    /// Bumped on every connect and disconnect; events tagged with an older
    /// generation belong to a superseded socket and are ignored.
    generation: u64,
    client_id: Option<ClientId>,
    target: Option<RepoTarget>,
    last_frame: Option<Frame>,
    /// Cancels the in-flight open while `Connecting`
    pending: Option<CancellationToken>,
    link: Option<Link>,
}

impl Inner {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            last_frame: self.last_frame.clone(),
            client_id: self.client_id.clone(),
            target: self.target.clone(),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum FrameOutcome {
    Continue,
    Close,
}

struct Shared {
    inner: Mutex<Inner>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    frames_tx: broadcast::Sender<Frame>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &Inner) {
        self.snapshot_tx.send_replace(inner.snapshot());
    }

    fn on_frame(&self, generation: u64, frame: Frame) -> FrameOutcome {
        let mut inner = self.lock();
        if inner.generation != generation {
            return FrameOutcome::Close;
        }

        let outcome = match &frame {
            Frame::Control(ControlTag::ProcessedOk) => {
                if inner.state == SessionState::Open(OpenPhase::Processing) {
                    info!("Repository processed, session ready");
                    inner.state = SessionState::Open(OpenPhase::Ready);
                }
                FrameOutcome::Continue
            }
            Frame::Control(ControlTag::Rejected(reason)) => {
                warn!(%reason, "Server rejected repository, closing");
                inner.state = SessionState::Closed;
                if let Some(link) = inner.link.take() {
                    link.shutdown();
                }
                FrameOutcome::Close
            }
            Frame::Payload(text) => {
                debug!(bytes = text.len(), "Inbound payload");
                FrameOutcome::Continue
            }
        };

        inner.last_frame = Some(frame.clone());
        self.publish(&inner);
        drop(inner);

        let _ = self.frames_tx.send(frame);
        outcome
    }

    fn on_transport_lost(&self, generation: u64, err: Option<ConnectionError>) {
        let mut inner = self.lock();
        if inner.generation != generation || !inner.state.is_open() {
            return;
        }
        match err {
            Some(err) => warn!(error = %err, "Connection lost"),
            None => info!("Server closed the connection"),
        }
        inner.state = SessionState::Closed;
        if let Some(link) = inner.link.take() {
            link.shutdown();
        }
        self.publish(&inner);
    }
}

/// Settles a `Connecting` session whose connect future was dropped before
/// the attempt finished, so a later `connect` is not mistaken for a duplicate.
struct PendingAttempt<'a> {
    shared: &'a Shared,
    generation: u64,
    settled: bool,
}

impl PendingAttempt<'_> {
    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for PendingAttempt<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut inner = self.shared.lock();
        if inner.generation != self.generation || inner.state != SessionState::Connecting {
            return;
        }
        debug!("Connect abandoned mid-handshake");
        inner.pending = None;
        inner.state = SessionState::Closed;
        self.shared.publish(&inner);
    }
}

/// rustls needs a process-wide crypto provider before `wss://` endpoints work.
fn install_tls_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        // Err means a provider is already installed, which is fine
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Owns the socket and the lifecycle state of one session.
///
/// At most one socket exists at a time. All transitions happen under one
/// mutex, so callbacks from the socket driver, the keepalive timer and callers
/// never interleave mid-transition.
pub struct ConnectionManager {
    config: SessionConfig,
    shared: Arc<Shared>,
}

impl ConnectionManager {
    pub fn new(config: SessionConfig) -> Self {
        install_tls_provider();
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());
        let (frames_tx, _) = broadcast::channel(FRAME_BROADCAST_CAPACITY);
        Self {
            config,
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner::default()),
                snapshot_tx,
                frames_tx,
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Open a socket to `target`.
    ///
    /// Resolves once the transport is established, which is before the
    /// backend has finished processing the repository; readiness shows up
    /// later as `Open(Ready)` in the snapshot. Calling this while an attempt
    /// is in flight or a socket is open is a silent no-op. Dropping the
    /// returned future before it resolves leaves the session `Closed`.
    pub async fn connect(&self, target: RepoTarget) -> Result<(), ConnectionError> {
        let (generation, client_id, cancel) = {
            let mut inner = self.shared.lock();
            if inner.state.is_active() {
                debug!(state = ?inner.state, "Connect ignored, session already active");
                return Ok(());
            }

            inner.generation += 1;
            let client_id = ClientId::generate();
            let cancel = CancellationToken::new();
            inner.state = SessionState::Connecting;
            inner.client_id = Some(client_id.clone());
            inner.target = Some(target.clone());
            inner.last_frame = None;
            inner.pending = Some(cancel.clone());
            self.shared.publish(&inner);
            (inner.generation, client_id, cancel)
        };

        let attempt = PendingAttempt {
            shared: &self.shared,
            generation,
            settled: false,
        };

        let url = endpoint_url(&self.config.base_endpoint, &target, &client_id);
        info!(%target, %client_id, "Connecting to {}", url);

        let deadline = self.config.connect_timeout;
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ConnectionError::Cancelled),
            res = tokio::time::timeout(deadline, connect_async(url.as_str())) => match res {
                Ok(Ok((ws, _response))) => Ok(ws),
                Ok(Err(err)) => Err(ConnectionError::from_tungstenite(err)),
                Err(_) => Err(ConnectionError::Timeout(deadline)),
            },
        };

        attempt.settle();
        self.finish_connect(generation, outcome)
    }

    /// Validate an owner/repo pair and connect to it.
    pub async fn connect_parts(&self, owner: &str, repo: &str) -> Result<(), ConnectionError> {
        if self.state().is_active() {
            return Ok(());
        }
        let target = RepoTarget::new(owner, repo)?;
        self.connect(target).await
    }

    fn finish_connect(
        &self,
        generation: u64,
        outcome: Result<WsStream, ConnectionError>,
    ) -> Result<(), ConnectionError> {
        let mut inner = self.shared.lock();

        if inner.generation != generation || inner.state != SessionState::Connecting {
            // Disconnected while the handshake was in flight
            if let Ok(mut ws) = outcome {
                tokio::spawn(async move {
                    let _ = ws.close(None).await;
                });
            }
            debug!("Connection attempt superseded");
            return Err(ConnectionError::Cancelled);
        }
        inner.pending = None;

        match outcome {
            Ok(ws) => {
                inner.state = SessionState::Open(OpenPhase::Processing);
                self.shared.publish(&inner);

                let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                let close = CancellationToken::new();
                let keepalive = KeepAliveScheduler::arm(
                    self.config.keepalive_interval,
                    outbound_tx.clone(),
                    self.shared.snapshot_tx.subscribe(),
                );
                inner.link = Some(Link {
                    outbound: outbound_tx,
                    close: close.clone(),
                    keepalive,
                });

                tokio::spawn(drive_socket(
                    ws,
                    outbound_rx,
                    close,
                    self.shared.clone(),
                    generation,
                ));

                info!("Connection open, repository processing");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "Connection attempt failed");
                inner.state = SessionState::Closed;
                self.shared.publish(&inner);
                Err(err)
            }
        }
    }

    /// Queue a chat message. Dropped silently unless the socket is open.
    pub fn send(&self, text: impl Into<String>) {
        let inner = self.shared.lock();
        match (&inner.state, &inner.link) {
            (SessionState::Open(_), Some(link)) => {
                let _ = link.outbound.send(OutboundFrame::Text(text.into()));
            }
            (state, _) => debug!(?state, "Dropping outbound message, session not open"),
        }
    }

    /// Close the socket if any and reset to `Idle`. Safe to call at any time.
    pub fn disconnect(&self) {
        let mut inner = self.shared.lock();
        let previous = inner.state;

        if let Some(cancel) = inner.pending.take() {
            cancel.cancel();
        }
        if let Some(link) = inner.link.take() {
            link.shutdown();
        }
        inner.generation += 1;
        inner.state = SessionState::Idle;
        inner.last_frame = None;
        inner.client_id = None;
        inner.target = None;
        self.shared.publish(&inner);

        if previous != SessionState::Idle {
            info!(from = ?previous, "Session disconnected");
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.snapshot_tx.borrow().clone()
    }

    /// Watch the snapshot. Only the latest value is retained.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    /// Every classified inbound frame, in arrival order.
    pub fn frames(&self) -> broadcast::Receiver<Frame> {
        self.shared.frames_tx.subscribe()
    }

    pub fn client_id(&self) -> Option<ClientId> {
        self.shared.lock().client_id.clone()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Sole owner of an open socket: pumps outbound frames, classifies inbound
/// ones, and closes when told to or when the peer goes away.
async fn drive_socket(
    ws: WsStream,
    mut outbound: mpsc::UnboundedReceiver<OutboundFrame>,
    close: CancellationToken,
    shared: Arc<Shared>,
    generation: u64,
) {
    let (mut ws_write, mut ws_read) = ws.split();

    loop {
        tokio::select! {
            biased;

            _ = close.cancelled() => {
                debug!("Close requested");
                break;
            }

            Some(frame) = outbound.recv() => {
                if let Err(err) = ws_write.send(Message::Text(frame.into_text().into())).await {
                    shared.on_transport_lost(generation, Some(ConnectionError::from_tungstenite(err)));
                    break;
                }
            }

            msg = ws_read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if shared.on_frame(generation, classify(text.as_str())) == FrameOutcome::Close {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    shared.on_transport_lost(generation, None);
                    break;
                }
                Some(Ok(_)) => {
                    // Binary and control frames carry nothing for us
                }
                Some(Err(err)) => {
                    shared.on_transport_lost(generation, Some(ConnectionError::from_tungstenite(err)));
                    break;
                }
            }
        }
    }

    let _ = ws_write.close().await;
    debug!("Socket driver finished");
}
