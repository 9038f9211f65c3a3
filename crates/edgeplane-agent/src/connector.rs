//! # Tunnel Connector
//!
//! Keeps one remote-access WebSocket session open to the control plane.
//! The connector loop calls [`Connector::reconcile`] every second; each call
//! is a no-op while a session is alive and starts a new one otherwise.
//!
//! ## Session Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Tunnel Session States                              │
//! │                                                                         │
//! │  ┌────────────┐  reconcile()   ┌────────────┐                          │
//! │  │Disconnected│ ─────────────► │ Connecting │                          │
//! │  └────────────┘                └─────┬──────┘                          │
//! │        ▲                   success   │   failure                        │
//! │        │                       ┌─────┴──────┐                          │
//! │        │                       ▼            ▼                           │
//! │        │               ┌────────────┐  ┌────────────┐                  │
//! │        │               │ Connected  │  │  Backoff   │ until the next   │
//! │        │               └─────┬──────┘  └─────┬──────┘ reconcile()      │
//! │        │      close / error  │               │                          │
//! │        └─────────────────────┴───────────────┘                          │
//! │                                                                         │
//! │  URL: ws(s)://<controller>/projects/{p}/devices/{d}/connection         │
//! │  AUTH: Authorization: Bearer <access key>                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Failures never leave this module: the loop sees no error, and repeated
//! connect failures are logged at warn level only on the first attempt and
//! every 60th after it.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use edgeplane_core::DeviceIdentity;

use crate::client::{build_endpoint, HttpControlPlane};
use crate::error::{AgentError, AgentResult};

/// Attempts between warn-level connect failure logs.
const FAILURE_LOG_EVERY: u32 = 60;

/// One reconciliation step of the remote-access connector.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Brings the tunnel toward its desired state. Never fails.
    async fn reconcile(&self);
}

// =============================================================================
// Connection State
// =============================================================================

/// Tunnel session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Session open.
    Connected,
    /// Last attempt failed; waiting for the next reconcile.
    Backoff,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Backoff => write!(f, "backoff"),
        }
    }
}

/// Frame received from the control plane over the tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// Tunnel timing.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// Handshake timeout.
    pub connect_timeout: Duration,

    /// Keepalive ping interval while connected.
    pub ping_interval: Duration,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        TunnelConfig {
            connect_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(30),
        }
    }
}

// =============================================================================
// Tunnel Connector
// =============================================================================

/// WebSocket-backed [`Connector`].
pub struct TunnelConnector {
    client: Arc<HttpControlPlane>,
    config: TunnelConfig,
    state: Arc<RwLock<ConnectionState>>,
    failures: Arc<AtomicU32>,
    frames_tx: mpsc::Sender<TunnelFrame>,
    session: Mutex<Option<JoinHandle<AgentResult<()>>>>,
}

impl TunnelConnector {
    /// Creates the connector and the receiver for inbound tunnel frames.
    pub fn new(
        client: Arc<HttpControlPlane>,
        config: TunnelConfig,
    ) -> (Self, mpsc::Receiver<TunnelFrame>) {
        let (frames_tx, frames_rx) = mpsc::channel(100);
        let connector = TunnelConnector {
            client,
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            failures: Arc::new(AtomicU32::new(0)),
            frames_tx,
            session: Mutex::new(None),
        };
        (connector, frames_rx)
    }

    /// Returns the current session state.
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Collects the outcome of a finished session.
    async fn reap(&self, handle: JoinHandle<AgentResult<()>>) {
        match handle.await {
            Ok(Ok(())) => debug!("Tunnel session closed"),
            Ok(Err(e)) => {
                *self.state.write().await = ConnectionState::Backoff;
                let attempt = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
                if attempt == 1 || attempt % FAILURE_LOG_EVERY == 0 {
                    warn!(error = %e, attempt, "Tunnel session failed");
                } else {
                    debug!(error = %e, attempt, "Tunnel session failed");
                }
            }
            Err(e) => {
                *self.state.write().await = ConnectionState::Backoff;
                warn!(?e, "Tunnel session task aborted");
            }
        }
    }
}

#[async_trait]
impl Connector for TunnelConnector {
    async fn reconcile(&self) {
        let mut session = self.session.lock().await;

        if session.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        if let Some(handle) = session.take() {
            self.reap(handle).await;
        }

        let identity = match self.client.identity().await {
            Ok(identity) => identity,
            Err(e) => {
                debug!(error = %e, "Tunnel not started");
                return;
            }
        };
        let url = match tunnel_url(self.client.base_url(), &identity) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Cannot derive tunnel URL");
                return;
            }
        };

        let runner = SessionRunner {
            url,
            identity,
            config: self.config.clone(),
            state: self.state.clone(),
            failures: self.failures.clone(),
            frames_tx: self.frames_tx.clone(),
        };
        *session = Some(tokio::spawn(runner.run()));
    }
}

impl Drop for TunnelConnector {
    fn drop(&mut self) {
        if let Some(handle) = self.session.get_mut().take() {
            handle.abort();
        }
    }
}

// =============================================================================
// Session Runner
// =============================================================================

struct SessionRunner {
    url: Url,
    identity: Arc<DeviceIdentity>,
    config: TunnelConfig,
    state: Arc<RwLock<ConnectionState>>,
    failures: Arc<AtomicU32>,
    frames_tx: mpsc::Sender<TunnelFrame>,
}

impl SessionRunner {
    async fn run(self) -> AgentResult<()> {
        *self.state.write().await = ConnectionState::Connecting;

        let mut request = self.url.as_str().into_client_request()?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.identity.access_key()))
            .map_err(|e| AgentError::WebSocket(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (ws_stream, response) = match timeout(self.config.connect_timeout, connect_async(request)).await {
            Ok(connected) => connected?,
            Err(_) => return Err(AgentError::Timeout),
        };
        debug!(status = ?response.status(), "Tunnel handshake complete");

        *self.state.write().await = ConnectionState::Connected;
        let previous_failures = self.failures.swap(0, Ordering::Relaxed);
        info!(url = %self.url, previous_failures, "Tunnel connected");

        let result = self.session_loop(ws_stream).await;
        *self.state.write().await = ConnectionState::Disconnected;
        result
    }

    async fn session_loop(
        &self,
        ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    ) -> AgentResult<()> {
        let (mut write, mut read) = ws_stream.split();

        let mut ping_interval = tokio::time::interval(self.config.ping_interval);
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ping_interval.tick().await;

        loop {
            tokio::select! {
                message = read.next() => {
                    let frame = match message {
                        Some(Ok(WsMessage::Text(text))) => TunnelFrame::Text(text.as_str().to_string()),
                        Some(Ok(WsMessage::Binary(data))) => TunnelFrame::Binary(data.to_vec()),
                        Some(Ok(WsMessage::Ping(data))) => {
                            write.send(WsMessage::Pong(data)).await?;
                            continue;
                        }
                        Some(Ok(WsMessage::Pong(_))) | Some(Ok(WsMessage::Frame(_))) => continue,
                        Some(Ok(WsMessage::Close(frame))) => {
                            info!(?frame, "Tunnel closed by control plane");
                            return Ok(());
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(()),
                    };
                    if self.frames_tx.send(frame).await.is_err() {
                        warn!("Tunnel frame receiver dropped");
                        let _ = write.send(WsMessage::Close(None)).await;
                        return Ok(());
                    }
                }

                _ = ping_interval.tick() => {
                    write.send(WsMessage::Ping(Vec::new().into())).await?;
                    debug!("Sent tunnel ping");
                }
            }
        }
    }
}

/// Derives the tunnel endpoint from the controller URL.
pub fn tunnel_url(base: &Url, identity: &DeviceIdentity) -> AgentResult<Url> {
    let mut url = base.clone();
    let scheme = match base.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => return Err(AgentError::InvalidUrl(format!("unsupported scheme {}", other))),
    };
    url.set_scheme(scheme)
        .map_err(|_| AgentError::InvalidUrl(format!("cannot use {} for {}", scheme, base)))?;

    build_endpoint(
        &url,
        &[
            "projects",
            identity.project_id(),
            "devices",
            identity.device_id(),
            "connection",
        ],
    )
}
