//! The shared real-time connection.
//!
//! One [`ConnectionManager`] owns one persistent socket for the lifetime of an
//! application (or of whatever scope creates it).  Everything else talks to
//! the socket through cheap, cloneable [`Connection`] handles:
//!
//! - `emit` queues an outbound event.  Events emitted while the socket is down
//!   are flushed after the next successful connect.
//! - `on`/`off` register and remove listeners for inbound events.  Any number
//!   of listeners may share an event name; each one fires for every delivery.
//! - `is_connected`/`state` expose connectivity.
//!
//! Reconnection is internal: after a failed connect or a dropped session the
//! manager retries up to [`ReconnectConfig::max_attempts`] times with a fixed
//! delay, then parks in [`ConnectionState::Failed`].

use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::observability::{
    SOCKET_BAD_FRAMES, SOCKET_CONNECT_FAILURES, SOCKET_CONNECTS, SOCKET_DISCONNECTS,
    SOCKET_DISPATCHES, SOCKET_EMITS, SOCKET_RECONNECT_EXHAUSTED,
};
use crate::types::Envelope;

/// Default number of reconnection attempts before giving up.
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;

/// Default pause between reconnection attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// Default bound on one connect, handshake included.  Also bounds the final
/// flush when the manager stops.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/////////////////////////////////////////// State ///////////////////////////////////////////

/// Connectivity of the shared socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// The first connect is in flight.
    Connecting,
    /// The socket is open.
    Connected,
    /// A reconnection attempt is in flight.
    Reconnecting {
        /// 1-based attempt number.
        attempt: u32,
    },
    /// The socket is down; either a retry is pending or the manager stopped.
    Disconnected,
    /// Every reconnection attempt failed.  The manager no longer retries.
    Failed {
        /// The last connect error.
        reason: String,
    },
}

impl ConnectionState {
    /// True only while the socket is open.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Failed { reason } => write!(f, "gave up: {reason}"),
        }
    }
}

/// Reconnection policy: a bounded number of attempts at a fixed delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Reconnection attempts after the first failure; the initial connect is not counted.
    pub max_attempts: u32,
    /// Pause before each attempt.
    pub delay: Duration,
    /// How long one connect may take before it counts as failed.
    pub connect_timeout: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

///////////////////////////////////////// Transport /////////////////////////////////////////

/// Outbound half of a connected transport.
pub type FrameSink = Pin<Box<dyn Sink<Envelope, Error = Error> + Send>>;

/// Inbound half of a connected transport.
///
/// `Error::Serialization` and `Error::Encoding` items are skipped as
/// malformed frames; any other error ends the session.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Envelope>> + Send>>;

/// Opens transports for the [`ConnectionManager`].
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new transport to `url`.
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream)>;
}

/// Connects over WebSocket, one JSON [`Envelope`] per text frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream)> {
        let (socket, _response) = connect_async(url).await.map_err(|e| {
            Error::connection(format!("failed to connect to {url}: {e}"), Some(Box::new(e)))
        })?;
        let (write, read) = socket.split();

        let sink = write
            .sink_map_err(|e| Error::connection(format!("send failed: {e}"), Some(Box::new(e))))
            .with(|envelope: Envelope| {
                futures::future::ready(
                    serde_json::to_string(&envelope)
                        .map(|text| Message::Text(text.into()))
                        .map_err(Error::from),
                )
            });

        let stream = read.filter_map(|message| {
            futures::future::ready(match message {
                Ok(Message::Text(text)) => Some(text.as_str().parse::<Envelope>().map_err(Error::from)),
                Ok(Message::Binary(bytes)) => Some(decode_binary(&bytes)),
                // Close ends the stream on the following read; ping and pong are handled by tungstenite.
                Ok(_) => None,
                Err(e) => Some(Err(Error::connection(
                    format!("read failed: {e}"),
                    Some(Box::new(e)),
                ))),
            })
        });

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}

fn decode_binary(bytes: &[u8]) -> Result<Envelope> {
    let text = std::str::from_utf8(bytes)?;
    Ok(text.parse::<Envelope>()?)
}

///////////////////////////////////////// Connection ////////////////////////////////////////

/// Identifies one registered listener so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

struct Shared {
    id: u64,
    listeners: Mutex<HashMap<String, Vec<(ListenerId, Listener)>>>,
    next_listener: AtomicU64,
    outbound: mpsc::UnboundedSender<Envelope>,
    state: watch::Receiver<ConnectionState>,
}

/// A handle to the shared connection.  Clones refer to the same socket.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    fn new(
        outbound: mpsc::UnboundedSender<Envelope>,
        state: watch::Receiver<ConnectionState>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
                listeners: Mutex::new(HashMap::new()),
                next_listener: AtomicU64::new(1),
                outbound,
                state,
            }),
        }
    }

    /// Process-unique identifier of the logical connection.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// True while the underlying socket is open.
    ///
    /// "Never connected", "dropped" and "gave up" all read as `false`.
    pub fn is_connected(&self) -> bool {
        self.shared.state.borrow().is_connected()
    }

    /// The detailed connectivity state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state.borrow().clone()
    }

    /// A receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.clone()
    }

    /// Queue `payload` for delivery under `event`.
    ///
    /// Fails only when the payload cannot be serialized or the manager has
    /// shut down; a temporarily disconnected socket buffers the event.
    pub fn emit<T: Serialize + ?Sized>(&self, event: &str, payload: &T) -> Result<()> {
        let data = serde_json::to_value(payload)?;
        self.shared
            .outbound
            .send(Envelope::new(event, data))
            .map_err(|_| Error::connection("connection has been shut down", None))?;
        SOCKET_EMITS.click();
        Ok(())
    }

    /// Register `listener` for `event`.  Listeners fire in registration order.
    pub fn on(&self, event: &str, listener: impl Fn(&Value) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.shared.next_listener.fetch_add(1, Ordering::Relaxed));
        let mut listeners = self
            .shared
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        listeners
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove the listener registered as `id` for `event`.
    ///
    /// Returns false when no such registration exists.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        let mut listeners = self
            .shared
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(registered) = listeners.get_mut(event) else {
            return false;
        };
        let before = registered.len();
        registered.retain(|(candidate, _)| *candidate != id);
        let removed = registered.len() != before;
        if registered.is_empty() {
            listeners.remove(event);
        }
        removed
    }

    /// Number of listeners registered for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.shared
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .map_or(0, Vec::len)
    }

    /// True when both handles refer to the same logical connection.
    pub fn same_as(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Deliver an inbound envelope to every listener of its event.
    pub(crate) fn dispatch(&self, envelope: &Envelope) {
        // Snapshot under the lock; listeners run unlocked so they may call on/off.
        let listeners: Vec<Listener> = self
            .shared
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&envelope.event)
            .map(|registered| registered.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();
        SOCKET_DISPATCHES.click();
        for listener in listeners {
            listener(&envelope.data);
        }
    }

    #[cfg(test)]
    pub(crate) fn detached() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (_state_tx, state_rx) = watch::channel(ConnectionState::Connected);
        (Self::new(outbound, state_rx), outbound_rx)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.shared.id)
            .field("state", &*self.shared.state.borrow())
            .finish()
    }
}

////////////////////////////////////// ConnectionManager ////////////////////////////////////

/// Owns the shared socket and its reconnect loop.
///
/// Create one per application scope, hand [`Connection`]s to consumers, and
/// call [`ConnectionManager::stop`] when the scope ends.  Must be created
/// inside a tokio runtime.
pub struct ConnectionManager {
    connection: Connection,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    /// Start connecting to `url` through `connector`.
    pub fn start(
        url: impl Into<String>,
        connector: Arc<dyn Connector>,
        config: ReconnectConfig,
    ) -> Self {
        let url = url.into();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let connection = Connection::new(outbound_tx, state_rx);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run(
            url,
            connector,
            config,
            connection.clone(),
            state_tx,
            outbound_rx,
            cancel.clone(),
        ));

        Self {
            connection,
            cancel,
            task: Some(task),
        }
    }

    /// Start connecting to `url` over WebSocket with the default reconnect policy.
    pub fn connect(url: impl Into<String>) -> Self {
        Self::start(url, Arc::new(WebSocketConnector), ReconnectConfig::default())
    }

    /// A handle to the shared connection.
    pub fn connection(&self) -> Connection {
        self.connection.clone()
    }

    /// True while the socket is open.
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// The detailed connectivity state.
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Stop the reconnect loop and close the socket.
    ///
    /// Returns once the background task has exited, so no state change is
    /// published after this completes.  Emitting on any handle afterward
    /// fails with a connection error.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "connection task ended abnormally");
            }
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum SessionEnd {
    Cancelled,
    Closed(String),
}

async fn run(
    url: String,
    connector: Arc<dyn Connector>,
    config: ReconnectConfig,
    connection: Connection,
    state: watch::Sender<ConnectionState>,
    mut outbound: mpsc::UnboundedReceiver<Envelope>,
    cancel: CancellationToken,
) {
    let mut attempt = 0u32;
    loop {
        let _ = state.send(if attempt == 0 {
            ConnectionState::Connecting
        } else {
            ConnectionState::Reconnecting { attempt }
        });

        let connected = tokio::select! {
            _ = cancel.cancelled() => break,
            connected = tokio::time::timeout(config.connect_timeout, connector.connect(&url)) => {
                connected.unwrap_or_else(|_| {
                    Err(Error::timeout(
                        format!("connecting to {url} timed out"),
                        Some(config.connect_timeout.as_secs_f64()),
                    ))
                })
            }
        };

        match connected {
            Ok((sink, stream)) => {
                SOCKET_CONNECTS.click();
                tracing::info!(url = %url, connection = connection.id(), "socket connected");
                let _ = state.send(ConnectionState::Connected);
                let ended = session(
                    &connection,
                    sink,
                    stream,
                    &mut outbound,
                    &cancel,
                    config.connect_timeout,
                )
                .await;
                match ended {
                    SessionEnd::Cancelled => break,
                    SessionEnd::Closed(reason) => {
                        SOCKET_DISCONNECTS.click();
                        tracing::warn!(url = %url, reason = %reason, "socket disconnected");
                        let _ = state.send(ConnectionState::Disconnected);
                        attempt = 0;
                    }
                }
            }
            Err(err) => {
                SOCKET_CONNECT_FAILURES.click();
                if attempt >= config.max_attempts {
                    SOCKET_RECONNECT_EXHAUSTED.click();
                    tracing::error!(
                        url = %url,
                        attempts = attempt,
                        error = %err,
                        "giving up on socket after exhausting reconnection attempts"
                    );
                    let _ = state.send(ConnectionState::Failed {
                        reason: err.to_string(),
                    });
                    return;
                }
                tracing::debug!(url = %url, attempt, error = %err, "socket connect failed");
            }
        }

        attempt += 1;
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(config.delay) => {}
        }
    }
    let _ = state.send(ConnectionState::Disconnected);
    tracing::info!(url = %url, connection = connection.id(), "socket stopped");
}

async fn session(
    connection: &Connection,
    mut sink: FrameSink,
    mut stream: FrameStream,
    outbound: &mut mpsc::UnboundedReceiver<Envelope>,
    cancel: &CancellationToken,
    flush_timeout: Duration,
) -> SessionEnd {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                // Flush what was emitted before the stop, such as a final leaveRoom.
                let flush = async {
                    while let Ok(envelope) = outbound.try_recv() {
                        if sink.send(envelope).await.is_err() {
                            break;
                        }
                    }
                    if let Err(err) = sink.close().await {
                        tracing::debug!(error = %err, "error closing socket");
                    }
                };
                if tokio::time::timeout(flush_timeout, flush).await.is_err() {
                    tracing::warn!("peer stalled; abandoning the final flush");
                }
                return SessionEnd::Cancelled;
            }
            frame = stream.next() => match frame {
                Some(Ok(envelope)) => connection.dispatch(&envelope),
                Some(Err(err @ (Error::Serialization { .. } | Error::Encoding { .. }))) => {
                    SOCKET_BAD_FRAMES.click();
                    tracing::warn!(error = %err, "skipping malformed frame");
                }
                Some(Err(err)) => return SessionEnd::Closed(err.to_string()),
                None => return SessionEnd::Closed("server closed the connection".to_string()),
            },
            envelope = outbound.recv() => match envelope {
                Some(envelope) => {
                    if let Err(err) = sink.send(envelope).await {
                        return SessionEnd::Closed(err.to_string());
                    }
                }
                None => {
                    let _ = sink.close().await;
                    return SessionEnd::Cancelled;
                }
            },
        }
    }
}

/////////////////////////////////////////// Testing /////////////////////////////////////////

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::AtomicU32;

    use futures::channel::mpsc as fmpsc;

    use super::*;

    /// The server end of one in-memory session.
    pub struct ServerSide {
        pub from_client: fmpsc::UnboundedReceiver<Envelope>,
        pub to_client: fmpsc::UnboundedSender<Result<Envelope>>,
    }

    /// A connector that refuses the first `refusals` connects, then hands out in-memory sessions.
    pub struct MemoryConnector {
        refusals: AtomicU32,
        attempts: AtomicU32,
        sessions: mpsc::UnboundedSender<ServerSide>,
    }

    impl MemoryConnector {
        pub fn new(refusals: u32) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerSide>) {
            let (sessions, sessions_rx) = mpsc::unbounded_channel();
            let connector = Arc::new(Self {
                refusals: AtomicU32::new(refusals),
                attempts: AtomicU32::new(0),
                sessions,
            });
            (connector, sessions_rx)
        }

        pub fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for MemoryConnector {
        async fn connect(&self, _url: &str) -> Result<(FrameSink, FrameStream)> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let refused = self
                .refusals
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if refused {
                return Err(Error::connection("connection refused", None));
            }
            let (client_tx, client_rx) = fmpsc::unbounded::<Envelope>();
            let (server_tx, server_rx) = fmpsc::unbounded::<Result<Envelope>>();
            let _ = self.sessions.send(ServerSide {
                from_client: client_rx,
                to_client: server_tx,
            });
            let sink = client_tx.sink_map_err(|e| Error::connection(e.to_string(), None));
            Ok((Box::pin(sink), Box::pin(server_rx)))
        }
    }

    pub async fn wait_for(connection: &Connection, wanted: impl Fn(&ConnectionState) -> bool) {
        let mut state = connection.watch_state();
        let _ = state.wait_for(|s| wanted(s)).await;
    }
}
