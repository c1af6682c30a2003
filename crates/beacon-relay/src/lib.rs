//! Beacon relay production server.
//!
//! Real-time relay for the Beacon safety-alerting application: peer chat and
//! live-location sharing fan out through ephemeral rooms over WebSocket.
//!
//! # Architecture
//!
//! This crate wraps the action-based [`RelayDriver`] with real I/O. The
//! driver follows the Sans-IO pattern: it owns the connection registry and
//! room store behind one lock and turns [`RelayEvent`]s into
//! [`RelayAction`]s, while [`Server`] executes the actions using
//! tokio-tungstenite WebSockets.
//!
//! # Components
//!
//! - [`RelayDriver`]: event-based orchestrator (pure logic, no I/O)
//! - [`Server`]: production runtime that executes driver actions
//! - [`SystemClock`]: production time source for message timestamps
//!
//! One task per connection reads inbound frames; a second per-connection
//! task drains a bounded outbound queue, so a slow or stalled peer can
//! never block a room broadcast. A peer that keeps overflowing its queue
//! is force-closed.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod driver;
mod driver_error;
mod error;
mod registry;
mod room_store;

use std::{
    borrow::Cow,
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

pub use clock::{Clock, SystemClock};
pub use driver::{LogLevel, RelayAction, RelayConfig, RelayDriver, RelayEvent};
pub use driver_error::DriverError;
pub use error::ServerError;
use futures_util::{SinkExt, StreamExt};
pub use registry::{ConnectionRegistry, SessionInfo};
pub use room_store::{LeaveOutcome, RoomError, RoomStore};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{Mutex, Notify, RwLock, mpsc, mpsc::error::TrySendError},
};
use tokio_tungstenite::tungstenite::{
    handshake::server::{Request, Response},
    protocol::{CloseFrame, Message, frame::coding::CloseCode},
};

/// Maximum lifetime queue overflows before a slow client is force-closed.
const MAX_TOTAL_DROPS: u64 = 100;

/// How long to wait for a connection's writer task to flush on teardown.
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Writer endpoint for one live connection.
struct ConnectionHandle {
    /// Bounded outbound queue, drained by the connection's writer task.
    tx: mpsc::Sender<Message>,
    /// Lifetime count of frames dropped because the queue was full.
    drops: AtomicU64,
    /// Signals the connection's read loop to stop.
    shutdown: Arc<Notify>,
}

/// Shared state for all connections.
///
/// Holds the connection-id to writer map for message routing. Registry and
/// room state live in the driver, not here.
struct SharedState {
    /// Connection ID → writer handle
    connections: RwLock<HashMap<u64, ConnectionHandle>>,
    /// Monotonic connection id source
    next_conn_id: AtomicU64,
}

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:8090")
    pub bind_address: String,
    /// Per-connection outbound queue capacity, in frames
    pub outbound_queue: usize,
    /// Driver configuration (connection limits)
    pub relay: RelayConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8090".to_string(),
            outbound_queue: 64,
            relay: RelayConfig::default(),
        }
    }
}

/// Production Beacon relay server.
///
/// Wraps [`RelayDriver`] with a WebSocket transport and the system clock.
pub struct Server {
    /// TCP listener for WebSocket upgrades
    listener: TcpListener,
    /// Runtime configuration
    config: ServerRuntimeConfig,
}

impl Server {
    /// Create and bind a new server.
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.bind_address).await.map_err(|e| {
            ServerError::Config(format!("cannot bind '{}': {e}", config.bind_address))
        })?;

        Ok(Self { listener, config })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the server, accepting connections and relaying frames.
    ///
    /// This method runs until the server is shut down or an error occurs.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("relay listening on {}", self.local_addr()?);

        let driver = Arc::new(Mutex::new(RelayDriver::new(
            SystemClock::new(),
            self.config.relay.clone(),
        )));
        let shared = Arc::new(SharedState {
            connections: RwLock::new(HashMap::new()),
            next_conn_id: AtomicU64::new(1),
        });
        let outbound_queue = self.config.outbound_queue;

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let driver = Arc::clone(&driver);
                    let shared = Arc::clone(&shared);

                    tokio::spawn(async move {
                        if let Err(e) =
                            handle_connection(stream, driver, shared, outbound_queue).await
                        {
                            tracing::debug!("connection from {peer} ended with error: {e}");
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("accept error: {e}");
                },
            }
        }
    }
}

/// Extract the `userId` query parameter from a connection URI query string.
///
/// The value is percent-decoded; a value that decodes to invalid UTF-8 is
/// treated as absent.
fn user_id_from_query(query: Option<&str>) -> Option<String> {
    for pair in query?.split('&') {
        if let Some((key, value)) = pair.split_once('=')
            && key == "userId"
            && !value.is_empty()
        {
            return urlencoding::decode(value).ok().map(Cow::into_owned);
        }
    }
    None
}

/// Handle a single WebSocket connection from handshake to teardown.
async fn handle_connection(
    stream: TcpStream,
    driver: Arc<Mutex<RelayDriver<SystemClock>>>,
    shared: Arc<SharedState>,
    outbound_queue: usize,
) -> Result<(), ServerError> {
    let mut user_id: Option<String> = None;

    let mut ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
        user_id = user_id_from_query(req.uri().query());
        Ok(resp)
    })
    .await
    .map_err(|e| ServerError::Protocol(format!("handshake failed: {e}")))?;

    // The identifier is mandatory; without it the connection is closed with
    // a policy-violation code before anything is registered.
    let Some(user_id) = user_id else {
        let _ = ws
            .close(Some(CloseFrame { code: CloseCode::Policy, reason: "missing userId".into() }))
            .await;
        return Ok(());
    };

    let conn_id = shared.next_conn_id.fetch_add(1, Ordering::Relaxed);
    tracing::debug!("new connection {conn_id} for user {user_id}");

    let (tx, mut rx) = mpsc::channel::<Message>(outbound_queue);
    let shutdown = Arc::new(Notify::new());

    let (mut sink, mut stream) = ws.split();

    // Writer task: the only place the sink is touched. Ends when the handle
    // is dropped from the shared map.
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    {
        let mut connections = shared.connections.write().await;
        connections.insert(
            conn_id,
            ConnectionHandle { tx, drops: AtomicU64::new(0), shutdown: Arc::clone(&shutdown) },
        );
    }

    if let Err(e) = dispatch(
        RelayEvent::ConnectionOpened { conn_id, user_id: user_id.clone() },
        &driver,
        &shared,
    )
    .await
    {
        tracing::warn!("failed to open connection {conn_id}: {e}");
    }

    loop {
        tokio::select! {
            () = shutdown.notified() => break,
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let event =
                        RelayEvent::FrameReceived { conn_id, text: text.as_str().to_owned() };
                    if let Err(e) = dispatch(event, &driver, &shared).await {
                        tracing::warn!("dropping connection {conn_id}: {e}");
                        break;
                    }
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}, // binary/ping/pong frames are not part of the protocol
                Some(Err(e)) => {
                    tracing::debug!("read error on connection {conn_id}: {e}");
                    break;
                },
            },
        }
    }

    {
        let mut connections = shared.connections.write().await;
        connections.remove(&conn_id);
    }

    if let Err(e) = dispatch(
        RelayEvent::ConnectionClosed { conn_id, reason: "connection closed".to_string() },
        &driver,
        &shared,
    )
    .await
    {
        tracing::warn!("teardown of connection {conn_id} failed: {e}");
    }

    // Removing the handle dropped the queue's only sender; let the writer
    // drain what is still queued (a close frame in particular) before the
    // socket is torn down, instead of aborting it mid-flush.
    match tokio::time::timeout(WRITER_FLUSH_TIMEOUT, writer).await {
        Ok(Ok(())) | Err(_) => Ok(()),
        Ok(Err(e)) => Err(ServerError::Internal(format!("writer task failed: {e}"))),
    }
}

/// Feed one event through the driver and execute the resulting actions.
///
/// The driver lock is held across both steps, so every event is processed
/// to completion before the next and ordering within a connection holds.
async fn dispatch(
    event: RelayEvent,
    driver: &Arc<Mutex<RelayDriver<SystemClock>>>,
    shared: &SharedState,
) -> Result<(), ServerError> {
    let mut driver = driver.lock().await;
    let actions = driver.process_event(event)?;
    execute_actions(&driver, actions, shared).await;
    Ok(())
}

/// Execute driver actions.
async fn execute_actions(
    driver: &RelayDriver<SystemClock>,
    actions: Vec<RelayAction>,
    shared: &SharedState,
) {
    for action in actions {
        match action {
            RelayAction::Send { conn_id, frame } => {
                let text = match frame.encode() {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!("failed to encode frame for {conn_id}: {e}");
                        continue;
                    },
                };

                let connections = shared.connections.read().await;
                if let Some(handle) = connections.get(&conn_id) {
                    deliver(handle, conn_id, Message::text(text));
                } else {
                    tracing::debug!("send: connection {conn_id} not found");
                }
            },

            RelayAction::Broadcast { room_id, frame } => {
                let members = driver.connections_in_room(&room_id);

                let text = match frame.encode() {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!("failed to encode broadcast for {room_id}: {e}");
                        continue;
                    },
                };
                let msg = Message::text(text);

                let connections = shared.connections.read().await;
                for conn_id in members {
                    if let Some(handle) = connections.get(&conn_id) {
                        deliver(handle, conn_id, msg.clone());
                    }
                }
            },

            RelayAction::Close { conn_id, reason } => {
                tracing::info!("closing connection {conn_id}: {reason}");
                let connections = shared.connections.read().await;
                if let Some(handle) = connections.get(&conn_id) {
                    let _ = handle.tx.try_send(Message::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: reason.into(),
                    })));
                    handle.shutdown.notify_one();
                }
            },

            RelayAction::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{message}"),
                LogLevel::Info => tracing::info!("{message}"),
                LogLevel::Warn => tracing::warn!("{message}"),
                LogLevel::Error => tracing::error!("{message}"),
            },
        }
    }
}

/// Queue a frame for one connection without ever blocking the dispatcher.
///
/// A full queue counts a drop against the connection; past
/// [`MAX_TOTAL_DROPS`] the peer is considered stalled and force-closed so
/// it cannot hold up fan-out to a whole room.
fn deliver(handle: &ConnectionHandle, conn_id: u64, msg: Message) {
    match handle.tx.try_send(msg) {
        Ok(()) => {},
        Err(TrySendError::Full(_)) => {
            let drops = handle.drops.fetch_add(1, Ordering::Relaxed) + 1;
            if drops >= MAX_TOTAL_DROPS {
                tracing::warn!("disconnecting slow connection {conn_id} after {drops} drops");
                handle.shutdown.notify_one();
            } else {
                tracing::warn!("outbound queue full for connection {conn_id}, dropping frame");
            }
        },
        Err(TrySendError::Closed(_)) => {
            tracing::debug!("outbound queue for connection {conn_id} already closed");
        },
    }
}
