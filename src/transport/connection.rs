//! Connection manager and socket task.
//!
//! A [`Bridge`] owns at most one WebSocket to the companion. Opening it
//! spawns a socket task that handles:
//!
//! - Incoming text frames (decoded and emitted on the event bus)
//! - Outgoing commands queued by [`Bridge::send`]
//! - Close requests from [`Bridge::disconnect`]
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──socket open──► Open
//!      ▲                          │                        │
//!      └──────── socket error ────┘                        │
//!      └──────── disconnect() / remote close ──────────────┘
//! ```
//!
//! There is no automatic reconnect; call [`Bridge::connect`] again.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};

use crate::bus::{EventBus, HandlerResult, Subscription};
use crate::config::BridgeConfig;
use crate::error::{Error, Result};
use crate::protocol::Command;

use super::handshake::Pong;
use super::router::{self, Routed};
use super::stats::{BridgeStats, StatsSnapshot};

// ============================================================================
// Types
// ============================================================================

type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// Phase
// ============================================================================

/// Connection lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// No socket.
    #[default]
    Disconnected,
    /// Socket is being opened.
    Connecting,
    /// Socket is open; sends are allowed.
    Open,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
        })
    }
}

// ============================================================================
// Link
// ============================================================================

/// Commands for the socket task.
enum LinkCommand {
    /// Write one text frame.
    Send(String),
    /// Close the socket.
    Close,
}

/// Handle to a running socket task.
struct Link {
    /// Distinguishes this socket from later ones.
    generation: u64,
    /// Channel into the socket task.
    command_tx: mpsc::UnboundedSender<LinkCommand>,
}

// ============================================================================
// Inner
// ============================================================================

/// State shared by every clone of a [`Bridge`].
pub(crate) struct Inner {
    pub(crate) config: BridgeConfig,
    pub(crate) bus: EventBus,
    pub(crate) stats: BridgeStats,
    /// Serializes request/response exchanges.
    pub(crate) exchange: tokio::sync::Mutex<()>,
    /// The socket handle; `None` when absent.
    link: Mutex<Option<Link>>,
    phase: watch::Sender<Phase>,
    generation: AtomicU64,
}

impl Inner {
    /// Clears the handle if it still belongs to `generation`.
    fn release(&self, generation: u64) {
        let mut link = self.link.lock();
        if link.as_ref().is_some_and(|l| l.generation == generation) {
            *link = None;
            self.phase.send_replace(Phase::Disconnected);
            info!(generation, "Companion connection closed");
        }
    }
}

// ============================================================================
// ConnectAttempt
// ============================================================================

/// An in-progress `connect()`.
///
/// Dropped before [`complete`](Self::complete), whether by an error return
/// or by the caller abandoning the future, it puts the phase back to
/// `Disconnected` so the next `connect()` is allowed.
struct ConnectAttempt<'a> {
    inner: &'a Inner,
    completed: bool,
}

impl ConnectAttempt<'_> {
    /// Marks the socket as stored; the phase now belongs to the link.
    fn complete(mut self) {
        self.completed = true;
    }
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        let link = self.inner.link.lock();
        if link.is_none() && *self.inner.phase.borrow() == Phase::Connecting {
            self.inner.phase.send_replace(Phase::Disconnected);
            debug!("Connect attempt abandoned");
        }
    }
}

/// Converts a duration to whole milliseconds, saturating at `u64::MAX`.
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Bridge
// ============================================================================

/// WebSocket bridge to the companion process.
///
/// Cheap to clone; clones share one connection, event bus and counters.
/// When the last clone is dropped the socket task closes the socket.
///
/// # Example
///
/// ```no_run
/// use overlay_bridge::{Bridge, BridgeConfig};
///
/// # async fn example() -> overlay_bridge::Result<()> {
/// let bridge = Bridge::new(BridgeConfig::new("127.0.0.1:41021")?);
///
/// bridge.on("controllerConnected", |payload| {
///     println!("controller: {payload}");
///     Ok(())
/// });
///
/// let pong = bridge.connect().await?;
/// assert!(pong.is_alive());
///
/// bridge.notify_toggle_state(true);
/// bridge.disconnect();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Bridge {
    pub(crate) inner: Arc<Inner>,
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("endpoint", &self.inner.config.endpoint().as_str())
            .field("phase", &self.phase())
            .finish()
    }
}

impl Bridge {
    /// Creates a disconnected bridge.
    #[must_use]
    pub fn new(config: BridgeConfig) -> Self {
        let (phase, _) = watch::channel(Phase::Disconnected);

        Self {
            inner: Arc::new(Inner {
                config,
                bus: EventBus::new(),
                stats: BridgeStats::default(),
                exchange: tokio::sync::Mutex::new(()),
                link: Mutex::new(None),
                phase,
                generation: AtomicU64::new(0),
            }),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Opens the socket and confirms the companion with a liveness handshake.
    ///
    /// Resolves with the handshake payload. If the handshake fails the
    /// socket stays open and the error is returned; call
    /// [`disconnect`](Self::disconnect) to drop it.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyConnected`] if a socket is held or being opened
    /// - [`Error::Connection`] if the socket fails before opening
    /// - [`Error::ConnectionTimeout`] if it does not open within the connect timeout
    /// - Any handshake error from [`ping`](Self::ping)
    pub async fn connect(&self) -> Result<Pong> {
        let attempt = self.begin_connect()?;

        let endpoint = self.inner.config.endpoint().as_str();
        let connect_timeout = self.inner.config.connect_timeout();

        debug!(endpoint, "Connecting to companion");

        let ws_stream = match timeout(connect_timeout, connect_async(endpoint)).await {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                warn!(endpoint, error = %e, "Companion connection failed");
                return Err(Error::connection(e.to_string()));
            }
            Err(_) => {
                warn!(endpoint, "Companion connection timed out");
                return Err(Error::connection_timeout(millis(connect_timeout)));
            }
        };

        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        {
            let mut link = self.inner.link.lock();
            *link = Some(Link {
                generation,
                command_tx,
            });
            self.inner.phase.send_replace(Phase::Open);
        }
        attempt.complete();

        info!(endpoint, generation, "Companion connection open");

        tokio::spawn(run_socket_task(
            ws_stream,
            command_rx,
            Arc::downgrade(&self.inner),
            generation,
        ));

        self.ping().await
    }

    /// Moves to `Connecting`, refusing if a socket is held or being opened.
    fn begin_connect(&self) -> Result<ConnectAttempt<'_>> {
        let link = self.inner.link.lock();
        if link.is_some() || *self.inner.phase.borrow() != Phase::Disconnected {
            return Err(Error::AlreadyConnected);
        }
        self.inner.phase.send_replace(Phase::Connecting);
        Ok(ConnectAttempt {
            inner: &self.inner,
            completed: false,
        })
    }

    /// Closes the socket if one is held.
    ///
    /// Returns `true` if a socket was closed; calling it while disconnected
    /// is a no-op returning `false`.
    pub fn disconnect(&self) -> bool {
        let link = {
            let mut slot = self.inner.link.lock();
            let link = slot.take();
            if link.is_some() {
                self.inner.phase.send_replace(Phase::Disconnected);
            }
            link
        };

        match link {
            Some(link) => {
                // The task may already be gone if the peer closed first.
                let _ = link.command_tx.send(LinkCommand::Close);
                info!(generation = link.generation, "Companion connection closed by caller");
                true
            }
            None => {
                trace!("Disconnect while not connected");
                false
            }
        }
    }

    /// Returns the current lifecycle phase.
    #[inline]
    #[must_use]
    pub fn phase(&self) -> Phase {
        *self.inner.phase.borrow()
    }

    /// Returns `true` if the socket is open and sends are allowed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        let link = self.inner.link.lock();
        link.is_some() && *self.inner.phase.borrow() == Phase::Open
    }

    /// Subscribes to lifecycle phase changes.
    ///
    /// The receiver sees [`Phase::Open`] when a connection is established.
    #[must_use]
    pub fn phase_changes(&self) -> watch::Receiver<Phase> {
        self.inner.phase.subscribe()
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Queues one command on the open socket.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if no socket is open (nothing is sent)
    /// - [`Error::ConnectionClosed`] if the socket task already exited
    pub fn send(&self, command: &Command) -> Result<()> {
        let link = self.inner.link.lock();

        let Some(link) = link
            .as_ref()
            .filter(|_| *self.inner.phase.borrow() == Phase::Open)
        else {
            self.inner.stats.record_rejected();
            debug!(command = command.name(), "Send refused: not connected");
            return Err(Error::NotConnected);
        };

        link.command_tx
            .send(LinkCommand::Send(command.encode()))
            .map_err(|_| Error::ConnectionClosed)?;

        self.inner.stats.record_sent();
        trace!(command = command.name(), "Command queued");

        Ok(())
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Returns the event bus inbound frames are routed to.
    #[inline]
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Subscribes to an inbound event. See [`EventBus::on`].
    pub fn on<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&Value) -> HandlerResult + Send + Sync + 'static,
    {
        self.inner.bus.on(event, handler)
    }

    /// Subscribes once to an inbound event. See [`EventBus::once`].
    pub fn once<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&Value) -> HandlerResult + Send + Sync + 'static,
    {
        self.inner.bus.once(event, handler)
    }

    /// Emits a local event. See [`EventBus::emit`].
    pub fn emit(&self, event: &str, payload: &Value) -> usize {
        self.inner.bus.emit(event, payload)
    }

    /// Routes a raw text frame as if it arrived on the socket.
    ///
    /// Lets host glue inject frames received through other channels.
    pub fn route_frame(&self, text: &str) -> Routed {
        router::route(text, &self.inner.bus, &self.inner.stats)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Returns a snapshot of the degradation counters.
    #[inline]
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }
}

// ============================================================================
// Socket Task
// ============================================================================

/// Drives one socket until it closes, then releases the handle.
async fn run_socket_task(
    ws_stream: ClientStream,
    mut command_rx: mpsc::UnboundedReceiver<LinkCommand>,
    inner: Weak<Inner>,
    generation: u64,
) {
    let (mut ws_write, mut ws_read) = ws_stream.split();

    loop {
        tokio::select! {
            // Incoming frames from the companion
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        let Some(inner) = inner.upgrade() else {
                            debug!("Bridge dropped, closing socket");
                            let _ = ws_write.close().await;
                            break;
                        };
                        router::route(text.as_str(), &inner.bus, &inner.stats);
                    }

                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "WebSocket closed by companion");
                        break;
                    }

                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }

                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }

                    // Ignore Binary, Ping, Pong
                    _ => {}
                }
            }

            // Commands from the bridge
            command = command_rx.recv() => {
                match command {
                    Some(LinkCommand::Send(text)) => {
                        if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                            warn!(error = %e, "Failed to write frame");
                            break;
                        }
                    }

                    Some(LinkCommand::Close) => {
                        debug!("Close requested");
                        let _ = ws_write.close().await;
                        break;
                    }

                    None => {
                        debug!("Bridge dropped, closing socket");
                        let _ = ws_write.close().await;
                        break;
                    }
                }
            }
        }
    }

    if let Some(inner) = inner.upgrade() {
        inner.release(generation);
    }

    debug!(generation, "Socket task terminated");
}

// ============================================================================
// Tests
// ============================================================================
