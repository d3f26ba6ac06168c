//! Companion WebSocket server.
//!
//! Overlays connect here. Every connection runs on its own task; pushes
//! from the companion application reach all of them through
//! [`CompanionHandle::broadcast`].
//!
//! # Connection Flow
//!
//! 1. The companion binds to `127.0.0.1:0` (random port)
//! 2. The port is handed to the overlay as its bridge host
//! 3. The overlay connects and sends `ping`
//! 4. Commands flow in, event pushes flow out

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};

use super::handler::{CompanionNotice, Handler};

// ============================================================================
// Types
// ============================================================================

type BroadcastSender = mpsc::UnboundedSender<Message>;

/// Live connections keyed by a per-server id.
type ConnectionList = Arc<Mutex<Vec<(u64, BroadcastSender)>>>;

// ============================================================================
// CompanionServer
// ============================================================================

/// A companion server that is bound but not yet accepting.
///
/// # Example
///
/// ```no_run
/// use std::net::{IpAddr, Ipv4Addr};
/// use overlay_bridge::companion::CompanionServer;
///
/// # async fn example() -> overlay_bridge::Result<()> {
/// let server = CompanionServer::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).await?;
/// println!("overlay host: {}", server.host());
///
/// let mut handle = server.run();
/// while let Some(notice) = handle.next_notice().await {
///     println!("{notice:?}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct CompanionServer {
    /// TCP listener for overlay connections.
    listener: TcpListener,
    /// Bound address.
    addr: SocketAddr,
}

impl CompanionServer {
    /// Binds to `ip:port`. Use port 0 for a random free port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind(ip: IpAddr, port: u16) -> Result<Self> {
        let listener = TcpListener::bind(SocketAddr::new(ip, port)).await?;
        let addr = listener.local_addr()?;

        debug!(port = addr.port(), "Companion server bound");

        Ok(Self { listener, addr })
    }

    /// Returns the bound port.
    #[inline]
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Returns the bound address.
    #[inline]
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the `host:port` value overlays are configured with.
    #[inline]
    #[must_use]
    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    /// Returns the WebSocket URL. Format: `ws://{ip}:{port}`
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Starts accepting overlays on a spawned task.
    #[must_use]
    pub fn run(self) -> CompanionHandle {
        let connections: ConnectionList = Arc::new(Mutex::new(Vec::new()));
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let handler = Handler::new(notice_tx);
        let addr = self.addr;

        let accept_task = tokio::spawn(accept_loop(
            self.listener,
            handler,
            Arc::clone(&connections),
        ));

        info!(port = addr.port(), "Companion server listening");

        CompanionHandle {
            addr,
            connections,
            notices: notice_rx,
            accept_task,
        }
    }
}

// ============================================================================
// CompanionHandle
// ============================================================================

/// A running companion server.
pub struct CompanionHandle {
    addr: SocketAddr,
    connections: ConnectionList,
    notices: mpsc::UnboundedReceiver<CompanionNotice>,
    accept_task: JoinHandle<()>,
}

impl CompanionHandle {
    /// Returns the bound address.
    #[inline]
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the `host:port` value overlays are configured with.
    #[inline]
    #[must_use]
    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    /// Returns the number of connected overlays.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Sends `message` as a text frame to every connected overlay.
    ///
    /// Returns how many connections accepted it; dead ones are pruned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if `message` cannot be serialized.
    pub fn broadcast<T: Serialize>(&self, message: &T) -> Result<usize> {
        let json = serde_json::to_string(message)?;
        let mut connections = self.connections.lock();

        if connections.is_empty() {
            trace!("No overlay connections to broadcast to");
            return Ok(0);
        }

        connections.retain(|(_, sender)| sender.send(Message::Text(json.clone().into())).is_ok());
        debug!(count = connections.len(), "Broadcast sent");

        Ok(connections.len())
    }

    /// Waits for the next notice from any overlay.
    pub async fn next_notice(&mut self) -> Option<CompanionNotice> {
        self.notices.recv().await
    }

    /// Stops accepting and closes every overlay connection.
    pub fn shutdown(self) {
        self.accept_task.abort();

        let connections: Vec<_> = self.connections.lock().drain(..).collect();
        for (_, sender) in connections {
            let _ = sender.send(Message::Close(None));
        }

        info!(port = self.addr.port(), "Companion server stopped");
    }
}

// ============================================================================
// Connection Tasks
// ============================================================================

async fn accept_loop(listener: TcpListener, handler: Handler, connections: ConnectionList) {
    let mut next_id: u64 = 0;

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!(%addr, "Overlay TCP connection accepted");
                let id = next_id;
                next_id += 1;
                let handler = handler.clone();
                let connections = Arc::clone(&connections);

                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, addr, id, handler, &connections).await {
                        error!(%addr, error = %e, "Overlay connection failed");
                    }
                    connections.lock().retain(|(conn_id, _)| *conn_id != id);
                });
            }
            Err(e) => {
                error!(error = %e, "Failed to accept overlay connection");
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    id: u64,
    handler: Handler,
    connections: &ConnectionList,
) -> Result<()> {
    let ws_stream = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))?;

    info!(%addr, "Overlay connected");

    let (broadcast_tx, broadcast_rx) = mpsc::unbounded_channel();
    {
        let mut conns = connections.lock();
        conns.push((id, broadcast_tx));
        debug!(total = conns.len(), "Registered overlay connection");
    }

    process_messages(ws_stream, addr, handler, broadcast_rx).await
}

async fn process_messages(
    ws_stream: WebSocketStream<TcpStream>,
    addr: SocketAddr,
    handler: Handler,
    mut broadcast_rx: mpsc::UnboundedReceiver<Message>,
) -> Result<()> {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    loop {
        tokio::select! {
            message = ws_receiver.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        trace!(%addr, text = %text.as_str(), "Overlay frame");

                        if let Some(response) = handler.handle_text(text.as_str()) {
                            let json = serde_json::to_string(&response)?;
                            ws_sender.send(Message::Text(json.into())).await?;
                        }
                    }

                    Some(Ok(Message::Ping(data))) => {
                        ws_sender.send(Message::Pong(data)).await?;
                    }

                    Some(Ok(Message::Close(_))) => {
                        info!(%addr, "Overlay closed the connection");
                        break;
                    }

                    Some(Err(e)) => {
                        warn!(%addr, error = %e, "Overlay WebSocket error");
                        break;
                    }

                    None => {
                        debug!(%addr, "Overlay stream ended");
                        break;
                    }

                    // Ignore Binary, Pong, Frame
                    Some(Ok(_)) => {}
                }
            }

            Some(outbound) = broadcast_rx.recv() => {
                let closing = matches!(outbound, Message::Close(_));
                if let Err(e) = ws_sender.send(outbound).await {
                    warn!(%addr, error = %e, "Failed to push frame to overlay");
                    break;
                }
                if closing {
                    break;
                }
            }
        }
    }

    debug!(%addr, "Overlay connection task finished");
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
