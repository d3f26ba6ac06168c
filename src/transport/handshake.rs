//! Liveness handshake and request/response exchanges.
//!
//! Responses carry no correlation id; the answer to a command is simply the
//! next frame routed to [`RESPONSE_EVENT`]. Each [`Bridge`] therefore
//! serializes its exchanges: a second caller waits until the first one has
//! been answered or timed out.
//!
//! # Exchange
//!
//! 1. Take the exchange lock
//! 2. Refuse if the socket is not open (nothing is sent)
//! 3. Subscribe once to `"response"`
//! 4. Send the command
//! 5. Race the response against the configured timeout
//!
//! The subscription is removed however the exchange ends (answer, timeout,
//! send failure or a dropped future), so a late frame resolves nothing.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::bus::Subscription;
use crate::error::{Error, Result};
use crate::protocol::{Command, RESPONSE_EVENT, Response};

use super::connection::{Bridge, millis};

// ============================================================================
// Pong
// ============================================================================

/// Payload of a successful liveness handshake.
///
/// # Format
///
/// ```json
/// { "pong": true, "timestamp": 1700000000 }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    /// Companion's liveness flag.
    pub pong: bool,
    /// Companion clock, seconds since the Unix epoch.
    pub timestamp: u64,
}

impl Pong {
    /// Returns `true` if the companion reported itself alive.
    #[inline]
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        self.pong
    }
}

// ============================================================================
// Bridge Exchanges
// ============================================================================

impl Bridge {
    /// Performs one liveness handshake.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if no socket is open
    /// - [`Error::Remote`] if the companion answered with a failure
    /// - [`Error::Timeout`] if no response arrived in time
    /// - [`Error::Protocol`] if the payload is not a pong
    pub async fn ping(&self) -> Result<Pong> {
        let data = self.request(Command::Ping).await?;
        let pong: Pong = serde_json::from_value(data)
            .map_err(|e| Error::protocol(format!("Invalid pong payload: {e}")))?;

        debug!(timestamp = pong.timestamp, alive = pong.pong, "Companion answered ping");

        Ok(pong)
    }

    /// Sends `command` and waits for the next response frame.
    ///
    /// Exchanges on one bridge never overlap.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if no socket is open
    /// - [`Error::ConnectionClosed`] if the socket task exited
    /// - [`Error::Remote`] if the response has `success: false` or no `data`
    /// - [`Error::Timeout`] if no response arrived within the ping timeout
    pub async fn request(&self, command: Command) -> Result<Value> {
        let _exchange = self.inner.exchange.lock().await;

        if !self.is_open() {
            self.inner.stats.record_rejected();
            debug!(command = command.name(), "Request refused: not connected");
            return Err(Error::NotConnected);
        }

        let (response_tx, response_rx) = oneshot::channel::<Value>();
        let slot = Mutex::new(Some(response_tx));

        // Removed on every exit, including when the caller drops this future.
        let _pending = PendingResponse(self.inner.bus.once(RESPONSE_EVENT, move |payload| {
            if let Some(tx) = slot.lock().take() {
                let _ = tx.send(payload.clone());
            }
            Ok(())
        }));

        self.send(&command)?;

        let window = self.inner.config.ping_timeout();

        match timeout(window, response_rx).await {
            Ok(Ok(payload)) => Response::from_payload(&payload).into_result(),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                let timeout_ms = millis(window);
                self.inner.stats.record_timeout();
                warn!(command = command.name(), timeout_ms, "No response from companion");
                Err(Error::timeout(format!("{} response", command.name()), timeout_ms))
            }
        }
    }
}

/// The one-shot `"response"` subscription of an exchange.
struct PendingResponse(Subscription);

impl Drop for PendingResponse {
    fn drop(&mut self) {
        self.0.unsubscribe();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::config::BridgeConfig;
    use crate::transport::test_support::{ScriptedPeer, init_tracing, pong_reply};

    fn bridge_for(peer: &ScriptedPeer, ping_timeout: Duration) -> Bridge {
        let config = BridgeConfig::builder()
            .host(peer.host())
            .ping_timeout(ping_timeout)
            .build()
            .expect("valid config");
        Bridge::new(config)
    }

    #[test]
    fn test_pong_deserialize() {
        let pong: Pong =
            serde_json::from_str(r#"{"pong":true,"timestamp":42}"#).expect("parse");
        assert!(pong.is_alive());
        assert_eq!(pong.timestamp, 42);
    }

    #[tokio::test]
    async fn test_ping_without_connection_fails_fast() {
        let bridge = Bridge::new(BridgeConfig::new("127.0.0.1:1").expect("config"));

        let err = bridge.ping().await.unwrap_err();

        assert!(matches!(err, Error::NotConnected));
        assert!(bridge.events().is_empty());
        assert_eq!(bridge.stats().frames_sent, 0);
    }

    #[tokio::test]
    async fn test_ping_resolves_with_payload() {
        init_tracing();
        let peer = ScriptedPeer::start(pong_reply(123)).await;
        let bridge = bridge_for(&peer, Duration::from_millis(500));

        bridge.connect().await.expect("connect");
        let pong = bridge.ping().await.expect("ping");

        assert_eq!(pong, Pong { pong: true, timestamp: 123 });
        assert_eq!(bridge.events().handler_count(RESPONSE_EVENT), 0);
    }

    #[tokio::test]
    async fn test_ping_timeout_removes_subscription() {
        init_tracing();
        // Answers the connect handshake, then goes quiet.
        let answered = std::sync::atomic::AtomicBool::new(false);
        let mut peer = ScriptedPeer::start(move |frame: &str| {
            if frame.contains("ping") && !answered.swap(true, std::sync::atomic::Ordering::SeqCst) {
                Some(r#"{"success":true,"data":{"pong":true,"timestamp":1}}"#.to_string())
            } else {
                None
            }
        })
        .await;
        let bridge = bridge_for(&peer, Duration::from_millis(150));

        bridge.connect().await.expect("connect");
        let _ = peer.next_frame().await;

        let err = bridge.ping().await.unwrap_err();

        assert!(err.is_timeout(), "got {err:?}");
        assert_eq!(bridge.events().handler_count(RESPONSE_EVENT), 0);
        assert_eq!(bridge.stats().exchange_timeouts, 1);

        // A late answer finds nobody waiting.
        let routed = bridge.route_frame(r#"{"success":true,"data":{"pong":true,"timestamp":2}}"#);
        assert_eq!(
            routed,
            crate::transport::Routed::Emitted {
                event: RESPONSE_EVENT.into(),
                handlers: 0
            }
        );
    }

    #[tokio::test]
    async fn test_abandoned_pings_leave_no_subscription() {
        init_tracing();
        let answered = std::sync::atomic::AtomicBool::new(false);
        let peer = ScriptedPeer::start(move |_: &str| {
            (!answered.swap(true, std::sync::atomic::Ordering::SeqCst))
                .then(|| r#"{"success":true,"data":{"pong":true,"timestamp":1}}"#.to_string())
        })
        .await;
        let bridge = bridge_for(&peer, Duration::from_millis(500));
        bridge.connect().await.expect("connect");

        for _ in 0..3 {
            let abandoned = timeout(Duration::from_millis(50), bridge.ping()).await;
            assert!(abandoned.is_err());
        }

        assert_eq!(bridge.events().handler_count(RESPONSE_EVENT), 0);
        assert_eq!(bridge.stats().exchange_timeouts, 0);
    }

    #[tokio::test]
    async fn test_invalid_pong_is_protocol_error() {
        init_tracing();
        let peer = ScriptedPeer::start(|_: &str| {
            Some(r#"{"success":true,"data":{"hello":1}}"#.to_string())
        })
        .await;
        let bridge = bridge_for(&peer, Duration::from_millis(500));

        let err = bridge.connect().await.unwrap_err();

        assert!(matches!(err, Error::Protocol { ref message } if message.starts_with("Invalid pong payload")));
    }

    #[tokio::test]
    async fn test_failed_response_carries_peer_error() {
        init_tracing();
        let answered = std::sync::atomic::AtomicBool::new(false);
        let peer = ScriptedPeer::start(move |_: &str| {
            if answered.swap(true, std::sync::atomic::Ordering::SeqCst) {
                Some(r#"{"success":false,"error":"bad"}"#.to_string())
            } else {
                Some(r#"{"success":true,"data":{"pong":true,"timestamp":1}}"#.to_string())
            }
        })
        .await;
        let bridge = bridge_for(&peer, Duration::from_millis(500));

        bridge.connect().await.expect("connect");
        let err = bridge.ping().await.unwrap_err();

        assert!(matches!(err, Error::Remote { ref message } if message == "bad"));
    }

    #[tokio::test]
    async fn test_connect_fails_when_handshake_fails() {
        init_tracing();
        let peer = ScriptedPeer::start(|_: &str| Some(r#"{"success":true}"#.to_string())).await;
        let bridge = bridge_for(&peer, Duration::from_millis(500));

        let err = bridge.connect().await.unwrap_err();

        assert!(
            matches!(err, Error::Remote { ref message } if message == crate::protocol::GENERIC_FAILURE)
        );
        // The socket stays open for the caller to decide.
        assert!(bridge.is_open());
    }

    #[tokio::test]
    async fn test_concurrent_pings_are_serialized() {
        init_tracing();
        let peer = ScriptedPeer::start(pong_reply(9)).await;
        let bridge = bridge_for(&peer, Duration::from_millis(500));
        bridge.connect().await.expect("connect");

        let (a, b) = tokio::join!(bridge.ping(), bridge.ping());

        assert_eq!(a.expect("first ping").timestamp, 9);
        assert_eq!(b.expect("second ping").timestamp, 9);
        assert_eq!(bridge.stats().frames_sent, 3);
    }

    #[tokio::test]
    async fn test_custom_request() {
        init_tracing();
        let peer = ScriptedPeer::start(|frame: &str| {
            if frame.contains("getVersion") {
                Some(r#"{"success":true,"data":"1.2.3"}"#.to_string())
            } else {
                Some(r#"{"success":true,"data":{"pong":true,"timestamp":1}}"#.to_string())
            }
        })
        .await;
        let bridge = bridge_for(&peer, Duration::from_millis(500));
        bridge.connect().await.expect("connect");

        let data = bridge
            .request(Command::custom("getVersion", serde_json::Map::new()))
            .await
            .expect("request");

        assert_eq!(data, Value::String("1.2.3".into()));
    }
}
