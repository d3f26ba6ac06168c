//! Domain commands sent to the companion.
//!
//! These are fire-and-forget: no acknowledgement is awaited, and nothing is
//! queued or retried while the socket is down.

// ============================================================================
// Imports
// ============================================================================

use tracing::{debug, warn};

use crate::error::Error;
use crate::protocol::Command;
use crate::transport::Bridge;

// ============================================================================
// Command Bridge
// ============================================================================

impl Bridge {
    /// Tells the companion the overlay became visible (`true`) or hidden.
    ///
    /// Returns `false` without sending if no socket is open.
    pub fn notify_toggle_state(&self, open: bool) -> bool {
        match self.send(&Command::OverlayStateChanged { open }) {
            Ok(()) => {
                debug!(open, "Overlay state sent");
                true
            }
            Err(Error::NotConnected) => {
                warn!(open, "Overlay state not sent: not connected");
                false
            }
            Err(e) => {
                warn!(open, error = %e, "Overlay state not sent");
                false
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::config::BridgeConfig;
    use crate::transport::Bridge;
    use crate::transport::test_support::{ScriptedPeer, init_tracing, pong_reply};

    #[test]
    fn test_toggle_while_disconnected() {
        let bridge = Bridge::new(BridgeConfig::new("127.0.0.1:1").expect("config"));

        assert!(!bridge.notify_toggle_state(true));
        assert_eq!(bridge.stats().sends_rejected, 1);
        assert_eq!(bridge.stats().frames_sent, 0);
    }

    #[tokio::test]
    async fn test_toggle_sends_one_frame() {
        init_tracing();
        let mut peer = ScriptedPeer::start(pong_reply(1)).await;
        let bridge = Bridge::new(BridgeConfig::new(peer.host()).expect("config"));

        bridge.connect().await.expect("connect");
        assert_eq!(peer.next_frame().await.as_deref(), Some(r#"{"command":"ping"}"#));

        assert!(bridge.notify_toggle_state(true));
        assert_eq!(
            peer.next_frame().await.as_deref(),
            Some(r#"{"command":"overlayStateChanged","open":true}"#)
        );

        // Nothing else follows.
        let extra = tokio::time::timeout(Duration::from_millis(100), peer.next_frame()).await;
        assert!(matches!(extra, Err(_) | Ok(None)));
    }

    #[tokio::test]
    async fn test_toggle_after_disconnect() {
        init_tracing();
        let peer = ScriptedPeer::start(pong_reply(1)).await;
        let bridge = Bridge::new(BridgeConfig::new(peer.host()).expect("config"));

        bridge.connect().await.expect("connect");
        bridge.disconnect();

        assert!(!bridge.notify_toggle_state(false));
    }
}
