//! Companion-side command handling.
//!
//! Each text frame from the overlay is parsed as a command. Requests get a
//! response frame; notifications are published as [`CompanionNotice`]s and
//! get no answer, so they can never be mistaken for the response to an
//! in-flight request.

// ============================================================================
// Imports
// ============================================================================

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::transport::Pong;

// ============================================================================
// CompanionCommand
// ============================================================================

/// Commands the companion understands.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum CompanionCommand {
    /// Liveness check; answered with a [`Pong`].
    Ping,
    /// Overlay visibility changed; not answered.
    OverlayStateChanged {
        /// Whether the overlay is now visible.
        open: bool,
    },
}

// ============================================================================
// CompanionNotice
// ============================================================================

/// Notifications the companion application receives from overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanionNotice {
    /// An overlay reported its visibility.
    OverlayStateChanged {
        /// Whether the overlay is now visible.
        open: bool,
    },
}

// ============================================================================
// WsResponse
// ============================================================================

/// Response frame sent back to the overlay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WsResponse {
    /// Whether the command was handled.
    pub success: bool,
    /// Result data (if success).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Error message (if failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WsResponse {
    /// Creates a success response.
    #[inline]
    #[must_use]
    pub fn success(data: Option<Value>) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    /// Creates an error response.
    #[inline]
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

// ============================================================================
// Handler
// ============================================================================

/// Dispatches overlay commands for one companion server.
#[derive(Debug, Clone)]
pub(crate) struct Handler {
    notices: mpsc::UnboundedSender<CompanionNotice>,
}

impl Handler {
    pub(crate) fn new(notices: mpsc::UnboundedSender<CompanionNotice>) -> Self {
        Self { notices }
    }

    /// Handles one text frame; returns the response to send, if any.
    pub(crate) fn handle_text(&self, text: &str) -> Option<WsResponse> {
        match serde_json::from_str::<CompanionCommand>(text) {
            Ok(command) => self.handle(command),
            Err(e) => {
                warn!(error = %e, "Failed to parse overlay command");
                Some(WsResponse::error(format!("Invalid message: {e}")))
            }
        }
    }

    fn handle(&self, command: CompanionCommand) -> Option<WsResponse> {
        match command {
            CompanionCommand::Ping => {
                debug!("Received ping");
                Some(Self::pong())
            }
            CompanionCommand::OverlayStateChanged { open } => {
                debug!(open, "Overlay state changed");
                if self
                    .notices
                    .send(CompanionNotice::OverlayStateChanged { open })
                    .is_err()
                {
                    warn!("Nobody is listening for overlay notices");
                }
                None
            }
        }
    }

    fn pong() -> WsResponse {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        match serde_json::to_value(Pong {
            pong: true,
            timestamp,
        }) {
            Ok(data) => WsResponse::success(Some(data)),
            Err(e) => WsResponse::error(format!("Failed to serialize pong: {e}")),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn handler() -> (Handler, mpsc::UnboundedReceiver<CompanionNotice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Handler::new(tx), rx)
    }

    #[test]
    fn test_parse_commands() {
        let ping: CompanionCommand = serde_json::from_str(r#"{"command":"ping"}"#).expect("ping");
        assert_eq!(ping, CompanionCommand::Ping);

        let toggle: CompanionCommand =
            serde_json::from_str(r#"{"command":"overlayStateChanged","open":true}"#)
                .expect("toggle");
        assert_eq!(toggle, CompanionCommand::OverlayStateChanged { open: true });
    }

    #[test]
    fn test_ping_answers_pong() {
        let (handler, _rx) = handler();

        let response = handler.handle_text(r#"{"command":"ping"}"#).expect("response");

        assert!(response.success);
        let data = response.data.expect("data");
        assert_eq!(data["pong"], json!(true));
        assert!(data["timestamp"].as_u64().is_some_and(|t| t > 0));
    }

    #[test]
    fn test_overlay_state_is_published_without_answer() {
        let (handler, mut rx) = handler();

        let response = handler.handle_text(r#"{"command":"overlayStateChanged","open":false}"#);

        assert!(response.is_none());
        assert_eq!(
            rx.try_recv().expect("notice"),
            CompanionNotice::OverlayStateChanged { open: false }
        );
    }

    #[test]
    fn test_invalid_command_answers_error() {
        let (handler, _rx) = handler();

        let response = handler.handle_text(r#"{"command":"launchRockets"}"#).expect("response");

        assert!(!response.success);
        assert!(response.error.expect("error").starts_with("Invalid message:"));
    }

    #[test]
    fn test_response_serialization_skips_empty_fields() {
        let json = serde_json::to_string(&WsResponse::error("bad")).expect("serialize");
        assert_eq!(json, r#"{"success":false,"error":"bad"}"#);
    }
}
