//! Overlay Bridge - WebSocket link between an embedded overlay and its companion.
//!
//! An overlay page runs inside a host application's browser panel. This crate
//! connects it to a companion process over one persistent WebSocket, so the
//! two can exchange commands and push notifications.
//!
//! # Architecture
//!
//! The bridge follows a client-server model:
//!
//! - **Local End (overlay)**: [`Bridge`] sends commands, receives pushes
//! - **Remote End (companion)**: [`companion::CompanionServer`] answers commands, pushes events
//!
//! Key design principles:
//!
//! - One [`Bridge`] owns at most one socket and one socket task
//! - Inbound frames are routed by shape onto an [`EventBus`]
//! - Responses are uncorrelated, so request/response exchanges are serialized
//! - Fail soft: bad frames and sends while disconnected are logged and counted
//!
//! # Quick Start
//!
//! ```no_run
//! use overlay_bridge::{Bridge, BridgeConfig, ToggleForwarder, host_channel, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let bridge = Bridge::new(BridgeConfig::from_env()?);
//!
//!     // Connect and confirm the companion is alive
//!     let pong = bridge.connect().await?;
//!     println!("companion clock: {}", pong.timestamp);
//!
//!     // Relay host overlay toggles
//!     let (sender, receiver) = host_channel();
//!     let _forwarder = ToggleForwarder::spawn(bridge.clone(), receiver);
//!     sender.overlay_activated(480, 0, true, true);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`bus`] | Named-event publish/subscribe registry |
//! | [`companion`] | Companion-side WebSocket server |
//! | [`config`] | Bridge configuration |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`host`] | Host toggle intake |
//! | [`protocol`] | Wire message types |
//! | [`transport`] | Connection manager and handshake |

// ============================================================================
// Modules
// ============================================================================

/// Domain commands (overlay state notifications).
mod bridge;

/// Named-event publish/subscribe registry.
pub mod bus;

/// Companion-side WebSocket server.
///
/// The native process overlays connect to.
pub mod companion;

/// Bridge configuration.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Host toggle intake.
pub mod host;

/// WebSocket protocol message types.
pub mod protocol;

/// WebSocket transport layer.
///
/// Connection lifecycle, socket task, routing and the liveness handshake.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Event bus
pub use bus::{EventBus, HandlerError, HandlerResult, Subscription, SubscriptionId};

// Configuration
pub use config::{BridgeConfig, BridgeConfigBuilder};

// Error types
pub use error::{Error, Result};

// Host intake
pub use host::{
    ForwardReport, HostReceiver, HostSender, HostSignal, OverlayActivation, ToggleForwarder,
    host_channel,
};

// Protocol
pub use protocol::{Command, Envelope, RESPONSE_EVENT, Response};

// Transport
pub use transport::{Bridge, Phase, Pong, Routed, StatsSnapshot};
