//! WebSocket transport layer.
//!
//! This module owns the socket to the companion process and everything that
//! runs on it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Overlay (Rust) │                              │  Companion      │
//! │                 │         WebSocket            │  (native app)   │
//! │  Bridge         │─────────────────────────────►│                 │
//! │  → socket task  │      ws://<host>             │  WebSocket      │
//! │  → EventBus     │◄─────────────────────────────│  server         │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Connection manager and socket task |
//! | `handshake` | Liveness handshake and request/response exchanges |
//! | `router` | Inbound frame routing onto the event bus |
//! | `stats` | Degradation counters |

// ============================================================================
// Submodules
// ============================================================================

/// Connection manager and socket task.
pub mod connection;

/// Liveness handshake and request/response exchanges.
pub mod handshake;

/// Inbound frame routing.
pub mod router;

/// Degradation counters.
pub mod stats;

#[cfg(test)]
pub(crate) mod test_support;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Bridge, Phase};
pub use handshake::Pong;
pub use router::Routed;
pub use stats::{BridgeStats, StatsSnapshot};
