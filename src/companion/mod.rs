//! Companion side of the bridge.
//!
//! The native application the overlay talks to. It accepts overlay
//! connections, answers `ping`, publishes overlay state notices and pushes
//! events to every connected overlay.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `handler` | Command parsing and dispatch |
//! | `server` | WebSocket server and per-connection tasks |

// ============================================================================
// Submodules
// ============================================================================

/// Command parsing and dispatch.
pub mod handler;

/// WebSocket server and per-connection tasks.
pub mod server;

// ============================================================================
// Re-exports
// ============================================================================

pub use handler::{CompanionCommand, CompanionNotice, WsResponse};
pub use server::{CompanionHandle, CompanionServer};
