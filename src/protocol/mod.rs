//! WebSocket protocol message types.
//!
//! This module defines the message format exchanged between the overlay
//! (local end) and the companion process (remote end).
//!
//! # Protocol Overview
//!
//! | Message | Direction | Shape |
//! |---------|-----------|-------|
//! | Command | Local → Remote | `{"command": "<name>", ...}` |
//! | Event push | Remote → Local | `{"type": "<name>", ...}` |
//! | Response | Remote → Local | `{"success": bool, "data"?: any, "error"?: string}` |
//!
//! Responses are not correlated to commands; the bridge keeps at most one
//! request/response exchange in flight.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Outbound commands and the encoder |
//! | `envelope` | Inbound envelope, decoder and response view |

// ============================================================================
// Submodules
// ============================================================================

/// Outbound command definitions.
pub mod command;

/// Inbound envelope and decoder.
pub mod envelope;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{Command, encode};
pub use envelope::{
    DecodeError, DecodeResult, Envelope, GENERIC_FAILURE, RESPONSE_EVENT, Response, decode,
};
