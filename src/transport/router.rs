//! Inbound frame routing.
//!
//! Decodes one text frame and emits it on the event bus. Decode failures
//! are logged and counted, never propagated.

// ============================================================================
// Imports
// ============================================================================

use tracing::{trace, warn};

use crate::bus::EventBus;
use crate::protocol::{DecodeError, decode};

use super::stats::BridgeStats;

// ============================================================================
// Routed
// ============================================================================

/// What happened to a routed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// Emitted under `event` to `handlers` handlers.
    Emitted {
        /// Event name the frame was emitted under.
        event: String,
        /// Number of handlers invoked.
        handlers: usize,
    },
    /// Not JSON; dropped.
    Malformed,
    /// JSON without `type` or `success`; dropped.
    Unroutable,
}

impl Routed {
    /// Returns `true` if the frame reached the bus.
    #[inline]
    #[must_use]
    pub fn is_emitted(&self) -> bool {
        matches!(self, Self::Emitted { .. })
    }
}

/// Characters of a dropped frame included in its log line.
const LOGGED_FRAME_CHARS: usize = 128;

/// Leading part of `text`, cut on a char boundary.
fn preview(text: &str) -> &str {
    text.char_indices()
        .nth(LOGGED_FRAME_CHARS)
        .map_or(text, |(end, _)| &text[..end])
}

/// Routes one text frame onto `bus`.
pub(crate) fn route(text: &str, bus: &EventBus, stats: &BridgeStats) -> Routed {
    stats.record_received();

    match decode(text) {
        Ok(envelope) => {
            let (event, payload) = envelope.into_parts();
            let handlers = bus.emit(&event, &payload);
            trace!(event = %event, handlers, "Frame routed");
            Routed::Emitted { event, handlers }
        }
        Err(DecodeError::Malformed(e)) => {
            stats.record_malformed();
            warn!(
                error = %e,
                len = text.len(),
                text = %preview(text),
                "Dropping malformed frame"
            );
            Routed::Malformed
        }
        Err(DecodeError::Unroutable) => {
            stats.record_unroutable();
            warn!(len = text.len(), text = %preview(text), "Dropping unroutable frame");
            Routed::Unroutable
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
