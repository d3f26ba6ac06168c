//! Degradation counters.
//!
//! The bridge fails soft: malformed frames are dropped and sends while
//! disconnected are refused without an error. These counters let the
//! embedding application notice when that happens.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// BridgeStats
// ============================================================================

/// Live counters, updated by the socket task and the senders.
#[derive(Debug, Default)]
pub struct BridgeStats {
    frames_received: AtomicU64,
    frames_sent: AtomicU64,
    malformed_dropped: AtomicU64,
    unroutable_dropped: AtomicU64,
    sends_rejected: AtomicU64,
    exchange_timeouts: AtomicU64,
}

impl BridgeStats {
    #[inline]
    pub(crate) fn record_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_malformed(&self) {
        self.malformed_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_unroutable(&self) {
        self.unroutable_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_rejected(&self) {
        self.sends_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_timeout(&self) {
        self.exchange_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            malformed_dropped: self.malformed_dropped.load(Ordering::Relaxed),
            unroutable_dropped: self.unroutable_dropped.load(Ordering::Relaxed),
            sends_rejected: self.sends_rejected.load(Ordering::Relaxed),
            exchange_timeouts: self.exchange_timeouts.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// StatsSnapshot
// ============================================================================

/// Copy of [`BridgeStats`] at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Text frames handed to the router.
    pub frames_received: u64,
    /// Frames queued on the socket.
    pub frames_sent: u64,
    /// Frames dropped because they were not JSON.
    pub malformed_dropped: u64,
    /// Frames dropped because they had no `type` or `success`.
    pub unroutable_dropped: u64,
    /// Sends refused because no socket was open.
    pub sends_rejected: u64,
    /// Request/response exchanges that timed out.
    pub exchange_timeouts: u64,
}

impl StatsSnapshot {
    /// Total frames dropped on the receive path.
    #[inline]
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.malformed_dropped + self.unroutable_dropped
    }
}
