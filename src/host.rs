//! Host toggle intake.
//!
//! The host application reports overlay visibility through a four-argument
//! callback `(app_id, reserved, open, always_true)`. Instead of registering
//! bridge code as that callback, the glue pushes each invocation into a
//! channel as a [`HostSignal`], and a [`ToggleForwarder`] task relays the
//! `open` flag to [`Bridge::notify_toggle_state`].
//!
//! # Example
//!
//! ```no_run
//! use overlay_bridge::{Bridge, BridgeConfig, ToggleForwarder, host_channel};
//!
//! # async fn example() -> overlay_bridge::Result<()> {
//! let bridge = Bridge::new(BridgeConfig::new("127.0.0.1:41021")?);
//! bridge.connect().await?;
//!
//! let (sender, receiver) = host_channel();
//! let forwarder = ToggleForwarder::spawn(bridge.clone(), receiver);
//!
//! // Called from the host's overlay callback.
//! sender.overlay_activated(480, 0, true, true);
//!
//! drop(sender);
//! let report = forwarder.await.expect("forwarder task");
//! println!("forwarded {} toggles", report.forwarded);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::transport::Bridge;

// ============================================================================
// HostSignal
// ============================================================================

/// Arguments of one host overlay callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayActivation {
    /// Application the overlay belongs to.
    pub app_id: u64,
    /// Always zero in practice.
    pub reserved: u32,
    /// `true` when the overlay became visible.
    pub open: bool,
    /// Always `true` in practice.
    pub always_true: bool,
}

/// A notification from the host environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSignal {
    /// The overlay was shown or hidden.
    OverlayActivated(OverlayActivation),
}

// ============================================================================
// Channel
// ============================================================================

/// Creates the channel host glue uses to report signals.
#[must_use]
pub fn host_channel() -> (HostSender, HostReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (HostSender { tx }, HostReceiver { rx })
}

/// Sending half, held by the host glue.
#[derive(Debug, Clone)]
pub struct HostSender {
    tx: mpsc::UnboundedSender<HostSignal>,
}

impl HostSender {
    /// Reports one invocation of the host's overlay callback.
    ///
    /// Returns `false` if the receiving side is gone.
    pub fn overlay_activated(&self, app_id: u64, reserved: u32, open: bool, always_true: bool) -> bool {
        self.send(HostSignal::OverlayActivated(OverlayActivation {
            app_id,
            reserved,
            open,
            always_true,
        }))
    }

    /// Sends a raw signal. Returns `false` if the receiving side is gone.
    pub fn send(&self, signal: HostSignal) -> bool {
        self.tx.send(signal).is_ok()
    }
}

/// Receiving half, consumed by [`ToggleForwarder`].
#[derive(Debug)]
pub struct HostReceiver {
    rx: mpsc::UnboundedReceiver<HostSignal>,
}

impl HostReceiver {
    /// Waits for the next signal; `None` once every sender is dropped.
    pub async fn recv(&mut self) -> Option<HostSignal> {
        self.rx.recv().await
    }
}

// ============================================================================
// ToggleForwarder
// ============================================================================

/// Outcome of a forwarder run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardReport {
    /// Toggles delivered to the companion.
    pub forwarded: u64,
    /// Toggles dropped because the bridge was not open.
    pub dropped: u64,
}

/// Relays host overlay toggles to the companion.
pub struct ToggleForwarder;

impl ToggleForwarder {
    /// Spawns the relay task. It ends when every [`HostSender`] is dropped.
    pub fn spawn(bridge: Bridge, receiver: HostReceiver) -> JoinHandle<ForwardReport> {
        tokio::spawn(Self::run(bridge, receiver))
    }

    /// Runs the relay on the current task.
    pub async fn run(bridge: Bridge, mut receiver: HostReceiver) -> ForwardReport {
        let mut report = ForwardReport::default();

        while let Some(signal) = receiver.recv().await {
            let HostSignal::OverlayActivated(activation) = signal;
            trace!(?activation, "Host overlay callback");

            if bridge.notify_toggle_state(activation.open) {
                report.forwarded += 1;
            } else {
                report.dropped += 1;
            }
        }

        debug!(
            forwarded = report.forwarded,
            dropped = report.dropped,
            "Host channel closed"
        );

        report
    }
}

// ============================================================================
// Tests
// ============================================================================
