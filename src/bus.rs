//! Named-event publish/subscribe registry.
//!
//! Inbound frames are routed through an [`EventBus`]: event pushes under
//! their `type`, responses under [`RESPONSE_EVENT`](crate::protocol::RESPONSE_EVENT).
//!
//! # Semantics
//!
//! - Handlers for one name run in registration order, synchronously, on the
//!   emitting task.
//! - `emit` iterates a snapshot taken at call time; handlers may subscribe or
//!   unsubscribe while it runs.
//! - A handler that returns `Err` or panics is logged and counted; the
//!   remaining handlers still run and the emitter never sees the failure.
//! - A name disappears from the table once its last handler is removed.
//!
//! # Example
//!
//! ```
//! use overlay_bridge::EventBus;
//! use serde_json::json;
//!
//! let bus = EventBus::new();
//! let sub = bus.on("overlay", |payload| {
//!     println!("got {payload}");
//!     Ok(())
//! });
//!
//! assert_eq!(bus.emit("overlay", &json!({"type": "overlay"})), 1);
//! sub.unsubscribe();
//! assert_eq!(bus.emit("overlay", &json!({"type": "overlay"})), 0);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::error::Error as StdError;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{error, trace, warn};

// ============================================================================
// Types
// ============================================================================

/// Error a handler may return; it is logged and swallowed by the bus.
pub type HandlerError = Box<dyn StdError + Send + Sync>;

/// Return type of event handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// Shared handler callback.
type Handler = Arc<dyn Fn(&Value) -> HandlerResult + Send + Sync>;

/// Unique id of one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub_{}", self.0)
    }
}

/// One registered handler.
struct Entry {
    id: SubscriptionId,
    handler: Handler,
    once: bool,
}

/// Event name → ordered registrations.
#[derive(Default)]
struct Table {
    handlers: FxHashMap<String, Vec<Entry>>,
    next_id: u64,
}

impl Table {
    fn insert(&mut self, event: &str, handler: Handler, once: bool) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;

        self.handlers
            .entry(event.to_string())
            .or_default()
            .push(Entry { id, handler, once });

        id
    }

    /// Removes one registration; returns `true` if it was present.
    fn remove(&mut self, event: &str, id: SubscriptionId) -> bool {
        let Some(entries) = self.handlers.get_mut(event) else {
            return false;
        };

        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        let removed = entries.len() != before;

        if entries.is_empty() {
            self.handlers.remove(event);
        }

        removed
    }
}

// ============================================================================
// EventBus
// ============================================================================

/// Named-event registry with fault-isolated handlers.
///
/// Cloning is cheap; clones share the same table.
#[derive(Clone, Default)]
pub struct EventBus {
    table: Arc<Mutex<Table>>,
    faults: Arc<AtomicU64>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.lock();
        f.debug_struct("EventBus")
            .field("event_count", &table.handlers.len())
            .field("faults", &self.faults.load(Ordering::Relaxed))
            .finish()
    }
}

impl EventBus {
    /// Creates an empty bus.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` at the end of the list for `event`.
    ///
    /// The returned [`Subscription`] removes exactly this registration.
    /// Dropping it does not unsubscribe.
    pub fn on<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&Value) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(event, Arc::new(handler), false)
    }

    /// Registers a handler that runs at most once.
    ///
    /// The registration is removed before the handler is invoked, so a
    /// second emit (even a concurrent one) never reaches it.
    pub fn once<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&Value) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(event, Arc::new(handler), true)
    }

    fn register(&self, event: &str, handler: Handler, once: bool) -> Subscription {
        let id = self.table.lock().insert(event, handler, once);
        trace!(%id, event, once, "Handler registered");

        Subscription {
            table: Arc::downgrade(&self.table),
            event: event.to_string(),
            id,
            active: AtomicBool::new(true),
        }
    }

    /// Invokes every handler registered for `event` with `payload`.
    ///
    /// Returns how many handlers were invoked.
    pub fn emit(&self, event: &str, payload: &Value) -> usize {
        let snapshot: Vec<(SubscriptionId, Handler, bool)> = {
            let table = self.table.lock();
            match table.handlers.get(event) {
                Some(entries) => entries
                    .iter()
                    .map(|entry| (entry.id, Arc::clone(&entry.handler), entry.once))
                    .collect(),
                None => return 0,
            }
        };

        let mut invoked = 0;

        for (id, handler, once) in snapshot {
            if once && !self.table.lock().remove(event, id) {
                continue;
            }

            invoked += 1;
            self.invoke(event, id, &handler, payload);
        }

        invoked
    }

    fn invoke(&self, event: &str, id: SubscriptionId, handler: &Handler, payload: &Value) {
        match catch_unwind(AssertUnwindSafe(|| handler(payload))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.faults.fetch_add(1, Ordering::Relaxed);
                warn!(event, %id, error = %e, "Event handler failed");
            }
            Err(panic) => {
                self.faults.fetch_add(1, Ordering::Relaxed);
                error!(event, %id, panic = panic_message(&*panic), "Event handler panicked");
            }
        }
    }

    /// Returns the number of handlers registered for `event`.
    #[must_use]
    pub fn handler_count(&self, event: &str) -> usize {
        self.table.lock().handlers.get(event).map_or(0, Vec::len)
    }

    /// Returns the names that currently have handlers, sorted.
    #[must_use]
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.table.lock().handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns `true` if no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.lock().handlers.is_empty()
    }

    /// Returns how many handler invocations failed or panicked.
    #[inline]
    #[must_use]
    pub fn faults(&self) -> u64 {
        self.faults.load(Ordering::Relaxed)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Handle to one registration on an [`EventBus`].
///
/// Holds the table weakly, so it never keeps a bus alive.
pub struct Subscription {
    table: Weak<Mutex<Table>>,
    event: String,
    id: SubscriptionId,
    active: AtomicBool,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("id", &self.id)
            .field("active", &self.active.load(Ordering::Relaxed))
            .finish()
    }
}

impl Subscription {
    /// Removes this registration. Calling it again is a no-op.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }

        if let Some(table) = self.table.upgrade()
            && table.lock().remove(&self.event, self.id)
        {
            trace!(id = %self.id, event = %self.event, "Handler unsubscribed");
        }
    }

    /// Returns the event name this subscription listens to.
    #[inline]
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Returns the registration id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }
}

// ============================================================================
// Tests
// ============================================================================
