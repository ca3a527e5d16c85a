//! Synchronous change-notification signals.
//!
//! A [`Signal`] is a minimal observer list: subscribers are invoked in
//! place, on whichever thread emits, in subscription order. Cross-thread
//! delivery is deliberately not this type's job: code that needs a
//! handler to run on a resource's owning thread routes the handler body
//! through that host's dispatch context (as the binding bridge does),
//! keeping all thread marshaling behind one narrow interface.
//!
//! Handlers run outside the subscriber lock, so a handler may subscribe,
//! unsubscribe, or trigger a nested emission of the same signal without
//! deadlocking.
//!
//! # Example
//!
//! ```
//! use tether_core::Signal;
//!
//! let text_changed = Signal::<String>::new();
//!
//! let id = text_changed.subscribe(|text| {
//!     println!("text changed to: {text}");
//! });
//!
//! text_changed.emit(&"hello".to_string());
//! text_changed.unsubscribe(id);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::logging::targets;

new_key_type! {
    /// A unique identifier for a signal subscription.
    ///
    /// Returned by [`Signal::subscribe`]; pass it to
    /// [`Signal::unsubscribe`] to remove the handler again.
    pub struct SubscriberId;
}

/// A synchronous multi-subscriber notification signal.
///
/// # Type Parameter
///
/// - `Args`: the argument type passed by reference to each handler. Use
///   `()` for signals that carry no payload.
///
/// # Thread Safety
///
/// `Signal<Args>` is `Send + Sync`; any thread may subscribe or emit.
/// Handlers execute on the emitting thread.
pub struct Signal<Args> {
    subscribers: Mutex<SlotMap<SubscriberId, Arc<dyn Fn(&Args) + Send + Sync>>>,
    /// Whether emission is temporarily suppressed.
    blocked: AtomicBool,
}

impl<Args> Signal<Args> {
    /// Create a new signal with no subscribers.
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(SlotMap::with_key()),
            blocked: AtomicBool::new(false),
        }
    }

    /// Subscribe a handler, returning its ID.
    pub fn subscribe<F>(&self, handler: F) -> SubscriberId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.subscribers.lock().insert(Arc::new(handler))
    }

    /// Remove a handler by ID.
    ///
    /// Returns `true` if the subscription existed.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.subscribers.lock().remove(id).is_some()
    }

    /// Remove all handlers.
    pub fn unsubscribe_all(&self) {
        self.subscribers.lock().clear();
    }

    /// Number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Suppress or restore emission.
    ///
    /// While blocked, `emit` does nothing. Useful during batch updates to
    /// avoid cascading notifications.
    pub fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::SeqCst);
    }

    /// Check if emission is currently suppressed.
    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }

    /// Invoke every subscribed handler with `args`, on the current thread.
    ///
    /// The subscriber list is snapshotted first and handlers run without
    /// the lock held: a handler that mutates subscriptions (or re-emits)
    /// affects later emissions, not the one in flight.
    pub fn emit(&self, args: &Args) {
        if self.is_blocked() {
            tracing::trace!(target: targets::SIGNAL, "signal blocked, skipping emit");
            return;
        }

        let handlers: Vec<_> = self.subscribers.lock().values().cloned().collect();
        tracing::trace!(
            target: targets::SIGNAL,
            subscriber_count = handlers.len(),
            "emitting signal"
        );
        for handler in handlers {
            handler(args);
        }
    }
}

impl<Args> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

// Signal is shareable regardless of Args: handlers only ever receive
// &Args on the emitting thread.
unsafe impl<Args> Send for Signal<Args> {}
unsafe impl<Args> Sync for Signal<Args> {}
