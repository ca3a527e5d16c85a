//! One-shot signaling primitives for host lifecycle events.
//!
//! A [`OneShot`] is a fire-once event: the readiness and termination
//! signals of a thread host are both instances of it. Setting an already
//! set event is a no-op, and waiting on an already set event returns
//! immediately rather than blocking.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// A single-fire event that threads can block on.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tether_core::OneShot;
///
/// let ready = Arc::new(OneShot::new());
/// let ready_clone = ready.clone();
///
/// let worker = std::thread::spawn(move || {
///     ready_clone.set();
/// });
///
/// ready.wait();
/// assert!(ready.is_set());
/// worker.join().unwrap();
/// ```
pub struct OneShot {
    fired: Mutex<bool>,
    condvar: Condvar,
}

impl OneShot {
    /// Create a new, unfired event.
    pub fn new() -> Self {
        Self {
            fired: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    /// Fire the event, waking all current and future waiters.
    ///
    /// Firing an already fired event has no effect.
    pub fn set(&self) {
        let mut fired = self.fired.lock();
        if !*fired {
            *fired = true;
            self.condvar.notify_all();
        }
    }

    /// Check whether the event has fired.
    pub fn is_set(&self) -> bool {
        *self.fired.lock()
    }

    /// Block the current thread until the event fires.
    ///
    /// Returns immediately if the event has already fired.
    pub fn wait(&self) {
        let mut fired = self.fired.lock();
        while !*fired {
            self.condvar.wait(&mut fired);
        }
    }

    /// Block until the event fires or the timeout elapses.
    ///
    /// Returns `true` if the event fired, `false` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut fired = self.fired.lock();
        if *fired {
            return true;
        }
        self.condvar.wait_for(&mut fired, timeout);
        *fired
    }
}

impl Default for OneShot {
    fn default() -> Self {
        Self::new()
    }
}
