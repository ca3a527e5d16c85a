//! The dispatch context: a thread-safe invocation queue bound to one
//! owning thread.
//!
//! A [`DispatchContext`] is created on a host's owning thread and handed
//! out freely to every other thread. It offers two submission modes:
//!
//! - [`send`](DispatchContext::send): synchronous. Blocks the calling
//!   thread until the item has executed on the owning thread and returns
//!   its result; a panic inside the item is resumed on the caller, exactly
//!   as if the call had run locally. Called from the owning thread itself,
//!   the item executes inline without touching the queue.
//! - [`post`](DispatchContext::post): asynchronous, fire-and-forget.
//!   Returns as soon as the item is queued. No completion or error channel
//!   exists back to the submitter: a panic inside posted work is caught by
//!   the pump, logged, and the pump keeps going.
//!
//! Items execute strictly in submission order; both modes share one FIFO
//! queue. Once the owning thread has shut down, submission fails fast with
//! [`TetherError::HostUnavailable`], including the race where an item was
//! queued but the pump exited before reaching it (the item is dropped
//! unexecuted and the blocked `send` caller is released with the error).
//!
//! # Example
//!
//! ```ignore
//! // A DispatchContext is obtained from a running host:
//! let dispatch = host.dispatch().clone();
//!
//! std::thread::spawn(move || {
//!     // Runs on the owning thread; this thread blocks for the result.
//!     let title = dispatch.send(|| current_title()).unwrap();
//!
//!     // Queued and forgotten.
//!     dispatch.post(|| refresh_caches()).unwrap();
//! });
//! ```

use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::ThreadId;

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};

use crate::affinity::ThreadAffinity;
use crate::error::{Result, TetherError, panic_message};
use crate::logging::targets;

/// A unit of work waiting to execute on the owning thread.
///
/// Type-erased: synchronous submissions wrap their result transport inside
/// the closure, so the pump treats every invocation identically.
pub(crate) struct PendingInvocation {
    invoke: Box<dyn FnOnce() + Send>,
}

impl PendingInvocation {
    fn new<F>(invoke: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            invoke: Box::new(invoke),
        }
    }

    fn execute(self) {
        (self.invoke)();
    }
}

/// Messages understood by the message pump.
pub(crate) enum Envelope {
    Invoke(PendingInvocation),
    Shutdown,
}

struct DispatchShared {
    /// Label of the owning host, for diagnostics and errors.
    label: String,
    /// The owning thread.
    owner: ThreadAffinity,
    /// FIFO queue feeding the pump.
    sender: Sender<Envelope>,
    /// Set once shutdown has been requested; submissions are rejected from
    /// that point on.
    closed: AtomicBool,
}

/// A thread-safe invocation queue bound to exactly one owning thread.
///
/// Cloning is cheap and shares the same queue. The context is `Send + Sync`
/// and may be used from any thread, including the owning thread itself.
#[derive(Clone)]
pub struct DispatchContext {
    inner: Arc<DispatchShared>,
}

static_assertions::assert_impl_all!(DispatchContext: Send, Sync);

impl DispatchContext {
    /// Create a context bound to the current thread, returning the receiver
    /// end that the owning thread's pump will drain.
    pub(crate) fn new(label: String) -> (Self, Receiver<Envelope>) {
        let (sender, receiver) = unbounded();
        let context = Self {
            inner: Arc::new(DispatchShared {
                label,
                owner: ThreadAffinity::current(),
                sender,
                closed: AtomicBool::new(false),
            }),
        };
        (context, receiver)
    }

    /// The label of the host this context belongs to.
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// The ID of the owning thread.
    pub fn owner_thread(&self) -> ThreadId {
        self.inner.owner.thread_id()
    }

    /// Check if the calling thread is the owning thread.
    #[inline]
    pub fn is_owner(&self) -> bool {
        self.inner.owner.is_same_thread()
    }

    /// Check if shutdown has been requested for the owning thread.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Number of queued invocations not yet picked up by the pump.
    pub fn pending_count(&self) -> usize {
        self.inner.sender.len()
    }

    /// Execute `f` on the owning thread and block until it has run,
    /// returning its result.
    ///
    /// On the owning thread, `f` executes inline. From any other thread the
    /// item is queued and the caller parks until the pump has executed it.
    /// A panic inside `f` is resumed on the calling thread.
    ///
    /// # Errors
    ///
    /// [`TetherError::HostUnavailable`] if the owning thread has already
    /// shut down, or shuts down before the item executes. The caller is
    /// never left blocked.
    pub fn send<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.is_closed() {
            return Err(TetherError::unavailable(&self.inner.label));
        }
        if self.is_owner() {
            return Ok(f());
        }

        let (result_sender, result_receiver) = bounded(1);
        let invocation = PendingInvocation::new(move || {
            let outcome = catch_unwind(AssertUnwindSafe(f));
            let _ = result_sender.send(outcome);
        });
        self.enqueue(invocation)?;

        // A dropped sender means the pump exited before reaching the item;
        // the invocation was never executed.
        match result_receiver.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => resume_unwind(payload),
            Err(_) => Err(TetherError::unavailable(&self.inner.label)),
        }
    }

    /// Queue `f` for execution on the owning thread and return immediately.
    ///
    /// Execution errors are never reported back: a panic inside `f` is
    /// caught and logged by the pump. Posted from the owning thread, the
    /// item is still queued rather than run inline, preserving submission
    /// order.
    ///
    /// # Errors
    ///
    /// [`TetherError::HostUnavailable`] if the owning thread has already
    /// shut down.
    pub fn post<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_closed() {
            return Err(TetherError::unavailable(&self.inner.label));
        }
        self.enqueue(PendingInvocation::new(f))
    }

    /// Mark the context closed and wake the pump so it can exit.
    ///
    /// Items queued before the shutdown marker still execute; later
    /// submissions are rejected.
    pub(crate) fn request_shutdown(&self) {
        self.inner.closed.store(true, Ordering::Release);
        // Ignore a disconnect: the pump already exited.
        let _ = self.inner.sender.send(Envelope::Shutdown);
    }

    /// Execute one envelope on the owning thread. Returns `false` when the
    /// pump should exit.
    pub(crate) fn run_one(&self, envelope: Envelope) -> bool {
        match envelope {
            Envelope::Invoke(invocation) => {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| invocation.execute())) {
                    // Synchronous items catch their own panics and carry
                    // them back to the submitter; only posted work lands
                    // here. There is no channel to report it on.
                    tracing::error!(
                        target: targets::DISPATCH,
                        host = %self.inner.label,
                        "posted invocation panicked on owning thread: {}",
                        panic_message(payload.as_ref())
                    );
                }
                true
            }
            Envelope::Shutdown => false,
        }
    }

    fn enqueue(&self, invocation: PendingInvocation) -> Result<()> {
        self.inner
            .sender
            .send(Envelope::Invoke(invocation))
            .map_err(|_| TetherError::unavailable(&self.inner.label))
    }
}

impl std::fmt::Debug for DispatchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchContext")
            .field("label", &self.inner.label)
            .field("owner", &self.inner.owner.thread_id())
            .field("closed", &self.is_closed())
            .field("pending", &self.pending_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::thread;
    use std::time::Duration;

    /// Spin up a context with a plain pump thread behind it.
    fn pumped_context(label: &str) -> (DispatchContext, thread::JoinHandle<()>) {
        let (context_sender, context_receiver) = bounded(1);
        let label = label.to_string();
        let handle = thread::spawn(move || {
            let (context, receiver) = DispatchContext::new(label);
            context_sender.send(context.clone()).unwrap();
            while let Ok(envelope) = receiver.recv() {
                if !context.run_one(envelope) {
                    break;
                }
            }
        });
        (context_receiver.recv().unwrap(), handle)
    }

    #[test]
    fn test_send_returns_result_from_owner_thread() {
        let (context, pump) = pumped_context("send-result");
        let owner = context.owner_thread();

        let ran_on = context.send(move || thread::current().id()).unwrap();
        assert_eq!(ran_on, owner);
        assert_ne!(ran_on, thread::current().id());

        context.request_shutdown();
        pump.join().unwrap();
    }

    #[test]
    fn test_send_inline_when_already_owner() {
        let (context, _receiver) = DispatchContext::new("inline".to_string());
        // No pump is running; an inline call must not need one.
        let value = context.send(|| 41 + 1).unwrap();
        assert_eq!(value, 42);
        assert_eq!(context.pending_count(), 0);
    }

    #[test]
    fn test_send_propagates_panic_to_caller() {
        let (context, pump) = pumped_context("send-panic");

        let result = catch_unwind(AssertUnwindSafe(|| {
            let _: Result<()> = context.send(|| panic!("exploded remotely"));
        }));
        assert!(result.is_err(), "panic should resume on the caller");

        // The pump survives a panicking synchronous item.
        assert_eq!(context.send(|| 7).unwrap(), 7);

        context.request_shutdown();
        pump.join().unwrap();
    }

    #[test]
    fn test_post_returns_before_execution() {
        let (context, pump) = pumped_context("post-async");
        let release = Arc::new(crate::event::OneShot::new());
        let done = Arc::new(crate::event::OneShot::new());

        let release_clone = release.clone();
        let done_clone = done.clone();
        context
            .post(move || {
                release_clone.wait();
                done_clone.set();
            })
            .unwrap();

        // If post waited for execution, we would have deadlocked above:
        // the item blocks until we release it from here.
        release.set();
        done.wait();

        context.request_shutdown();
        pump.join().unwrap();
    }

    #[test]
    fn test_post_panic_does_not_kill_pump() {
        let (context, pump) = pumped_context("post-panic");

        context.post(|| panic!("lost to the void")).unwrap();
        // The pump logged the panic and kept going.
        assert_eq!(context.send(|| "alive").unwrap(), "alive");

        context.request_shutdown();
        pump.join().unwrap();
    }

    #[test]
    fn test_submission_order_is_preserved() {
        let (context, pump) = pumped_context("ordering");
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10 {
            let order_clone = order.clone();
            context.post(move || order_clone.lock().push(i)).unwrap();
        }
        // A sync send behind the posts observes all of them.
        let seen = {
            let order_clone = order.clone();
            context.send(move || order_clone.lock().len()).unwrap()
        };
        assert_eq!(seen, 10);
        assert_eq!(*order.lock(), (0..10).collect::<Vec<_>>());

        context.request_shutdown();
        pump.join().unwrap();
    }

    #[test]
    fn test_submission_after_shutdown_fails_fast() {
        let (context, pump) = pumped_context("closed");
        context.request_shutdown();
        pump.join().unwrap();

        let send_result: Result<i32> = context.send(|| 1);
        assert!(matches!(
            send_result,
            Err(TetherError::HostUnavailable { .. })
        ));
        assert!(matches!(
            context.post(|| {}),
            Err(TetherError::HostUnavailable { .. })
        ));
    }

    #[test]
    fn test_sender_unblocked_when_pump_exits_early() {
        // An item that is queued but never executed must release its
        // sender with HostUnavailable, not leave it parked forever.
        let (context_sender, context_receiver) = bounded(1);
        let pump = thread::spawn(move || {
            let (context, receiver) = DispatchContext::new("early-exit".to_string());
            context_sender.send(context).unwrap();
            // Exit without ever draining; dropping the receiver rejects
            // everything in flight.
            thread::sleep(Duration::from_millis(30));
            drop(receiver);
        });
        let context: DispatchContext = context_receiver.recv().unwrap();

        let result: Result<i32> = context.send(|| 5);
        assert!(matches!(result, Err(TetherError::HostUnavailable { .. })));
        pump.join().unwrap();
    }

    #[test]
    fn test_pending_count_tracks_queue() {
        let (context, _receiver) = DispatchContext::new("pending".to_string());
        // Without a pump, posted items pile up.
        let other = {
            let context = context.clone();
            thread::spawn(move || {
                context.post(|| {}).unwrap();
                context.post(|| {}).unwrap();
            })
        };
        other.join().unwrap();
        assert_eq!(context.pending_count(), 2);
    }
}
