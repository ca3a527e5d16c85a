//! Thread hosts: dedicated owning threads for thread-affine resources.
//!
//! A [`ThreadHost`] owns exactly one resource and the thread it lives on.
//! The host's thread constructs the resource, signals readiness, and then
//! parks in a message pump, executing invocations submitted through the
//! host's [`DispatchContext`] until the resource requests shutdown.
//!
//! All access to the resource from outside the owning thread goes through
//! a [`HostHandle`], a cheap, cloneable, `Send + Sync` handle whose
//! [`with`](HostHandle::with) method is the thread-affinity guard: on the
//! owning thread it calls straight through; on any other thread it routes
//! the operation through the dispatch context and blocks for the result.
//! There is no other way to reach the resource, so the affinity rule is
//! enforced by construction rather than by convention.
//!
//! # Lifecycle
//!
//! `Starting -> Running -> ShuttingDown -> Terminated`, in order, no
//! skips. A terminated host cannot be restarted. Shutdown is initiated by
//! the resource itself through the [`ShutdownTrigger`] its builder wires
//! into the resource's closure event.
//!
//! # Example
//!
//! ```
//! # fn main() -> Result<(), tether_core::TetherError> {
//! use tether_core::{BoxError, HostOptions, ThreadHost};
//!
//! struct Counter {
//!     value: i32,
//! }
//!
//! let host = ThreadHost::spawn("counter", HostOptions::default(), |_ctx| {
//!     Ok::<_, BoxError>(Counter { value: 0 })
//! })?;
//!
//! // From any thread: executes on the owning thread, blocks for the result.
//! let value = host.with(|counter| {
//!     counter.value += 1;
//!     counter.value
//! })?;
//! assert_eq!(value, 1);
//!
//! host.shutdown_trigger().request();
//! assert!(host.wait_timeout(std::time::Duration::from_secs(1)));
//! # Ok(())
//! # }
//! ```

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, TryRecvError, bounded};
use parking_lot::Mutex;

use crate::affinity::ThreadBound;
use crate::dispatch::{DispatchContext, Envelope};
use crate::error::{BoxError, Result, TetherError, panic_message};
use crate::event::OneShot;
use crate::logging::targets;

/// Lifecycle state of a thread host.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostState {
    /// The owning thread is constructing the resource.
    Starting = 0,
    /// The resource exists and the pump is (or is about to start) draining
    /// invocations.
    Running = 1,
    /// Shutdown has been requested; already queued invocations may still
    /// execute.
    ShuttingDown = 2,
    /// The pump has exited and the resource has been dropped.
    Terminated = 3,
}

impl HostState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Starting,
            1 => Self::Running,
            2 => Self::ShuttingDown,
            _ => Self::Terminated,
        }
    }
}

/// Lifecycle configuration accepted at host creation.
///
/// `show` and `modal` are not interpreted by the core; they are carried
/// to the resource builder through [`HostContext::options`], for the
/// collaborator that actually materializes the resource to honor.
///
/// # Example
///
/// ```
/// use tether_core::HostOptions;
///
/// let options = HostOptions::default()
///     .with_show(false)
///     .with_block(false);
/// assert!(options.own_thread());
/// ```
#[derive(Debug, Clone)]
pub struct HostOptions {
    show: bool,
    modal: bool,
    own_thread: bool,
    attach_thread: bool,
    block: bool,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            show: true,
            modal: false,
            own_thread: true,
            attach_thread: false,
            block: false,
        }
    }
}

impl HostOptions {
    /// Whether the resource should be made visible immediately on
    /// construction.
    pub fn show(&self) -> bool {
        self.show
    }

    /// Whether showing the resource should block sibling input on the same
    /// thread.
    pub fn modal(&self) -> bool {
        self.modal
    }

    /// Whether the resource gets its own dedicated thread (`true`, the
    /// default) or is created on the calling thread.
    pub fn own_thread(&self) -> bool {
        self.own_thread
    }

    /// Whether an already-running ambient loop will drive the host via
    /// [`ThreadHost::process_pending`] instead of [`ThreadHost::run`].
    ///
    /// Only meaningful together with `own_thread(false)`.
    pub fn attach_thread(&self) -> bool {
        self.attach_thread
    }

    /// Whether creation waits for the host to terminate before returning.
    pub fn block(&self) -> bool {
        self.block
    }

    /// Set the `show` flag.
    pub fn with_show(mut self, show: bool) -> Self {
        self.show = show;
        self
    }

    /// Set the `modal` flag.
    pub fn with_modal(mut self, modal: bool) -> Self {
        self.modal = modal;
        self
    }

    /// Set the `own_thread` flag.
    pub fn with_own_thread(mut self, own_thread: bool) -> Self {
        self.own_thread = own_thread;
        self
    }

    /// Set the `attach_thread` flag.
    pub fn with_attach_thread(mut self, attach_thread: bool) -> Self {
        self.attach_thread = attach_thread;
        self
    }

    /// Set the `block` flag.
    pub fn with_block(mut self, block: bool) -> Self {
        self.block = block;
        self
    }
}

/// Non-generic host state shared by handles, triggers, and the pump.
struct HostCore {
    label: String,
    dispatch: DispatchContext,
    state: AtomicU8,
    ready: OneShot,
    terminated: OneShot,
    /// Shutdown was requested before the host reached Running.
    deferred_shutdown: AtomicBool,
}

impl HostCore {
    fn new(label: String, dispatch: DispatchContext) -> Self {
        Self {
            label,
            dispatch,
            state: AtomicU8::new(HostState::Starting as u8),
            ready: OneShot::new(),
            terminated: OneShot::new(),
            deferred_shutdown: AtomicBool::new(false),
        }
    }

    fn state(&self) -> HostState {
        HostState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn try_transition(&self, from: HostState, to: HostState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Mark the host terminated. Runs on failure paths and at pump exit.
    fn mark_terminated(&self) {
        self.state
            .store(HostState::Terminated as u8, Ordering::Release);
        self.terminated.set();
    }
}

/// Requests shutdown of a host's message pump.
///
/// The resource builder receives one through [`HostContext`] and wires it
/// into the resource's closure event; `request()` is how "the window
/// closed" becomes "the pump exits". Invocations already queued still
/// execute; new submissions are rejected.
///
/// Cloneable and callable from any thread. Requesting shutdown more than
/// once, or on a host that never reached Running, is harmless.
#[derive(Clone)]
pub struct ShutdownTrigger {
    core: Arc<HostCore>,
}

static_assertions::assert_impl_all!(ShutdownTrigger: Send, Sync);

impl ShutdownTrigger {
    /// Request that the owning thread's pump exit.
    pub fn request(&self) {
        if self.core.try_transition(HostState::Running, HostState::ShuttingDown) {
            tracing::debug!(target: targets::HOST, host = %self.core.label, "shutdown requested");
            self.core.dispatch.request_shutdown();
            return;
        }
        if self.core.state() == HostState::Starting {
            // The resource closed while still being built; honor the
            // request as soon as the host enters Running.
            self.core.deferred_shutdown.store(true, Ordering::Release);
            if self.core.try_transition(HostState::Running, HostState::ShuttingDown) {
                self.core.dispatch.request_shutdown();
            }
        }
    }
}

/// Context handed to the resource builder on the owning thread.
pub struct HostContext {
    core: Arc<HostCore>,
    options: HostOptions,
}

impl HostContext {
    /// The host's label.
    pub fn label(&self) -> &str {
        &self.core.label
    }

    /// The lifecycle options the host was created with.
    pub fn options(&self) -> &HostOptions {
        &self.options
    }

    /// The dispatch context bound to the owning thread.
    pub fn dispatch(&self) -> &DispatchContext {
        &self.core.dispatch
    }

    /// A trigger the resource should invoke from its closure event.
    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        ShutdownTrigger {
            core: self.core.clone(),
        }
    }
}

/// State shared between the host, its handles, and its pump.
struct HostShared<R: 'static> {
    core: Arc<HostCore>,
    bound: ThreadBound<R>,
}

/// The receiving half of a host's queue, owned by whichever thread pumps.
///
/// Dropping the driver disconnects the queue: anything still queued is
/// dropped unexecuted, which is what releases `send` callers with
/// `HostUnavailable` instead of leaving them parked.
struct PumpDriver<R: 'static> {
    receiver: Receiver<Envelope>,
    shared: Arc<HostShared<R>>,
}

impl<R: 'static> PumpDriver<R> {
    /// Pump until shutdown. Blocks while the queue is empty.
    fn run(self) {
        debug_assert!(self.shared.core.dispatch.is_owner());
        tracing::debug!(target: targets::HOST, host = %self.shared.core.label, "message pump started");
        while let Ok(envelope) = self.receiver.recv() {
            if !self.shared.core.dispatch.run_one(envelope) {
                break;
            }
        }
        self.finish();
    }

    /// Drain without blocking. Returns the driver back unless shutdown was
    /// reached.
    fn drain(self) -> Option<Self> {
        debug_assert!(self.shared.core.dispatch.is_owner());
        loop {
            match self.receiver.try_recv() {
                Ok(envelope) => {
                    if !self.shared.core.dispatch.run_one(envelope) {
                        self.finish();
                        return None;
                    }
                }
                Err(TryRecvError::Empty) => return Some(self),
                Err(TryRecvError::Disconnected) => {
                    self.finish();
                    return None;
                }
            }
        }
    }

    fn finish(self) {
        // The resource is dropped here, on its owning thread, before the
        // receiver disconnects the queue.
        drop(self.shared.bound.take());
        self.shared.core.mark_terminated();
        tracing::debug!(target: targets::HOST, host = %self.shared.core.label, "message pump stopped");
    }
}

/// A host that owns one resource and the thread it lives on.
///
/// Created with [`ThreadHost::spawn`]. The host object stays inspectable
/// after termination: [`state`](Self::state), [`join`](Self::join) and
/// [`wait_timeout`](Self::wait_timeout) all keep working.
///
/// Dropping the host requests shutdown (without waiting for it); keep it
/// alive, or `join` it, for as long as the resource should run.
pub struct ThreadHost<R: 'static> {
    shared: Arc<HostShared<R>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    /// Present only for hosts created on the calling thread; the pump then
    /// belongs to whoever calls `run()` or `process_pending()`.
    driver: Mutex<Option<PumpDriver<R>>>,
}

static_assertions::assert_impl_all!(ThreadHost<std::rc::Rc<()>>: Send, Sync);

impl<R: 'static> ThreadHost<R> {
    /// Create a host for the resource produced by `builder`.
    ///
    /// With `own_thread` set (the default) a dedicated thread is started;
    /// on it, the host establishes the dispatch context, invokes `builder`,
    /// signals readiness, and parks in the message pump. `spawn` blocks
    /// until readiness: when it returns, the resource exists and is
    /// addressable. With `block` also set, `spawn` waits for the host to
    /// terminate before returning.
    ///
    /// With `own_thread` cleared, the resource is built on the calling
    /// thread, which becomes the owning thread; drive the pump with
    /// [`run`](Self::run), or with [`process_pending`](Self::process_pending)
    /// from an ambient loop when `attach_thread` is set.
    ///
    /// # Errors
    ///
    /// [`TetherError::ConstructionFailed`] if `builder` returned an error
    /// or panicked; the host thread has already terminated and never
    /// reached Running. [`TetherError::ThreadSpawn`] if the dedicated
    /// thread could not be started.
    pub fn spawn<F, E>(label: impl Into<String>, options: HostOptions, builder: F) -> Result<Self>
    where
        F: FnOnce(&HostContext) -> std::result::Result<R, E> + Send + 'static,
        E: Into<BoxError>,
    {
        let label = label.into();
        if options.own_thread {
            Self::spawn_dedicated(label, options, builder)
        } else {
            Self::create_on_current_thread(label, options, builder)
        }
    }

    fn spawn_dedicated<F, E>(label: String, options: HostOptions, builder: F) -> Result<Self>
    where
        F: FnOnce(&HostContext) -> std::result::Result<R, E> + Send + 'static,
        E: Into<BoxError>,
    {
        let (handoff_sender, handoff_receiver) = bounded(1);
        let thread_label = label.clone();
        let thread_options = options.clone();
        let handle = thread::Builder::new()
            .name(label.clone())
            .spawn(move || host_thread_main(thread_label, thread_options, builder, handoff_sender))
            .map_err(|source| TetherError::ThreadSpawn {
                label: label.clone(),
                source,
            })?;

        // Blocks until the owning thread has signaled readiness (or died
        // trying to build the resource).
        let shared = match handoff_receiver.recv() {
            Ok(Ok(shared)) => shared,
            Ok(Err(err)) => {
                let _ = handle.join();
                return Err(err);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(TetherError::construction(
                    &label,
                    "host thread exited before signaling readiness".into(),
                ));
            }
        };

        let host = Self {
            shared,
            thread: Mutex::new(Some(handle)),
            driver: Mutex::new(None),
        };
        if options.block {
            host.join();
        }
        Ok(host)
    }

    fn create_on_current_thread<F, E>(label: String, options: HostOptions, builder: F) -> Result<Self>
    where
        F: FnOnce(&HostContext) -> std::result::Result<R, E>,
        E: Into<BoxError>,
    {
        let (dispatch, receiver) = DispatchContext::new(label.clone());
        let core = Arc::new(HostCore::new(label, dispatch));
        let shared = Arc::new(HostShared {
            core: core.clone(),
            bound: ThreadBound::new(),
        });
        let context = HostContext {
            core: core.clone(),
            options: options.clone(),
        };

        let resource = match run_builder(builder, &context) {
            Ok(resource) => resource,
            Err(err) => {
                core.ready.set();
                core.dispatch.request_shutdown();
                core.mark_terminated();
                return Err(err);
            }
        };
        shared.bound.install(resource);
        core.try_transition(HostState::Starting, HostState::Running);
        core.ready.set();
        if core.deferred_shutdown.load(Ordering::Acquire) {
            context.shutdown_trigger().request();
        }

        let driver = PumpDriver {
            receiver,
            shared: shared.clone(),
        };
        let host = Self {
            shared,
            thread: Mutex::new(None),
            driver: Mutex::new(Some(driver)),
        };
        if options.block {
            host.run()?;
        }
        Ok(host)
    }

    /// The host's label.
    pub fn label(&self) -> &str {
        &self.shared.core.label
    }

    /// Current lifecycle state.
    pub fn state(&self) -> HostState {
        self.shared.core.state()
    }

    /// Check if the host is in the Running state.
    pub fn is_running(&self) -> bool {
        self.state() == HostState::Running
    }

    /// The dispatch context bound to this host's owning thread.
    pub fn dispatch(&self) -> &DispatchContext {
        &self.shared.core.dispatch
    }

    /// A trigger that requests shutdown of this host.
    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        ShutdownTrigger {
            core: self.shared.core.clone(),
        }
    }

    /// A cloneable, `Send + Sync` handle for guarded access to the
    /// resource.
    pub fn handle(&self) -> HostHandle<R> {
        HostHandle {
            shared: self.shared.clone(),
        }
    }

    /// Guarded access to the resource; see [`HostHandle::with`].
    pub fn with<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut R) -> T + Send + 'static,
        T: Send + 'static,
    {
        self.handle().with(f)
    }

    /// Fire-and-forget access to the resource; see [`HostHandle::post`].
    pub fn post<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut R) + Send + 'static,
    {
        self.handle().post(f)
    }

    /// Drive the pump on the calling thread until shutdown.
    ///
    /// Only valid for hosts created with `own_thread(false)`, from their
    /// owning thread, once.
    pub fn run(&self) -> Result<()> {
        let Some(driver) = self.driver.lock().take() else {
            return Err(TetherError::not_pump_thread(self.label()));
        };
        if !self.shared.core.dispatch.is_owner() {
            *self.driver.lock() = Some(driver);
            return Err(TetherError::not_pump_thread(self.label()));
        }
        driver.run();
        Ok(())
    }

    /// Execute everything currently queued, without blocking.
    ///
    /// For hosts driven by an ambient loop (`attach_thread`). Returns
    /// `Ok(false)` once the host has shut down and the pump is gone.
    /// Re-entrant calls fail with [`TetherError::NotPumpThread`]: the pump
    /// is already being driven further up the stack.
    pub fn process_pending(&self) -> Result<bool> {
        let Some(driver) = self.driver.lock().take() else {
            if self.state() == HostState::Terminated {
                return Ok(false);
            }
            return Err(TetherError::not_pump_thread(self.label()));
        };
        if !self.shared.core.dispatch.is_owner() {
            *self.driver.lock() = Some(driver);
            return Err(TetherError::not_pump_thread(self.label()));
        }
        match driver.drain() {
            Some(driver) => {
                *self.driver.lock() = Some(driver);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Wait for the owning thread to finish.
    ///
    /// Returns `true` if the thread was joined by this call; `false` if it
    /// was already joined or the host has no dedicated thread.
    pub fn join(&self) -> bool {
        let handle = self.thread.lock().take();
        match handle {
            Some(handle) => handle.join().is_ok(),
            None => false,
        }
    }

    /// Wait for termination with a timeout.
    ///
    /// Returns `true` if the host terminated within the timeout. Safe to
    /// call repeatedly and after termination.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.shared.core.terminated.wait_timeout(timeout)
    }
}

impl<R: 'static> Drop for ThreadHost<R> {
    fn drop(&mut self) {
        // Request shutdown, never block in drop.
        self.shutdown_trigger().request();
    }
}

impl<R: 'static> std::fmt::Debug for ThreadHost<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadHost")
            .field("label", &self.label())
            .field("state", &self.state())
            .finish()
    }
}

/// Guarded access to a host's resource from any thread.
///
/// `HostHandle` is the thread-affinity guard: every call compares the
/// current thread to the owning thread and either executes directly or
/// routes through the host's dispatch context. Handles are cheap to clone
/// and do not keep the host running, only its bookkeeping alive.
pub struct HostHandle<R: 'static> {
    shared: Arc<HostShared<R>>,
}

static_assertions::assert_impl_all!(HostHandle<std::rc::Rc<()>>: Send, Sync);

impl<R: 'static> HostHandle<R> {
    /// The host's label.
    pub fn label(&self) -> &str {
        &self.shared.core.label
    }

    /// Current lifecycle state of the host.
    pub fn state(&self) -> HostState {
        self.shared.core.state()
    }

    /// The dispatch context bound to the owning thread.
    pub fn dispatch(&self) -> &DispatchContext {
        &self.shared.core.dispatch
    }

    /// Execute `f` against the resource on its owning thread, blocking for
    /// the result.
    ///
    /// On the owning thread, `f` runs directly. From any other thread the
    /// call blocks until the owning thread has executed it; the result,
    /// including a panic, surfaces exactly as if the call had run
    /// locally.
    ///
    /// # Errors
    ///
    /// [`TetherError::HostUnavailable`] if the host has shut down.
    pub fn with<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut R) -> T + Send + 'static,
        T: Send + 'static,
    {
        let core = &self.shared.core;
        if core.dispatch.is_owner() {
            return self
                .shared
                .bound
                .with_mut(f)
                .ok_or_else(|| TetherError::unavailable(&core.label));
        }
        let shared = self.shared.clone();
        let outcome = core.dispatch.send(move || shared.bound.with_mut(f))?;
        outcome.ok_or_else(|| TetherError::unavailable(&core.label))
    }

    /// Queue `f` to run against the resource and return immediately.
    ///
    /// Errors and panics inside `f` are not reported back; the owning
    /// thread logs them.
    ///
    /// # Errors
    ///
    /// [`TetherError::HostUnavailable`] if the host has shut down.
    pub fn post<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut R) + Send + 'static,
    {
        let shared = self.shared.clone();
        self.shared.core.dispatch.post(move || {
            if shared.bound.with_mut(f).is_none() {
                tracing::warn!(
                    target: targets::HOST,
                    host = %shared.core.label,
                    "posted operation dropped: resource already shut down"
                );
            }
        })
    }
}

impl<R: 'static> Clone for HostHandle<R> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<R: 'static> std::fmt::Debug for HostHandle<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostHandle")
            .field("label", &self.label())
            .field("state", &self.state())
            .finish()
    }
}

/// Entry point of a dedicated host thread.
fn host_thread_main<R, F, E>(
    label: String,
    options: HostOptions,
    builder: F,
    handoff: crossbeam_channel::Sender<Result<Arc<HostShared<R>>>>,
) where
    R: 'static,
    F: FnOnce(&HostContext) -> std::result::Result<R, E>,
    E: Into<BoxError>,
{
    let (dispatch, receiver) = DispatchContext::new(label.clone());
    let core = Arc::new(HostCore::new(label, dispatch));
    let shared = Arc::new(HostShared {
        core: core.clone(),
        bound: ThreadBound::new(),
    });
    let context = HostContext {
        core: core.clone(),
        options,
    };

    match run_builder(builder, &context) {
        Ok(resource) => {
            shared.bound.install(resource);
            core.try_transition(HostState::Starting, HostState::Running);
            // Readiness fires after the resource exists and before the
            // creating call unblocks.
            core.ready.set();
            tracing::debug!(target: targets::HOST, host = %core.label, "host running");
            if core.deferred_shutdown.load(Ordering::Acquire) {
                context.shutdown_trigger().request();
            }
            let driver = PumpDriver {
                receiver,
                shared: shared.clone(),
            };
            if handoff.send(Ok(shared)).is_err() {
                tracing::warn!(
                    target: targets::HOST,
                    host = %core.label,
                    "host creator vanished before adopting the host; shutting down"
                );
                context.shutdown_trigger().request();
            }
            driver.run();
        }
        Err(err) => {
            // Readiness still fires so the creating call unblocks; the
            // error travels back instead of a host.
            core.ready.set();
            core.dispatch.request_shutdown();
            core.mark_terminated();
            let _ = handoff.send(Err(err));
            // Dropping the receiver rejects anything already queued.
        }
    }
}

/// Run the builder, converting errors and panics into `ConstructionFailed`.
fn run_builder<R, F, E>(builder: F, context: &HostContext) -> Result<R>
where
    F: FnOnce(&HostContext) -> std::result::Result<R, E>,
    E: Into<BoxError>,
{
    match catch_unwind(AssertUnwindSafe(|| builder(context))) {
        Ok(Ok(resource)) => Ok(resource),
        Ok(Err(err)) => Err(TetherError::construction(context.label(), err.into())),
        Err(payload) => Err(TetherError::construction(
            context.label(),
            panic_message(payload.as_ref()).into(),
        )),
    }
}
