//! Core systems for Tether.
//!
//! This crate is a cross-thread affinity and invocation layer for objects
//! that must live on, and only be touched from, one designated owning
//! thread (a loaded window, a single-threaded native handle, anything
//! `!Send`) while being freely called from arbitrary other threads:
//!
//! - **Thread Host**: a dedicated thread that constructs the owned
//!   resource, signals readiness, and runs a message pump for its lifetime
//! - **Dispatch Context**: the thread-safe invocation queue bound to that
//!   thread, with synchronous (blocking, result- and panic-propagating)
//!   and asynchronous (fire-and-forget) submission
//! - **Affinity Guard**: [`HostHandle::with`] compares the calling thread
//!   to the owning thread and either calls straight through or marshals
//!   the operation across; the only sanctioned way to touch the resource
//! - **Element Resolution**: logical names resolved against the resource's
//!   named sub-elements, uncached, via [`ElementSource`]
//! - **Binding Bridge**: change notifications from an observable
//!   [`DataContext`] replayed onto the owning thread, with an exclusion
//!   rule that keeps the bridge from re-triggering itself
//!
//! # Hosting a thread-affine resource
//!
//! ```
//! # fn main() -> Result<(), tether_core::TetherError> {
//! use tether_core::{BoxError, HostOptions, ThreadHost};
//!
//! struct Console {
//!     lines: Vec<String>,
//! }
//!
//! let host = ThreadHost::spawn("console", HostOptions::default(), |ctx| {
//!     // A real builder would load the resource from a description here
//!     // and wire ctx.shutdown_trigger() into its closure event.
//!     let _ = ctx.options().show();
//!     Ok::<_, BoxError>(Console { lines: Vec::new() })
//! })?;
//!
//! let handle = host.handle();
//! std::thread::spawn(move || {
//!     // Executes on the owning thread; this thread blocks for the result.
//!     handle
//!         .with(|console| console.lines.push("hello".to_string()))
//!         .unwrap();
//! })
//! .join()
//! .unwrap();
//!
//! assert_eq!(host.with(|console| console.lines.len())?, 1);
//! host.shutdown_trigger().request();
//! # Ok(())
//! # }
//! ```
//!
//! # Binding a data model
//!
//! ```
//! # fn main() -> Result<(), tether_core::TetherError> {
//! use std::sync::Arc;
//! use tether_core::{BindingBridge, BoxError, DataContext, HostOptions, ThreadHost};
//!
//! struct Banner {
//!     text: String,
//! }
//!
//! let host = ThreadHost::spawn("banner", HostOptions::default(), |_ctx| {
//!     Ok::<_, BoxError>(Banner {
//!         text: String::new(),
//!     })
//! })?;
//! let model = Arc::new(DataContext::new());
//!
//! let _bridge = BindingBridge::attach(&host.handle(), &model, "label", |banner, model, name| {
//!     if let Some(value) = model.get::<String>(name) {
//!         banner.text = value;
//!     }
//! });
//!
//! model.set("headline", "breaking".to_string());
//! assert_eq!(host.with(|banner| banner.text.clone())?, "breaking");
//! host.shutdown_trigger().request();
//! # Ok(())
//! # }
//! ```

mod affinity;
mod binding;
mod dispatch;
mod element;
mod error;
mod event;
mod host;
pub mod logging;
mod model;
mod signal;

pub use affinity::ThreadAffinity;
pub use binding::BindingBridge;
pub use dispatch::DispatchContext;
pub use element::{ElementHandle, ElementSource};
pub use error::{BoxError, Result, TetherError};
pub use event::OneShot;
pub use host::{
    HostContext, HostHandle, HostOptions, HostState, ShutdownTrigger, ThreadHost,
};
pub use model::{DataContext, PropertyChanged};
pub use signal::{Signal, SubscriberId};
