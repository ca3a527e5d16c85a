//! Logging facilities for Tether.
//!
//! Tether uses the `tracing` crate for instrumentation. To see logs,
//! install a tracing subscriber in your application:
//!
//! ```ignore
//! use tracing_subscriber;
//!
//! fn main() {
//!     tracing_subscriber::fmt::init();
//!
//!     // Your application code...
//! }
//! ```
//!
//! Of note: panics raised by asynchronously posted work are not delivered
//! back to the submitter. They surface only here, as `error!` events on the
//! [`targets::DISPATCH`] target, so a subscriber is the only way to observe
//! them.

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core framework target.
    pub const CORE: &str = "tether_core";
    /// Dispatch context and message pump target.
    pub const DISPATCH: &str = "tether_core::dispatch";
    /// Thread host lifecycle target.
    pub const HOST: &str = "tether_core::host";
    /// Change-notification signal target.
    pub const SIGNAL: &str = "tether_core::signal";
    /// Data context target.
    pub const MODEL: &str = "tether_core::model";
    /// Binding bridge target.
    pub const BINDING: &str = "tether_core::binding";
}
