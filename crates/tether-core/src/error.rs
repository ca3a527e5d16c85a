//! Error types for Tether.

use std::any::Any;

/// Result type alias for Tether operations.
pub type Result<T> = std::result::Result<T, TetherError>;

/// Boxed error type accepted from resource builders.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur in the threading core.
///
/// Panics raised by operations executing on an owning thread via a
/// synchronous dispatch are not represented here: they are resumed verbatim
/// on the submitting thread, exactly as if the operation had run locally.
#[derive(Debug, thiserror::Error)]
pub enum TetherError {
    /// The resource builder failed while its host was starting.
    ///
    /// The host thread has already terminated; it never reached the
    /// running state.
    #[error("failed to construct resource for host '{label}': {source}")]
    ConstructionFailed {
        label: String,
        #[source]
        source: BoxError,
    },

    /// The host's dedicated thread could not be spawned.
    #[error("failed to spawn thread for host '{label}': {source}")]
    ThreadSpawn {
        label: String,
        #[source]
        source: std::io::Error,
    },

    /// A submission reached a dispatch context whose owning thread has
    /// already shut down (or shut down before the item could execute).
    #[error("host '{label}' is no longer running")]
    HostUnavailable { label: String },

    /// The resource has no sub-element with the requested name.
    #[error("'{resource}' has no element named '{name}'")]
    ElementNotFound { resource: String, name: String },

    /// The host's message pump cannot be driven from this thread.
    ///
    /// Returned when `run()` or `process_pending()` is called on a host
    /// whose pump belongs to a dedicated thread, or from a thread other
    /// than the owning one.
    #[error("host '{label}' does not pump on this thread")]
    NotPumpThread { label: String },
}

impl TetherError {
    /// Create a construction error.
    pub fn construction(label: impl Into<String>, source: BoxError) -> Self {
        Self::ConstructionFailed {
            label: label.into(),
            source,
        }
    }

    /// Create a host-unavailable error.
    pub fn unavailable(label: impl Into<String>) -> Self {
        Self::HostUnavailable {
            label: label.into(),
        }
    }

    /// Create an element-lookup error.
    pub fn element_not_found(resource: impl Into<String>, name: impl Into<String>) -> Self {
        Self::ElementNotFound {
            resource: resource.into(),
            name: name.into(),
        }
    }

    /// Create a wrong-pump-thread error.
    pub fn not_pump_thread(label: impl Into<String>) -> Self {
        Self::NotPumpThread {
            label: label.into(),
        }
    }
}

/// Extract a readable message from a panic payload.
///
/// Panic payloads are `&str` or `String` in practice; anything else is
/// reported as opaque.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
