//! The observable data context.
//!
//! A [`DataContext`] is a bag of named, dynamically typed properties with
//! change notification: every effective mutation synchronously emits a
//! [`PropertyChanged`] event carrying the property name, on whichever
//! thread performed the mutation. It is the model half of a binding: the
//! [`BindingBridge`](crate::BindingBridge) listens to these events and
//! pushes the resulting updates onto a resource's owning thread.
//!
//! Assigning a value equal to the current one is not a mutation and emits
//! nothing.
//!
//! # Example
//!
//! ```
//! use tether_core::DataContext;
//!
//! let model = DataContext::new();
//! model.set("content", "Line - 1".to_string());
//!
//! let text: Option<String> = model.get("content");
//! assert_eq!(text.as_deref(), Some("Line - 1"));
//!
//! model.on_changed().subscribe(|change| {
//!     println!("{} changed", change.name);
//! });
//! model.set("content", "Line - 2".to_string());
//! ```

use std::any::Any;
use std::collections::HashMap;

use parking_lot::RwLock;

use crate::logging::targets;
use crate::signal::Signal;

/// Notification payload emitted when a property mutates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropertyChanged {
    /// Name of the property that changed.
    pub name: String,
}

/// An observable model object with string-named, dynamically typed
/// properties.
///
/// # Thread Safety
///
/// `DataContext` is `Send + Sync`. Change notifications run synchronously
/// on the mutating thread, after the internal lock has been released, so
/// handlers may freely read the context back.
pub struct DataContext {
    values: RwLock<HashMap<String, Box<dyn Any + Send + Sync>>>,
    changed: Signal<PropertyChanged>,
}

static_assertions::assert_impl_all!(DataContext: Send, Sync);

impl DataContext {
    /// Create an empty data context.
    pub fn new() -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            changed: Signal::new(),
        }
    }

    /// Set a property, notifying subscribers if the value changed.
    ///
    /// The previous value is replaced whether or not its type matches.
    /// No notification is emitted when the new value compares equal to the
    /// current one.
    pub fn set<T>(&self, name: &str, value: T)
    where
        T: Any + Send + Sync + PartialEq,
    {
        let changed = {
            let mut values = self.values.write();
            let unchanged = values
                .get(name)
                .and_then(|existing| existing.downcast_ref::<T>())
                .is_some_and(|existing| *existing == value);
            if !unchanged {
                values.insert(name.to_string(), Box::new(value));
            }
            !unchanged
        };

        if changed {
            tracing::trace!(target: targets::MODEL, property = name, "property changed");
            self.changed.emit(&PropertyChanged {
                name: name.to_string(),
            });
        }
    }

    /// Set a property without notifying subscribers.
    ///
    /// Useful during initialization or batch updates where notifications
    /// are deferred.
    pub fn set_silent<T>(&self, name: &str, value: T)
    where
        T: Any + Send + Sync,
    {
        self.values.write().insert(name.to_string(), Box::new(value));
    }

    /// Get a clone of a property's value.
    ///
    /// Returns `None` if the property does not exist or holds a different
    /// type.
    pub fn get<T>(&self, name: &str) -> Option<T>
    where
        T: Any + Clone,
    {
        let values = self.values.read();
        values.get(name)?.downcast_ref::<T>().cloned()
    }

    /// Check whether a property exists, regardless of type.
    pub fn contains(&self, name: &str) -> bool {
        self.values.read().contains_key(name)
    }

    /// Remove a property. Emits no notification.
    ///
    /// Returns `true` if the property existed.
    pub fn remove(&self, name: &str) -> bool {
        self.values.write().remove(name).is_some()
    }

    /// The change-notification signal.
    ///
    /// Handlers receive [`PropertyChanged`] on the mutating thread.
    pub fn on_changed(&self) -> &Signal<PropertyChanged> {
        &self.changed
    }
}

impl Default for DataContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DataContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let values = self.values.read();
        f.debug_struct("DataContext")
            .field("properties", &values.keys().collect::<Vec<_>>())
            .field("subscribers", &self.changed.subscriber_count())
            .finish()
    }
}
