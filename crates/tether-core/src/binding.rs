//! The binding bridge: data-model changes pushed onto the owning thread.
//!
//! A [`BindingBridge`] subscribes a reaction to a [`DataContext`]'s change
//! notifications. Whatever thread mutates the model, the reaction executes
//! on the hosted resource's owning thread with exclusive access to the
//! resource, and may read the model and write derived values back into it
//! (typically into a property bound to a display control).
//!
//! Two rules keep notification cascades in check:
//!
//! - **Echo exclusion**: notifications for the designated echo property
//!   (the one the reaction itself writes diagnostic/echo text into) never
//!   invoke the reaction, so reacting to a change cannot re-trigger
//!   itself.
//! - **Deferred re-entry**: a notification raised *from* the owning thread
//!   (a reaction writing some other, non-echo property) queues the next
//!   reaction behind the current one instead of nesting it, preserving the
//!   resource's exclusive-access guarantee. Chains between non-echo
//!   properties are otherwise not prevented; bounding them is up to
//!   whoever wires the bindings.
//!
//! Mutations from any other thread run the reaction through the blocking
//! path of the affinity guard: when the mutating call returns, the
//! resource already reflects the change.
//!
//! The bridge unsubscribes when dropped.

use std::sync::Arc;

use crate::host::HostHandle;
use crate::logging::targets;
use crate::model::{DataContext, PropertyChanged};
use crate::signal::SubscriberId;

/// Bridges a [`DataContext`]'s change notifications onto a host's owning
/// thread.
///
/// # Example
///
/// ```
/// # fn main() -> Result<(), tether_core::TetherError> {
/// use std::sync::Arc;
/// use tether_core::{BindingBridge, BoxError, DataContext, HostOptions, ThreadHost};
///
/// struct Display {
///     text: String,
/// }
///
/// let host = ThreadHost::spawn("display", HostOptions::default(), |_ctx| {
///     Ok::<_, BoxError>(Display {
///         text: String::new(),
///     })
/// })?;
/// let model = Arc::new(DataContext::new());
///
/// let _bridge = BindingBridge::attach(&host.handle(), &model, "label", |display, model, name| {
///     if let Some(value) = model.get::<String>(name) {
///         display.text = value.clone();
///         model.set("label", format!("{name} = {value}"));
///     }
/// });
///
/// // From any thread: the display reflects the change once set returns.
/// model.set("content", "Line - 1".to_string());
/// assert_eq!(host.with(|display| display.text.clone())?, "Line - 1");
///
/// host.shutdown_trigger().request();
/// # Ok(())
/// # }
/// ```
pub struct BindingBridge {
    model: Arc<DataContext>,
    subscription: SubscriberId,
}

impl BindingBridge {
    /// Subscribe `reaction` to the model's change notifications.
    ///
    /// The reaction receives exclusive access to the resource, the model,
    /// and the name of the property that changed. It is never invoked for
    /// `echo_property`. Notifications arriving after the host has shut
    /// down are logged and dropped.
    pub fn attach<R, F>(
        host: &HostHandle<R>,
        model: &Arc<DataContext>,
        echo_property: impl Into<String>,
        reaction: F,
    ) -> Self
    where
        R: 'static,
        F: Fn(&mut R, &DataContext, &str) + Send + Sync + 'static,
    {
        let echo = echo_property.into();
        let handle = host.clone();
        let reaction = Arc::new(reaction);
        let reaction_model = model.clone();

        let subscription = model.on_changed().subscribe(move |change: &PropertyChanged| {
            if change.name == echo {
                return;
            }

            let name = change.name.clone();
            let reaction = reaction.clone();
            let model = reaction_model.clone();

            let outcome = if handle.dispatch().is_owner() {
                // Raised from the owning thread, i.e. from a reaction
                // already holding the resource: defer behind it instead of
                // nesting.
                handle.post(move |resource| reaction(resource, &model, &name))
            } else {
                handle.with(move |resource| reaction(resource, &model, &name))
            };
            if let Err(err) = outcome {
                tracing::warn!(
                    target: targets::BINDING,
                    host = %handle.label(),
                    property = %change.name,
                    "binding reaction dropped: {err}"
                );
            }
        });

        tracing::debug!(
            target: targets::BINDING,
            host = %host.label(),
            "binding bridge attached"
        );
        Self {
            model: model.clone(),
            subscription,
        }
    }

    /// Detach the bridge, removing the subscription.
    ///
    /// Equivalent to dropping it.
    pub fn detach(self) {}
}

impl Drop for BindingBridge {
    fn drop(&mut self) {
        self.model.on_changed().unsubscribe(self.subscription);
    }
}

impl std::fmt::Debug for BindingBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingBridge")
            .field("subscription", &self.subscription)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::host::{HostOptions, ThreadHost};
    use parking_lot::Mutex;
    use std::thread;
    use std::time::Duration;

    struct Display {
        text: String,
        updated_on: Option<thread::ThreadId>,
    }

    fn display_host(label: &str) -> ThreadHost<Display> {
        ThreadHost::spawn(label, HostOptions::default(), |_ctx| {
            Ok::<_, BoxError>(Display {
                text: String::new(),
                updated_on: None,
            })
        })
        .expect("host should start")
    }

    fn close(host: &ThreadHost<Display>) {
        host.shutdown_trigger().request();
        assert!(host.wait_timeout(Duration::from_secs(1)));
    }

    #[test]
    fn test_reaction_runs_on_owning_thread() {
        let host = display_host("affine");
        let model = Arc::new(DataContext::new());

        let _bridge = BindingBridge::attach(&host.handle(), &model, "label", |display, model, name| {
            display.updated_on = Some(thread::current().id());
            if let Some(value) = model.get::<String>(name) {
                display.text = value;
            }
        });

        let model_clone = model.clone();
        thread::spawn(move || {
            model_clone.set("content", "Line - 1".to_string());
        })
        .join()
        .unwrap();

        let (text, updated_on) = host
            .with(|display| (display.text.clone(), display.updated_on))
            .unwrap();
        assert_eq!(text, "Line - 1");
        assert_eq!(updated_on, Some(host.dispatch().owner_thread()));
        close(&host);
    }

    #[test]
    fn test_mutation_is_reflected_when_set_returns() {
        let host = display_host("sync");
        let model = Arc::new(DataContext::new());

        let _bridge = BindingBridge::attach(&host.handle(), &model, "label", |display, model, name| {
            if let Some(value) = model.get::<String>(name) {
                display.text = value;
            }
        });

        // From this (non-owning) thread, set blocks through the guard.
        model.set("content", "X".to_string());
        assert_eq!(host.with(|display| display.text.clone()).unwrap(), "X");
        close(&host);
    }

    #[test]
    fn test_echo_property_never_retriggers() {
        let host = display_host("echo");
        let model = Arc::new(DataContext::new());
        let invocations = Arc::new(Mutex::new(Vec::new()));

        let invocations_clone = invocations.clone();
        let _bridge = BindingBridge::attach(&host.handle(), &model, "label", move |display, model, name| {
            invocations_clone.lock().push(name.to_string());
            if let Some(value) = model.get::<String>(name) {
                display.text = value.clone();
                // The write that must not come back around.
                model.set("label", format!("changed: {name} = {value}"));
            }
        });

        model.set("content", "Line - 1".to_string());
        // Flush anything the reaction may have queued.
        host.with(|_| {}).unwrap();

        assert_eq!(*invocations.lock(), vec!["content"]);
        assert_eq!(
            model.get::<String>("label").as_deref(),
            Some("changed: content = Line - 1")
        );
        close(&host);
    }

    #[test]
    fn test_chain_between_other_properties_is_deferred_not_nested() {
        let host = display_host("chain");
        let model = Arc::new(DataContext::new());
        let invocations = Arc::new(Mutex::new(Vec::new()));

        let invocations_clone = invocations.clone();
        let _bridge = BindingBridge::attach(&host.handle(), &model, "label", move |display, model, name| {
            invocations_clone.lock().push(name.to_string());
            match name {
                // A reaction-triggered write to another bound property:
                // re-enters the bridge from the owning thread.
                "first" => model.set("second", "derived".to_string()),
                "second" => {
                    display.text = "settled".to_string();
                    model.set("label", "done".to_string());
                }
                _ => {}
            }
        });

        model.set("first", "go".to_string());
        host.with(|_| {}).unwrap();

        assert_eq!(*invocations.lock(), vec!["first", "second"]);
        assert_eq!(host.with(|display| display.text.clone()).unwrap(), "settled");
        close(&host);
    }

    #[test]
    fn test_detach_stops_reactions() {
        let host = display_host("detach");
        let model = Arc::new(DataContext::new());

        let bridge = BindingBridge::attach(&host.handle(), &model, "label", |display, model, name| {
            if let Some(value) = model.get::<String>(name) {
                display.text = value;
            }
        });

        model.set("content", "before".to_string());
        bridge.detach();
        model.set("content", "after".to_string());

        assert_eq!(
            host.with(|display| display.text.clone()).unwrap(),
            "before"
        );
        assert_eq!(model.on_changed().subscriber_count(), 0);
        close(&host);
    }

    #[test]
    fn test_notifications_after_shutdown_are_dropped_quietly() {
        let host = display_host("late-model");
        let model = Arc::new(DataContext::new());

        let _bridge = BindingBridge::attach(&host.handle(), &model, "label", |display, _, _| {
            display.text = "unreachable".to_string();
        });

        close(&host);
        // Logged and dropped; must neither hang nor panic.
        model.set("content", "too late".to_string());
    }
}
