//! Named sub-element resolution for hosted resources.
//!
//! Resources managed by a thread host are opaque to the core except for
//! one capability: they can look up named sub-elements (a window's
//! controls, say). [`ElementSource`] is that capability;
//! [`HostHandle::resolve`] turns a logical name into an
//! [`ElementHandle`], the guarded way to touch the sub-element from any
//! thread.
//!
//! Resolution is never cached. An `ElementHandle` stores only the name
//! and re-queries the live resource on every access, so elements added or
//! removed after construction are observed, at the price of a lookup per
//! access. A name with no matching element fails with
//! [`TetherError::ElementNotFound`], carrying both the resource's label
//! and the requested name.

use crate::error::{Result, TetherError};
use crate::host::{HostHandle, ThreadHost};

/// A resource exposing named sub-elements.
///
/// Implemented by the collaborator that materializes the resource (a
/// loaded window, a widget tree, a parsed document). The core only ever
/// calls it on the owning thread.
pub trait ElementSource {
    /// The sub-element type.
    type Element;

    /// The resource's own identifying label, used in lookup errors.
    fn label(&self) -> &str;

    /// Look up a sub-element by name.
    fn element(&self, name: &str) -> Option<&Self::Element>;

    /// Look up a sub-element by name, mutably.
    fn element_mut(&mut self, name: &str) -> Option<&mut Self::Element>;
}

impl<R: ElementSource + 'static> HostHandle<R> {
    /// Resolve a named sub-element against the live resource.
    ///
    /// # Errors
    ///
    /// [`TetherError::ElementNotFound`] if the resource has no element of
    /// that name right now; [`TetherError::HostUnavailable`] if the host
    /// has shut down.
    pub fn resolve(&self, name: &str) -> Result<ElementHandle<R>> {
        let probe = name.to_string();
        self.with(move |resource| match resource.element(&probe) {
            Some(_) => Ok(()),
            None => Err(TetherError::element_not_found(resource.label(), &probe)),
        })??;
        Ok(ElementHandle {
            host: self.clone(),
            name: name.to_string(),
        })
    }
}

impl<R: ElementSource + 'static> ThreadHost<R> {
    /// Resolve a named sub-element; see [`HostHandle::resolve`].
    pub fn resolve(&self, name: &str) -> Result<ElementHandle<R>> {
        self.handle().resolve(name)
    }
}

/// Guarded access to one named sub-element of a hosted resource.
///
/// Holds the name, not the element: every access re-resolves against the
/// live resource on the owning thread, and fails with
/// [`TetherError::ElementNotFound`] if the element has since disappeared.
pub struct ElementHandle<R: ElementSource + 'static> {
    host: HostHandle<R>,
    name: String,
}

impl<R: ElementSource + 'static> ElementHandle<R> {
    /// The name this handle resolves.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The host handle this element belongs to.
    pub fn host(&self) -> &HostHandle<R> {
        &self.host
    }

    /// Execute `f` against the element on the owning thread, blocking for
    /// the result.
    ///
    /// Same contract as [`HostHandle::with`]: direct on the owning thread,
    /// dispatched and blocking from anywhere else, panics resumed on the
    /// caller.
    ///
    /// # Errors
    ///
    /// [`TetherError::ElementNotFound`] if the name no longer resolves;
    /// [`TetherError::HostUnavailable`] if the host has shut down.
    pub fn with_element<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut R::Element) -> T + Send + 'static,
        T: Send + 'static,
    {
        let name = self.name.clone();
        self.host.with(move |resource| match resource.element_mut(&name) {
            Some(element) => Ok(f(element)),
            None => Err(TetherError::element_not_found(resource.label(), &name)),
        })?
    }
}

impl<R: ElementSource + 'static> Clone for ElementHandle<R> {
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
            name: self.name.clone(),
        }
    }
}

impl<R: ElementSource + 'static> std::fmt::Debug for ElementHandle<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementHandle")
            .field("host", &self.host.label())
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::host::HostOptions;
    use std::collections::HashMap;
    use std::time::Duration;

    struct TextBlock {
        text: String,
    }

    struct Window {
        title: String,
        elements: HashMap<String, TextBlock>,
    }

    impl Window {
        fn new(title: &str, names: &[&str]) -> Self {
            let elements = names
                .iter()
                .map(|name| {
                    (
                        name.to_string(),
                        TextBlock {
                            text: String::new(),
                        },
                    )
                })
                .collect();
            Self {
                title: title.to_string(),
                elements,
            }
        }
    }

    impl ElementSource for Window {
        type Element = TextBlock;

        fn label(&self) -> &str {
            &self.title
        }

        fn element(&self, name: &str) -> Option<&TextBlock> {
            self.elements.get(name)
        }

        fn element_mut(&mut self, name: &str) -> Option<&mut TextBlock> {
            self.elements.get_mut(name)
        }
    }

    fn window_host(names: &'static [&'static str]) -> ThreadHost<Window> {
        ThreadHost::spawn("Main Window", HostOptions::default(), move |_ctx| {
            Ok::<_, BoxError>(Window::new("Main Window", names))
        })
        .expect("host should start")
    }

    fn close(host: &ThreadHost<Window>) {
        host.shutdown_trigger().request();
        assert!(host.wait_timeout(Duration::from_secs(1)));
    }

    #[test]
    fn test_resolve_existing_element() {
        let host = window_host(&["textBlock"]);
        let element = host.resolve("textBlock").unwrap();
        assert_eq!(element.name(), "textBlock");

        element
            .with_element(|block| block.text = "Second Text".to_string())
            .unwrap();
        let text = element.with_element(|block| block.text.clone()).unwrap();
        assert_eq!(text, "Second Text");
        close(&host);
    }

    #[test]
    fn test_resolve_missing_element_names_both_parties() {
        let host = window_host(&["textBlock"]);
        match host.resolve("doesNotExist") {
            Err(TetherError::ElementNotFound { resource, name }) => {
                assert_eq!(resource, "Main Window");
                assert_eq!(name, "doesNotExist");
            }
            other => panic!("expected ElementNotFound, got {other:?}"),
        }
        close(&host);
    }

    #[test]
    fn test_resolution_sees_elements_added_later() {
        let host = window_host(&[]);
        assert!(host.resolve("late").is_err());

        host.with(|window| {
            window.elements.insert(
                "late".to_string(),
                TextBlock {
                    text: "fresh".to_string(),
                },
            );
        })
        .unwrap();

        // No caching: the same name now resolves.
        let element = host.resolve("late").unwrap();
        assert_eq!(
            element.with_element(|block| block.text.clone()).unwrap(),
            "fresh"
        );
        close(&host);
    }

    #[test]
    fn test_handle_fails_once_element_is_removed() {
        let host = window_host(&["ephemeral"]);
        let element = host.resolve("ephemeral").unwrap();

        host.with(|window| {
            window.elements.remove("ephemeral");
        })
        .unwrap();

        assert!(matches!(
            element.with_element(|block| block.text.clone()),
            Err(TetherError::ElementNotFound { .. })
        ));
        close(&host);
    }

    #[test]
    fn test_element_access_after_shutdown_is_unavailable() {
        let host = window_host(&["textBlock"]);
        let element = host.resolve("textBlock").unwrap();
        close(&host);

        assert!(matches!(
            element.with_element(|block| block.text.clone()),
            Err(TetherError::HostUnavailable { .. })
        ));
    }
}
