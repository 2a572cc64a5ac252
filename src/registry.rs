//! Backend registry.
//!
//! Backends are constructed once, in registration order. A constructor that
//! fails (or panics) leaves the backend `Unavailable` and permanently out of
//! the active set; the run carries on with the rest. Registration order is
//! the column order of the result table.

use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{info, warn};

use crate::backend::{panic_message, Backend, BackendHandle, BackendState};
use crate::error::{InitError, RegistryError};

struct Entry<U> {
    handle: BackendHandle,
    backend: Option<Box<dyn Backend<U>>>,
}

/// Named backends for units of type `U`.
pub struct BackendRegistry<U> {
    entries: Vec<Entry<U>>,
}

impl<U> Default for BackendRegistry<U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U> BackendRegistry<U> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Construct and register a backend under `name`.
    ///
    /// Construction failure is not an error here: it is recorded on the
    /// returned handle. Only reusing a name is.
    pub fn register<B, F>(
        &mut self,
        name: impl Into<String>,
        constructor: F,
    ) -> Result<&BackendHandle, RegistryError>
    where
        B: Backend<U> + 'static,
        F: FnOnce() -> Result<B, InitError>,
    {
        let name = name.into();
        if self.entries.iter().any(|e| e.handle.name() == name) {
            return Err(RegistryError::DuplicateName(name));
        }

        let built = catch_unwind(AssertUnwindSafe(constructor)).unwrap_or_else(|payload| {
            Err(InitError::new(format!(
                "constructor panicked: {}",
                panic_message(payload.as_ref())
            )))
        });

        let entry = match built {
            Ok(backend) => {
                info!(backend = %name, "backend initialized");
                Entry {
                    handle: BackendHandle::new(name, BackendState::Available),
                    backend: Some(Box::new(backend) as Box<dyn Backend<U>>),
                }
            }
            Err(err) => {
                warn!(backend = %name, reason = %err, "backend unavailable, excluded from sweep");
                Entry {
                    handle: BackendHandle::new(name, BackendState::Unavailable(err.reason)),
                    backend: None,
                }
            }
        };

        self.entries.push(entry);
        Ok(&self.entries[self.entries.len() - 1].handle)
    }

    /// Every registered backend, available or not, in registration order.
    pub fn handles(&self) -> impl Iterator<Item = &BackendHandle> {
        self.entries.iter().map(|e| &e.handle)
    }

    /// Backends that constructed successfully, in registration order.
    pub fn active_backends(&self) -> impl Iterator<Item = &BackendHandle> {
        self.handles().filter(|h| h.is_available())
    }

    pub fn active_names(&self) -> Vec<&str> {
        self.active_backends().map(BackendHandle::name).collect()
    }

    /// Backends that failed to construct.
    pub fn excluded(&self) -> impl Iterator<Item = &BackendHandle> {
        self.handles().filter(|h| !h.is_available())
    }

    pub fn get(&self, name: &str) -> Option<&BackendHandle> {
        self.handles().find(|h| h.name() == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_active(&self) -> bool {
        self.active_backends().next().is_some()
    }

    /// Active backends for execution, in registration order.
    pub(crate) fn active_mut(
        &mut self,
    ) -> impl Iterator<Item = (&str, &mut (dyn Backend<U> + 'static))> {
        self.entries.iter_mut().filter_map(|e| {
            let name = e.handle.name();
            e.backend.as_deref_mut().map(|b| (name, b))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Completion;
    use crate::error::ExecutionError;

    fn ok_backend() -> Result<impl Backend<u32>, InitError> {
        Ok(|_: &u32| -> Result<Completion, ExecutionError> { Ok(Completion::Succeeded) })
    }

    fn broken_backend() -> Result<fn(&u32) -> Result<Completion, ExecutionError>, InitError> {
        Err(InitError::new("device missing"))
    }

    #[test]
    fn should_keep_registration_order_when_listing_active() {
        let mut registry = BackendRegistry::<u32>::new();
        registry.register("b", ok_backend).unwrap();
        registry.register("a", ok_backend).unwrap();
        registry.register("c", ok_backend).unwrap();

        assert_eq!(registry.active_names(), vec!["b", "a", "c"]);
    }

    #[test]
    fn should_exclude_backend_when_constructor_fails() {
        let mut registry = BackendRegistry::<u32>::new();
        registry.register("cpu", ok_backend).unwrap();
        let handle = registry.register("gpu", broken_backend).unwrap();
        assert_eq!(handle.unavailable_reason(), Some("device missing"));

        assert_eq!(registry.active_names(), vec!["cpu"]);
        assert_eq!(registry.len(), 2);
        let excluded: Vec<_> = registry.excluded().map(BackendHandle::name).collect();
        assert_eq!(excluded, vec!["gpu"]);
    }

    #[test]
    fn should_exclude_backend_when_constructor_panics() {
        let mut registry = BackendRegistry::<u32>::new();
        let handle = registry
            .register("flaky", || -> Result<fn(&u32) -> Result<Completion, ExecutionError>, InitError> {
                panic!("driver crashed")
            })
            .unwrap();

        let reason = handle.unavailable_reason().unwrap();
        assert!(reason.contains("driver crashed"));
        assert!(!registry.has_active());
    }

    #[test]
    fn should_reject_duplicate_name() {
        let mut registry = BackendRegistry::<u32>::new();
        registry.register("cpu", ok_backend).unwrap();
        let err = registry.register("cpu", ok_backend).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateName("cpu".to_string()));

        // An unavailable backend still owns its name.
        registry.register("gpu", broken_backend).unwrap();
        assert!(registry.register("gpu", ok_backend).is_err());
    }

    #[test]
    fn should_iterate_active_backends_for_execution() {
        let mut registry = BackendRegistry::<u32>::new();
        registry.register("gpu", broken_backend).unwrap();
        registry.register("cpu", ok_backend).unwrap();

        let mut seen = Vec::new();
        for (name, backend) in registry.active_mut() {
            assert_eq!(backend.execute(&1), Ok(Completion::Succeeded));
            seen.push(name.to_string());
        }
        assert_eq!(seen, vec!["cpu"]);
    }
}
