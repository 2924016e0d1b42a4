use std::sync::{Arc, Mutex};

use crate::error::{GuardError, Result};

use super::backend::ClassifierBackend;

/// Shared, initially empty holder for the loaded classifier.
///
/// The backend is wrapped in a `Mutex` because `ClassifierBackend::classify`
/// takes `&mut self`. Clones share the same slot.
#[derive(Clone, Default)]
pub struct ClassifierSlot {
    inner: Arc<Mutex<Option<Box<dyn ClassifierBackend>>>>,
}

impl ClassifierSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// A slot that starts out loaded.
    pub fn with_backend<B: ClassifierBackend + 'static>(backend: B) -> Self {
        let slot = Self::new();
        slot.install(Box::new(backend));
        slot
    }

    /// Install (or replace) the classifier.
    pub fn install(&self, backend: Box<dyn ClassifierBackend>) {
        log::info!("classifier '{}' installed", backend.name());
        let mut guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        *guard = Some(backend);
    }

    pub fn is_loaded(&self) -> bool {
        self.inner
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Run `f` with exclusive access to the classifier.
    ///
    /// Fails with `InferenceUnavailable` while the slot is empty.
    pub fn with_classifier<T>(
        &self,
        f: impl FnOnce(&mut dyn ClassifierBackend) -> Result<T>,
    ) -> Result<T> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| GuardError::Inference("classifier lock poisoned".to_string()))?;
        match guard.as_mut() {
            Some(backend) => f(backend.as_mut()),
            None => Err(GuardError::InferenceUnavailable),
        }
    }
}
