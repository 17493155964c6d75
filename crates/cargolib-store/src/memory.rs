use crate::lss::{LocalSecureStorage, LssError, LssResult};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// In-process LSS backed by a mutex-guarded map.
///
/// A failure reason can be injected with [`MemoryLss::fail_with`]; every
/// call then returns [`LssError::BackendFailure`] until
/// [`MemoryLss::recover`] is called.
#[derive(Debug, Default)]
pub struct MemoryLss {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    failure: Mutex<Option<String>>,
}

impl MemoryLss {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(&self, reason: impl Into<String>) {
        *self
            .failure
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(reason.into());
    }

    pub fn recover(&self) {
        *self
            .failure
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
    }

    fn entries(&self) -> LssResult<MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        if let Some(reason) = self
            .failure
            .lock()
            .map_err(|e| LssError::BackendFailure(format!("mutex poisoned: {e}")))?
            .as_ref()
        {
            return Err(LssError::BackendFailure(reason.clone()));
        }
        self.entries
            .lock()
            .map_err(|e| LssError::BackendFailure(format!("mutex poisoned: {e}")))
    }
}

impl LocalSecureStorage for MemoryLss {
    fn insert(&self, key: &str, value: Vec<u8>) -> LssResult<Option<Vec<u8>>> {
        Ok(self.entries()?.insert(key.to_owned(), value))
    }

    fn get(&self, key: &str) -> LssResult<Option<Vec<u8>>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn contains_key(&self, key: &str) -> LssResult<bool> {
        Ok(self.entries()?.contains_key(key))
    }

    fn keys(&self) -> LssResult<Vec<String>> {
        Ok(self.entries()?.keys().cloned().collect())
    }

    fn keys_starting_with(&self, prefix: &str) -> LssResult<Vec<String>> {
        Ok(self
            .entries()?
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn remove(&self, key: &str) -> LssResult<Option<Vec<u8>>> {
        Ok(self.entries()?.remove(key))
    }

    fn len(&self) -> LssResult<usize> {
        Ok(self.entries()?.len())
    }

    fn is_empty(&self) -> LssResult<bool> {
        Ok(self.entries()?.is_empty())
    }
}
