//! secrets::memory_store
//!
//! In-process secret storage. Nothing touches disk; contents vanish with
//! the process. Used for `provider = "memory"` and throughout the tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::traits::{SecretError, SecretStore, WriteGuard};

/// Secret store backed by a shared in-memory map.
///
/// Clones share the same map, so a test can keep a handle and inspect
/// what a component wrote.
#[derive(Debug, Clone, Default)]
pub struct MemorySecretStore {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> Result<MutexGuard<'_, HashMap<String, String>>, SecretError> {
        self.inner.lock().map_err(|_| SecretError::Poisoned)
    }
}

impl SecretStore for MemorySecretStore {
    fn read(&self, key: &str) -> Result<Option<String>, SecretError> {
        Ok(self.map()?.get(key).cloned())
    }

    fn lock(&self) -> Result<WriteGuard, SecretError> {
        Ok(WriteGuard::in_process())
    }

    fn write(&self, _guard: &WriteGuard, key: &str, value: &str) -> Result<(), SecretError> {
        self.map()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, _guard: &WriteGuard, key: &str) -> Result<(), SecretError> {
        self.map()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_contents() {
        let store = MemorySecretStore::new();
        let handle = store.clone();
        let guard = store.lock().unwrap();

        store.write(&guard, "k", "v").unwrap();
        assert_eq!(handle.read("k").unwrap(), Some("v".to_string()));

        handle.remove(&guard, "k").unwrap();
        assert!(store.read("k").unwrap().is_none());
    }
}
