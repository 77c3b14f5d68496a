//! secrets
//!
//! Blob storage backing the credential store.
//!
//! # Providers
//!
//! - [`FileSecretStore`]: `~/.vsession/credstore.toml` or a configured path
//! - [`MemorySecretStore`]: process-local, never persisted
//!
//! # Security
//!
//! - Stored values never appear in logs or error messages
//! - The file provider writes owner-only files and replaces them atomically
//! - Writers hold an exclusive lock for the whole read-modify-write cycle
//!
//! # Example
//!
//! ```
//! use vsession::secrets::{create_store, SecretStore};
//!
//! let store = create_store("memory", None).unwrap();
//! let guard = store.lock().unwrap();
//! store.write(&guard, "credstore.v1", "{}").unwrap();
//! assert_eq!(store.read("credstore.v1").unwrap().as_deref(), Some("{}"));
//! ```

mod file_store;
mod lock;
mod memory_store;
mod traits;

pub use file_store::FileSecretStore;
pub use lock::{FileLock, DEFAULT_LOCK_TIMEOUT};
pub use memory_store::MemorySecretStore;
pub use traits::{SecretError, SecretStore, WriteGuard};

use std::path::PathBuf;

/// Provider used when the configuration names none.
pub const DEFAULT_PROVIDER: &str = "file";

/// Open the store for a configured provider name.
///
/// `path` only applies to `"file"`; without it the default location under
/// the home directory is used.
pub fn create_store(
    provider: &str,
    path: Option<PathBuf>,
) -> Result<Box<dyn SecretStore>, SecretError> {
    match (provider, path) {
        ("file", Some(path)) => Ok(Box::new(FileSecretStore::with_path(path))),
        ("file", None) => Ok(Box::new(FileSecretStore::new()?)),
        ("memory", _) => Ok(Box::new(MemorySecretStore::new())),
        (other, _) => Err(SecretError::UnknownProvider(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn file_provider_honours_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("creds.toml");
        let store = create_store("file", Some(path.clone())).unwrap();

        let guard = store.lock().unwrap();
        store.write(&guard, "k", "v").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        assert!(matches!(
            create_store("vault", None),
            Err(SecretError::UnknownProvider(name)) if name == "vault"
        ));
    }
}
