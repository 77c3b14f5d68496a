//! secrets::traits
//!
//! The storage seam under the credential store.
//!
//! A store holds a handful of opaque string blobs by key. Reads are
//! unguarded; every write requires a [`WriteGuard`] obtained from
//! [`SecretStore::lock`], so a read-modify-write cycle is serialized
//! against other writers, including other processes for file stores.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::lock::FileLock;

/// Errors from secret storage.
///
/// Variants carry paths and reasons, never stored values.
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("cannot {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("secrets file {} is not valid: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("timed out waiting for lock on {}", .0.display())]
    LockTimeout(PathBuf),

    #[error("cannot determine home directory for the secrets file")]
    NoHomeDirectory,

    #[error("unknown secret provider '{0}' (expected 'file' or 'memory')")]
    UnknownProvider(String),

    #[error("secret store state poisoned by a panicked writer")]
    Poisoned,
}

impl SecretError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        SecretError::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Held while writing. Dropping it releases the lock.
#[must_use = "writes need the guard held until they finish"]
#[derive(Debug)]
pub struct WriteGuard {
    _file: Option<FileLock>,
}

impl WriteGuard {
    /// Guard for stores with no cross-process state.
    pub fn in_process() -> Self {
        Self { _file: None }
    }

    pub(crate) fn file(lock: FileLock) -> Self {
        Self { _file: Some(lock) }
    }
}

/// Key/value blob storage for secret-bearing documents.
pub trait SecretStore: Send + Sync {
    /// Read a blob. `Ok(None)` when nothing is stored under `key`.
    fn read(&self, key: &str) -> Result<Option<String>, SecretError>;

    /// Take the write lock.
    fn lock(&self) -> Result<WriteGuard, SecretError>;

    /// Store `value` under `key`, replacing what was there.
    fn write(&self, guard: &WriteGuard, key: &str, value: &str) -> Result<(), SecretError>;

    /// Drop `key`. Removing a missing key is not an error.
    fn remove(&self, guard: &WriteGuard, key: &str) -> Result<(), SecretError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_names_path_and_action() {
        let err = SecretError::io(
            "read",
            "/home/u/.vsession/credstore.toml",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.starts_with("cannot read /home/u/.vsession/credstore.toml"));
        assert!(msg.ends_with("denied"));
    }

    #[test]
    fn unknown_provider_lists_choices() {
        let msg = SecretError::UnknownProvider("vault".into()).to_string();
        assert!(msg.contains("'vault'"));
        assert!(msg.contains("'memory'"));
    }
}
