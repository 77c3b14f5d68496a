//! secrets::file_store
//!
//! Secrets kept in a TOML file, `~/.vsession/credstore.toml` by default.
//!
//! ```toml
//! [secrets]
//! "credstore.v1" = '{"kind":"vsession.credstore",...}'
//! ```
//!
//! The file is created owner-only (0600 on Unix) and always replaced
//! whole: the new content goes to a sibling temp file which is then
//! renamed over the old one.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::lock::{FileLock, DEFAULT_LOCK_TIMEOUT};
use super::traits::{SecretError, SecretStore, WriteGuard};

#[derive(Debug, Default, Serialize, Deserialize)]
struct SecretsFile {
    #[serde(default)]
    secrets: BTreeMap<String, String>,
}

/// Secret store persisted to a single file.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    /// Store at `~/.vsession/credstore.toml`.
    pub fn new() -> Result<Self, SecretError> {
        let home = dirs::home_dir().ok_or(SecretError::NoHomeDirectory)?;
        Ok(Self::with_path(home.join(".vsession").join("credstore.toml")))
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<SecretsFile, SecretError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(SecretsFile::default()),
            Err(e) => return Err(SecretError::io("read", &self.path, e)),
        };
        toml::from_str(&text).map_err(|e| SecretError::Corrupt {
            path: self.path.clone(),
            reason: e.message().to_string(),
        })
    }

    fn replace(&self, contents: &SecretsFile) -> Result<(), SecretError> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| SecretError::io("create", dir, e))?;

        let text = toml::to_string(contents).map_err(|e| SecretError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        let staging = self.path.with_extension("toml.new");
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options
            .open(&staging)
            .map_err(|e| SecretError::io("create", &staging, e))?;
        file.write_all(text.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| SecretError::io("write", &staging, e))?;
        drop(file);

        fs::rename(&staging, &self.path).map_err(|e| SecretError::io("replace", &self.path, e))
    }
}

impl SecretStore for FileSecretStore {
    fn read(&self, key: &str) -> Result<Option<String>, SecretError> {
        Ok(self.load()?.secrets.remove(key))
    }

    fn lock(&self) -> Result<WriteGuard, SecretError> {
        FileLock::acquire(&self.path, DEFAULT_LOCK_TIMEOUT).map(WriteGuard::file)
    }

    fn write(&self, _guard: &WriteGuard, key: &str, value: &str) -> Result<(), SecretError> {
        let mut contents = self.load()?;
        contents.secrets.insert(key.to_string(), value.to_string());
        self.replace(&contents)
    }

    fn remove(&self, _guard: &WriteGuard, key: &str) -> Result<(), SecretError> {
        let mut contents = self.load()?;
        if contents.secrets.remove(key).is_none() {
            return Ok(());
        }
        self.replace(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const KEY: &str = "credstore.v1";

    fn store_in(temp: &TempDir) -> FileSecretStore {
        FileSecretStore::with_path(temp.path().join(".vsession").join("credstore.toml"))
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let temp = TempDir::new().unwrap();
        assert!(store_in(&temp).read(KEY).unwrap().is_none());
    }

    #[test]
    fn written_document_survives_a_new_handle() {
        let temp = TempDir::new().unwrap();
        let doc = r#"{"kind":"vsession.credstore","entries":[{"server":"https://vc/api"}]}"#;

        let store = store_in(&temp);
        let guard = store.lock().unwrap();
        store.write(&guard, KEY, doc).unwrap();
        drop(guard);

        assert_eq!(store_in(&temp).read(KEY).unwrap().as_deref(), Some(doc));
        let on_disk = fs::read_to_string(store.path()).unwrap();
        assert!(on_disk.starts_with("[secrets]"));
    }

    #[test]
    fn remove_leaves_other_keys() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        let guard = store.lock().unwrap();

        store.remove(&guard, KEY).unwrap();
        store.write(&guard, KEY, "a").unwrap();
        store.write(&guard, "other", "b").unwrap();
        store.remove(&guard, KEY).unwrap();

        assert!(store.read(KEY).unwrap().is_none());
        assert_eq!(store.read("other").unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn no_staging_file_left_behind() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        let guard = store.lock().unwrap();
        store.write(&guard, KEY, "{}").unwrap();

        assert!(!store.path().with_extension("toml.new").exists());
    }

    #[cfg(unix)]
    #[test]
    fn file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        let guard = store.lock().unwrap();
        store.write(&guard, KEY, "{}").unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn garbage_file_is_reported_as_corrupt() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "secrets = [").unwrap();

        assert!(matches!(
            store.read(KEY),
            Err(SecretError::Corrupt { .. })
        ));
    }
}
