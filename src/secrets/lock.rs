//! secrets::lock
//!
//! Cross-process exclusive lock for a secrets file, taken on a sibling
//! `<name>.lock` file so the data file itself can be replaced by rename.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;

use super::traits::SecretError;

/// How long a writer waits for another process to finish.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

const RETRY_EVERY: Duration = Duration::from_millis(50);

/// An OS-level exclusive lock, released on drop.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    file: File,
}

impl FileLock {
    /// Lock guarding `target`.
    pub fn path_for(target: &Path) -> PathBuf {
        target.with_extension("lock")
    }

    /// Block until the lock for `target` is ours or `timeout` passes.
    pub fn acquire(target: &Path, timeout: Duration) -> Result<Self, SecretError> {
        let path = Self::path_for(target);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| SecretError::io("create", dir, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| SecretError::io("open", &path, e))?;

        let give_up = Instant::now() + timeout;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(Self { path, file }),
                Err(e) if e.kind() == ErrorKind::WouldBlock && Instant::now() < give_up => {
                    thread::sleep(RETRY_EVERY);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    return Err(SecretError::LockTimeout(path));
                }
                Err(e) => return Err(SecretError::io("lock", &path, e)),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn sits_next_to_target() {
        assert_eq!(
            FileLock::path_for(Path::new("/home/u/.vsession/credstore.toml")),
            PathBuf::from("/home/u/.vsession/credstore.lock")
        );
    }

    #[test]
    fn second_writer_times_out_while_held() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("nested").join("credstore.toml");

        let held = FileLock::acquire(&target, DEFAULT_LOCK_TIMEOUT).unwrap();
        assert!(held.path().exists());

        match FileLock::acquire(&target, Duration::from_millis(120)) {
            Err(SecretError::LockTimeout(path)) => assert_eq!(path, FileLock::path_for(&target)),
            other => panic!("expected timeout, got {:?}", other),
        }

        drop(held);
        FileLock::acquire(&target, Duration::from_millis(120)).unwrap();
    }
}
