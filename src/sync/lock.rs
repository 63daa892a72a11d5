//! Exclusive lock for a sync cycle.
//!
//! Two cycles must never overlap on the same repository. The lock is a file
//! created with `create_new`, holding JSON metadata about its owner, removed
//! when the guard drops. A lock left behind by a process that died without
//! dropping the guard is reclaimed.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::now_secs;
use crate::sync::types::{SyncError, SyncResult};

/// Age after which a lock is reclaimed even if its owner looks alive.
const STALE_AFTER: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLockMeta {
    pub pid: u32,
    pub started_at: i64,
    pub version: String,
}

impl SyncLockMeta {
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            started_at: now_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Held while a cycle runs.
#[derive(Debug)]
pub struct SyncLock {
    path: PathBuf,
    meta: SyncLockMeta,
}

impl SyncLock {
    /// Take the lock at `path`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Locked` if another cycle holds it.
    pub fn acquire(path: &Path) -> SyncResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = match create_lock_file(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists && is_stale(path) => {
                tracing::warn!(
                    path = %path.display(),
                    "removing stale sync lock left by a previous cycle"
                );
                if let Err(err) = fs::remove_file(path)
                    && err.kind() != io::ErrorKind::NotFound
                {
                    return Err(err.into());
                }
                create_lock_file(path).map_err(|err| locked_or_io(path, err))?
            }
            Err(err) => return Err(locked_or_io(path, err)),
        };

        let meta = SyncLockMeta::current();
        let bytes = serde_json::to_vec(&meta)?;
        file.write_all(&bytes)?;
        file.sync_all()?;

        tracing::trace!(path = %path.display(), "sync lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
            meta,
        })
    }

    #[must_use]
    pub fn meta(&self) -> &SyncLockMeta {
        &self.meta
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SyncLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn create_lock_file(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

fn locked_or_io(path: &Path, err: io::Error) -> SyncError {
    if err.kind() != io::ErrorKind::AlreadyExists {
        return err.into();
    }
    let holder = read_lock_meta(path).map_or_else(
        || "unknown owner".to_string(),
        |meta| format!("pid {} since {}", meta.pid, meta.started_at),
    );
    SyncError::Locked {
        path: path.to_path_buf(),
        holder,
    }
}

/// Whether the lock at `path` was left behind by a cycle that is gone.
fn is_stale(path: &Path) -> bool {
    match read_lock_meta(path) {
        Some(meta) => {
            let age = u64::try_from(now_secs().saturating_sub(meta.started_at)).unwrap_or(0);
            !process_alive(meta.pid) || age > STALE_AFTER.as_secs()
        }
        None => fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .is_some_and(|age| age > STALE_AFTER),
    }
}

/// Liveness via `/proc` where available. Elsewhere every pid counts as alive
/// and only the age limit applies.
fn process_alive(pid: u32) -> bool {
    let proc = Path::new("/proc");
    !proc.is_dir() || proc.join(pid.to_string()).exists()
}

/// Metadata of the current holder, if the lock exists and is readable.
#[must_use]
pub fn read_lock_meta(path: &Path) -> Option<SyncLockMeta> {
    let bytes = fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data/sync.lock");

        let lock = SyncLock::acquire(&path).unwrap();
        assert_eq!(lock.meta().pid, std::process::id());
        assert_eq!(read_lock_meta(&path), Some(lock.meta().clone()));

        let err = SyncLock::acquire(&path).unwrap_err();
        assert!(matches!(err, SyncError::Locked { .. }));

        drop(lock);
        assert!(!path.exists());
        assert!(SyncLock::acquire(&path).is_ok());
    }

    fn write_meta(path: &Path, pid: u32, started_at: i64) {
        let meta = SyncLockMeta {
            pid,
            started_at,
            version: "0.0.0".to_string(),
        };
        fs::write(path, serde_json::to_vec(&meta).unwrap()).unwrap();
    }

    #[test]
    fn test_live_holder_blocks() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sync.lock");
        write_meta(&path, std::process::id(), now_secs());

        let err = SyncLock::acquire(&path).unwrap_err();
        assert!(matches!(err, SyncError::Locked { .. }));
        assert!(path.exists());
    }

    #[test]
    fn test_expired_lock_is_reclaimed() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sync.lock");
        write_meta(&path, std::process::id(), now_secs() - 2 * 60 * 60);

        let lock = SyncLock::acquire(&path).unwrap();
        assert_eq!(read_lock_meta(&path), Some(lock.meta().clone()));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_lock_of_dead_process_is_reclaimed() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sync.lock");
        // Above the kernel's pid_max ceiling, so never a running process.
        write_meta(&path, 4_194_305, now_secs());

        let lock = SyncLock::acquire(&path).unwrap();
        assert_eq!(lock.meta().pid, std::process::id());
    }

    #[test]
    fn test_unreadable_metadata_still_blocks() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sync.lock");
        fs::write(&path, "garbage").unwrap();

        match SyncLock::acquire(&path) {
            Err(SyncError::Locked { holder, .. }) => assert_eq!(holder, "unknown owner"),
            other => panic!("expected Locked, got {other:?}"),
        }
    }
}
