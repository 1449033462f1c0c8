//! Per-hash advisory file locks
//!
//! A lock is an exclusive `flock` on `<root>/.sprig/db/locks/<hash>.lock`.
//! The kernel drops it when the holder exits, so a crashed writer never
//! wedges the hash; what it can leave behind is an `in_progress` record,
//! which the next holder detects and reclaims.

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sprig_errors::StoreError;
use sprig_hash::Hash;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Identity written into a held lock file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOwner {
    pub pid: u32,
    pub host: String,
}

impl LockOwner {
    #[must_use]
    pub fn current() -> Self {
        Self {
            pid: std::process::id(),
            host: local_host(),
        }
    }

    /// True if the owner runs on this host and its pid no longer exists
    #[must_use]
    pub fn is_dead_locally(&self) -> bool {
        self.host == local_host() && !pid_alive(self.pid)
    }
}

impl std::fmt::Display for LockOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pid {} on {}", self.pid, self.host)
    }
}

pub(crate) fn local_host() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(target_os = "linux")]
fn pid_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

// Without procfs liveness is unknown; assume the writer is alive.
#[cfg(not(target_os = "linux"))]
fn pid_alive(_pid: u32) -> bool {
    true
}

/// Exclusive hold on one hash, released on drop
#[derive(Debug)]
pub struct InstallLock {
    hash: Hash,
    path: PathBuf,
    file: File,
}

impl InstallLock {
    #[must_use]
    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        // Closing the descriptor releases the lock as well
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::debug!(hash = %self.hash, error = %e, "failed to unlock");
        }
    }
}

/// Outcome of one non-blocking attempt
pub(crate) enum TryLock {
    Acquired(InstallLock),
    Held(Option<LockOwner>),
}

/// Try once to take the lock for `hash` at `path`
pub(crate) fn try_lock(hash: &Hash, path: &Path) -> Result<TryLock, StoreError> {
    let io_err = |e: &std::io::Error| StoreError::from_io_with_path(e, path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(&e))?;
    }
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| io_err(&e))?;

    match file.try_lock_exclusive() {
        Ok(()) => {}
        Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
            return Ok(TryLock::Held(read_owner(&mut file)));
        }
        Err(_) => {
            return Err(StoreError::LockFailed {
                path: path.display().to_string(),
            })
        }
    }

    let owner = serde_json::to_vec(&LockOwner::current()).map_err(|e| StoreError::IoError {
        message: e.to_string(),
    })?;
    file.set_len(0).map_err(|e| io_err(&e))?;
    file.seek(SeekFrom::Start(0)).map_err(|e| io_err(&e))?;
    file.write_all(&owner).map_err(|e| io_err(&e))?;
    file.flush().map_err(|e| io_err(&e))?;

    Ok(TryLock::Acquired(InstallLock {
        hash: hash.clone(),
        path: path.to_path_buf(),
        file,
    }))
}

fn read_owner(file: &mut File) -> Option<LockOwner> {
    let mut content = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut content).ok()?;
    serde_json::from_str(&content).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_second_lock_is_refused_until_drop() {
        let temp = tempdir().unwrap();
        let hash = Hash::from_data(b"pkg");
        let path = temp.path().join("locks").join("pkg.lock");

        let TryLock::Acquired(lock) = try_lock(&hash, &path).unwrap() else {
            panic!("first lock should succeed");
        };
        match try_lock(&hash, &path).unwrap() {
            TryLock::Held(owner) => assert_eq!(owner, Some(LockOwner::current())),
            TryLock::Acquired(_) => panic!("lock acquired twice"),
        }

        drop(lock);
        assert!(matches!(
            try_lock(&hash, &path).unwrap(),
            TryLock::Acquired(_)
        ));
    }

    #[test]
    fn test_current_owner_is_alive() {
        assert!(!LockOwner::current().is_dead_locally());
    }
}
