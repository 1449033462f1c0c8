#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Install database for sprig
//!
//! The store maps a concrete node hash to its install record. Records are
//! one JSON file per hash, replaced atomically by rename so readers never
//! see a partial write. Writers serialize on a per-hash advisory lock that
//! works across processes sharing the same root.

mod layout;
mod lock;
mod record;

pub use layout::InstallLayout;
pub use lock::{InstallLock, LockOwner};
pub use record::{InstallRecord, InstallStatus};

use lock::TryLock;
use sprig_errors::StoreError;
use sprig_events::{AppEvent, EventEmitter, EventSender, StoreEvent};
use sprig_hash::Hash;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const INITIAL_BACKOFF: Duration = Duration::from_millis(25);
const MAX_BACKOFF: Duration = Duration::from_millis(500);

/// Durable hash -> install state registry
#[derive(Debug, Clone)]
pub struct InstallStore {
    layout: InstallLayout,
    event_sender: Option<EventSender>,
}

impl EventEmitter for InstallStore {
    fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}

impl InstallStore {
    #[must_use]
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self {
            layout: InstallLayout::new(root),
            event_sender: None,
        }
    }

    #[must_use]
    pub fn with_event_sender(mut self, sender: EventSender) -> Self {
        self.event_sender = Some(sender);
        self
    }

    #[must_use]
    pub fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    /// Create the metadata directories
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    pub async fn init(&self) -> Result<(), StoreError> {
        for dir in [
            self.layout.records_dir(),
            self.layout.locks_dir(),
            self.layout.logs_dir(),
        ] {
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| StoreError::from_io_with_path(&e, &dir))?;
        }
        Ok(())
    }

    /// Record for `hash`, if one was ever written
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CorruptRecord`] if the file exists but cannot
    /// be parsed, and an I/O error if it cannot be read.
    pub async fn lookup(&self, hash: &Hash) -> Result<Option<InstallRecord>, StoreError> {
        let path = self.layout.record_path(hash);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::from_io_with_path(&e, &path)),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| {
                let message = e.to_string();
                tracing::warn!(hash = %hash, error = %message, "corrupt install record");
                self.emit(AppEvent::Store(StoreEvent::CorruptRecord {
                    hash: hash.to_hex(),
                    message: message.clone(),
                }));
                StoreError::CorruptRecord {
                    hash: hash.to_hex(),
                    message,
                }
            })
    }

    /// True once an `installed` record exists for `hash`
    ///
    /// # Errors
    ///
    /// Propagates [`InstallStore::lookup`] errors; a corrupt record is
    /// never reported as "not installed".
    pub async fn is_installed(&self, hash: &Hash) -> Result<bool, StoreError> {
        Ok(self
            .lookup(hash)
            .await?
            .is_some_and(|record| record.is_installed()))
    }

    /// Take the exclusive lock for `hash`
    ///
    /// With a zero `timeout` a held lock fails at once with
    /// [`StoreError::AlreadyInProgressElsewhere`]; otherwise the call polls
    /// with backoff until the deadline and then fails with
    /// [`StoreError::LockTimeout`]. An `in_progress` record left by a
    /// writer that no longer holds the lock is reclaimed.
    ///
    /// # Errors
    ///
    /// Returns the errors above, or an I/O error on the lock file.
    pub async fn begin_install(
        &self,
        hash: &Hash,
        timeout: Duration,
    ) -> Result<InstallLock, StoreError> {
        let path = self.layout.lock_path(hash);
        let deadline = Instant::now() + timeout;
        let mut backoff = INITIAL_BACKOFF;
        let mut announced = false;

        let lock = loop {
            match try_lock_off_thread(hash, &path).await? {
                TryLock::Acquired(lock) => break lock,
                TryLock::Held(owner) => {
                    if timeout.is_zero() {
                        return Err(StoreError::AlreadyInProgressElsewhere {
                            hash: hash.to_hex(),
                            holder: owner.map_or_else(|| "unknown".to_string(), |o| o.to_string()),
                        });
                    }
                    if !announced {
                        announced = true;
                        tracing::info!(hash = %hash, "waiting for install lock");
                        self.emit(AppEvent::Store(StoreEvent::LockWaiting {
                            hash: hash.to_hex(),
                        }));
                    }
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(StoreError::LockTimeout {
                            hash: hash.to_hex(),
                        });
                    }
                    tokio::time::sleep(backoff.min(deadline - now)).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        };

        tracing::debug!(hash = %hash, "install lock acquired");
        self.emit(AppEvent::Store(StoreEvent::LockAcquired {
            hash: hash.to_hex(),
        }));
        self.reclaim_stale(hash).await;
        Ok(lock)
    }

    async fn reclaim_stale(&self, hash: &Hash) {
        let Ok(Some(record)) = self.lookup(hash).await else {
            return;
        };
        if record.status != InstallStatus::InProgress {
            return;
        }
        let owner = LockOwner {
            pid: record.pid,
            host: record.host.clone(),
        };
        tracing::warn!(
            hash = %hash,
            pid = record.pid,
            host = %record.host,
            dead = owner.is_dead_locally(),
            "reclaiming stale in-progress install"
        );
        self.emit(AppEvent::Store(StoreEvent::StaleLockReclaimed {
            hash: hash.to_hex(),
            pid: Some(record.pid),
            host: Some(record.host),
        }));
    }

    /// Mark `hash` as being built by this process
    ///
    /// # Errors
    ///
    /// See [`InstallStore::record_result`].
    pub async fn mark_in_progress(
        &self,
        lock: &InstallLock,
        record: InstallRecord,
    ) -> Result<(), StoreError> {
        self.record_result(
            lock,
            InstallRecord {
                status: InstallStatus::InProgress,
                ..record
            },
        )
        .await
    }

    /// Persist the outcome for the locked hash
    ///
    /// The record is written to a temporary file and renamed into place.
    /// An `installed` record is never replaced by another status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidTransition`] when downgrading an
    /// installed hash, or an I/O error if the write fails.
    pub async fn record_result(
        &self,
        lock: &InstallLock,
        mut record: InstallRecord,
    ) -> Result<(), StoreError> {
        let hash = lock.hash();
        if &record.hash != hash {
            return Err(StoreError::IoError {
                message: format!("lock for {hash} cannot write a record for {}", record.hash),
            });
        }

        if record.status != InstallStatus::Installed {
            if let Ok(Some(existing)) = self.lookup(hash).await {
                if existing.is_installed() {
                    return Err(StoreError::InvalidTransition {
                        hash: hash.to_hex(),
                        status: record.status.to_string(),
                    });
                }
            }
        }

        let owner = LockOwner::current();
        record.pid = owner.pid;
        record.host = owner.host;
        record.updated_at = chrono::Utc::now();

        let path = self.layout.record_path(hash);
        let content = serde_json::to_vec_pretty(&record).map_err(|e| StoreError::IoError {
            message: e.to_string(),
        })?;
        write_atomic(&path, &content).await?;

        tracing::debug!(hash = %hash, status = %record.status, "install record written");
        self.emit(AppEvent::Store(StoreEvent::RecordWritten {
            hash: hash.to_hex(),
            status: record.status.to_string(),
        }));
        Ok(())
    }

    /// Every readable record, sorted by name then version
    ///
    /// Corrupt records are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the records directory cannot be read.
    pub async fn list(&self) -> Result<Vec<InstallRecord>, StoreError> {
        let dir = self.layout.records_dir();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::from_io_with_path(&e, &dir)),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::from_io_with_path(&e, &dir))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(hash) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Hash::from_hex(s).ok())
            else {
                continue;
            };
            match self.lookup(&hash).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(StoreError::CorruptRecord { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        records.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.version.cmp(&b.version)));
        Ok(records)
    }
}

async fn write_atomic(path: &Path, content: &[u8]) -> Result<(), StoreError> {
    let io_err = |e: std::io::Error| StoreError::from_io_with_path(&e, path);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    let tmp = path.with_extension(format!("json.tmp-{}", std::process::id()));
    let mut file = fs::File::create(&tmp).await.map_err(io_err)?;
    file.write_all(content).await.map_err(io_err)?;
    file.sync_all().await.map_err(io_err)?;
    drop(file);
    fs::rename(&tmp, path).await.map_err(io_err)?;
    Ok(())
}

/// One non-blocking lock attempt, run on the blocking pool
async fn try_lock_off_thread(hash: &Hash, path: &Path) -> Result<TryLock, StoreError> {
    let hash = hash.clone();
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || lock::try_lock(&hash, &path))
        .await
        .map_err(|e| StoreError::IoError {
            message: format!("lock attempt did not complete: {e}"),
        })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprig_types::Version;
    use tempfile::tempdir;

    fn record(hash: &Hash, status: InstallStatus) -> InstallRecord {
        InstallRecord::new(
            hash.clone(),
            "zlib",
            Version::parse("1.3").unwrap(),
            status,
            "/prefix/zlib",
        )
    }

    #[tokio::test]
    async fn test_lookup_missing_is_none() {
        let temp = tempdir().unwrap();
        let store = InstallStore::new(temp.path());
        let hash = Hash::from_data(b"zlib");
        assert!(store.lookup(&hash).await.unwrap().is_none());
        assert!(!store.is_installed(&hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_installed_is_monotonic() {
        let temp = tempdir().unwrap();
        let store = InstallStore::new(temp.path());
        let hash = Hash::from_data(b"zlib");

        let lock = store.begin_install(&hash, Duration::ZERO).await.unwrap();
        store
            .record_result(&lock, record(&hash, InstallStatus::Installed))
            .await
            .unwrap();
        let err = store
            .record_result(&lock, record(&hash, InstallStatus::Failed))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
        assert!(store.is_installed(&hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_an_error() {
        let temp = tempdir().unwrap();
        let store = InstallStore::new(temp.path());
        store.init().await.unwrap();
        let hash = Hash::from_data(b"zlib");
        tokio::fs::write(store.layout().record_path(&hash), b"{ not json")
            .await
            .unwrap();

        let err = store.is_installed(&hash).await.unwrap_err();
        assert!(matches!(err, StoreError::CorruptRecord { .. }));
        assert!(store.list().await.unwrap().is_empty());
    }
}
