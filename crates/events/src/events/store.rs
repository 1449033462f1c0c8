use serde::{Deserialize, Serialize};

/// Install store events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StoreEvent {
    /// The per-hash lock is held by another process; waiting
    LockWaiting { hash: String },

    LockAcquired { hash: String },

    /// An in-progress record was left behind by a writer that no longer
    /// holds the lock
    StaleLockReclaimed {
        hash: String,
        pid: Option<u32>,
        host: Option<String>,
    },

    /// A record could not be parsed and is treated as absent
    CorruptRecord { hash: String, message: String },

    RecordWritten { hash: String, status: String },
}
