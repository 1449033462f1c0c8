//! Fixed names inside an install root
//!
//! These are not configurable so that every process sharing a root agrees
//! on where records and locks live.

/// Metadata directory at the top of an install root
pub const META_DIR: &str = ".sprig";

pub const DB_DIR: &str = "db";
pub const RECORDS_DIR: &str = "records";
pub const LOCKS_DIR: &str = "locks";
pub const LOGS_DIR: &str = "logs";
pub const STAGE_DIR: &str = "stage";

/// Used when the platform has no data directory
pub const FALLBACK_ROOT: &str = "/opt/sprig";

pub const CONFIG_FILE: &str = "config.toml";
