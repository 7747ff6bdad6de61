use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings needed to open a migration handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrateConfig {
    /// Connection locator; its scheme selects the adapter.
    pub url: Option<String>,
    /// Directory holding the migration files.
    pub path: PathBuf,
    /// Upper bound on the wait for the advisory lock. Unbounded when unset.
    pub lock_timeout_secs: Option<u64>,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            url: None,
            path: PathBuf::from("./migrations"),
            lock_timeout_secs: None,
        }
    }
}

impl MigrateConfig {
    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_secs.map(Duration::from_secs)
    }
}
