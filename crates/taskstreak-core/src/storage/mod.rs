mod config;
pub mod json_store;
pub mod memory_store;
pub mod sqlite_store;

pub use config::{
    Config, NotificationsConfig, RosterConfig, SchedulerConfig, SchedulerMode, ServerConfig,
    StorageBackend, StorageConfig,
};
pub use json_store::JsonFileStore;
pub use memory_store::MemoryStore;
pub use sqlite_store::SqliteStore;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{ConfigError, StoreError};
use crate::record::UserRecord;

/// Durable per-user record storage.
///
/// Implementations are synchronous; the service runs them on the blocking
/// pool under a deadline, so a slow disk never stalls the scheduler.
pub trait TaskStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Fetch the stored record.
    ///
    /// Returns [`StoreError::NotFound`] if nothing was ever written for
    /// `user` and [`StoreError::Corrupt`] if the stored bytes do not decode.
    fn read(&self, user: &str) -> Result<UserRecord, StoreError>;

    /// Replace the stored record.
    fn write(&self, user: &str, record: &UserRecord) -> Result<(), StoreError>;
}

pub(crate) fn decode(json: &str) -> Result<UserRecord, StoreError> {
    serde_json::from_str(json).map_err(|e| StoreError::Corrupt(e.to_string()))
}

pub(crate) fn encode(record: &UserRecord) -> Result<String, StoreError> {
    serde_json::to_string_pretty(record).map_err(|e| StoreError::Corrupt(e.to_string()))
}

/// Returns the taskstreak data directory, creating it if needed.
///
/// `TASKSTREAK_DATA_DIR` wins outright. Otherwise this is
/// `~/.config/taskstreak[-dev]/`, with `TASKSTREAK_ENV=dev` selecting the
/// development directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("TASKSTREAK_DATA_DIR") {
        Some(explicit) if !explicit.is_empty() => PathBuf::from(explicit),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("TASKSTREAK_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("taskstreak-dev")
            } else {
                base_dir.join("taskstreak")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}

/// Open the backend selected in `config`, rooted at `dir`.
pub fn open_store(config: &Config, dir: &Path) -> Result<Arc<dyn TaskStore>, StoreError> {
    Ok(match config.storage.backend {
        StorageBackend::Json => Arc::new(JsonFileStore::open(dir.join("data"))?),
        StorageBackend::Sqlite => Arc::new(SqliteStore::open(&dir.join("taskstreak.db"))?),
    })
}

/// Give every roster member without a stored record a fresh one.
///
/// Returns the users that were created. Corrupt records are left alone
/// so they can be inspected; they are never overwritten here.
pub fn ensure_roster(store: &dyn TaskStore, roster: &RosterConfig) -> Result<Vec<String>, StoreError> {
    let mut created = Vec::new();
    for user in &roster.users {
        match store.read(user) {
            Ok(_) => {}
            Err(StoreError::NotFound(_)) => {
                store.write(user, &UserRecord::new(roster.default_tasks.iter().cloned()))?;
                tracing::info!(user = %user, store = store.name(), "created initial record");
                created.push(user.clone());
            }
            Err(StoreError::Corrupt(message)) => {
                tracing::warn!(user = %user, %message, "stored record is corrupt; leaving it untouched");
            }
            Err(other) => return Err(other),
        }
    }
    Ok(created)
}
