//! One pretty-printed JSON file per user.

use std::path::PathBuf;

use super::{decode, encode, TaskStore};
use crate::error::StoreError;
use crate::record::UserRecord;

pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Open (and create) the directory holding `<user>.json` files.
    pub fn open(dir: PathBuf) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn file_for(&self, user: &str) -> Result<PathBuf, StoreError> {
        let safe = !user.is_empty()
            && user
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !safe {
            return Err(StoreError::NotFound(user.to_string()));
        }
        Ok(self.dir.join(format!("{user}.json")))
    }
}

impl TaskStore for JsonFileStore {
    fn name(&self) -> &str {
        "json"
    }

    fn read(&self, user: &str) -> Result<UserRecord, StoreError> {
        let path = self.file_for(user)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => decode(&content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(user.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, user: &str, record: &UserRecord) -> Result<(), StoreError> {
        let path = self.file_for(user)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, encode(record)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}
