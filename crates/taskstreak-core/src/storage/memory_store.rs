//! In-process store with failure injection, for tests and dry runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{decode, encode, TaskStore};
use crate::error::StoreError;
use crate::record::UserRecord;

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, String>>,
    unavailable: AtomicBool,
    delay_ms: AtomicU64,
    write_delay_ms: AtomicU64,
    writes_failing: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw bytes, bypassing encoding. Lets tests plant corrupt records.
    pub fn insert_raw(&self, user: &str, body: &str) {
        self.lock().insert(user.to_string(), body.to_string());
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Block every call for `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Hold each write for `delay` before it lands. Reads are unaffected.
    pub fn set_write_delay(&self, delay: Duration) {
        self.write_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Fail writes with [`StoreError::Unavailable`] while reads keep working.
    pub fn set_writes_failing(&self, failing: bool) {
        self.writes_failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.records.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn gate(&self) -> Result<(), StoreError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }
}

impl TaskStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn read(&self, user: &str) -> Result<UserRecord, StoreError> {
        self.gate()?;
        match self.lock().get(user) {
            Some(body) => decode(body),
            None => Err(StoreError::NotFound(user.to_string())),
        }
    }

    fn write(&self, user: &str, record: &UserRecord) -> Result<(), StoreError> {
        self.gate()?;
        let delay = self.write_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        if self.writes_failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is read-only".into()));
        }
        let body = encode(record)?;
        self.lock().insert(user.to_string(), body);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outage_switch() {
        let store = MemoryStore::new();
        store.write("kioma", &UserRecord::new(["Read"])).unwrap();
        store.set_unavailable(true);
        assert!(matches!(store.read("kioma"), Err(StoreError::Unavailable(_))));
        store.set_unavailable(false);
        assert!(store.read("kioma").is_ok());
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn failing_writes_leave_reads_working() {
        let store = MemoryStore::new();
        store.write("kioma", &UserRecord::new(["Read"])).unwrap();
        store.set_writes_failing(true);
        assert!(matches!(
            store.write("kioma", &UserRecord::new(["Walk"])),
            Err(StoreError::Unavailable(_))
        ));
        assert_eq!(store.read("kioma").unwrap().tasks[0].text, "Read");
        assert_eq!(store.write_count(), 1);
    }
}
