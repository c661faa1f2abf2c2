//! In-process key-value store.

use std::collections::BTreeMap;
use std::time::Duration;

use parking_lot::Mutex;

use super::{KvStore, Result, expiry_ms, is_expired};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at_ms: Option<u64>,
}

/// Ordered in-memory [`KvStore`]. Expired entries are dropped lazily.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: Mutex<BTreeMap<String, Entry>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().values().filter(|e| !is_expired(e.expires_at_ms)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            None => return Ok(None),
            Some(entry) if !is_expired(entry.expires_at_ms) => return Ok(Some(entry.value.clone())),
            Some(_) => {}
        }
        entries.remove(key);
        Ok(None)
    }

    fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let entry = Entry { value: value.to_string(), expires_at_ms: expiry_ms(ttl) };
        self.entries.lock().insert(key.to_string(), entry);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| !is_expired(entry.expires_at_ms));
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}
