//! Key-value collaborator used by the edge operations: logs, aggregates, and proxy caches.

pub mod disk;
pub mod memory;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use disk::DiskKv;
pub use memory::MemoryKv;

pub type Result<T> = crate::Result<T>;

/// Opaque get/put/list/delete store with optional per-entry expiry.
///
/// `list` returns keys in ascending lexicographic order, which is the order log replay follows.
pub trait KvStore: Send + Sync + std::fmt::Debug {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Read and parse a JSON value. A malformed value is an error.
pub fn get_json<T: DeserializeOwned>(kv: &dyn KvStore, key: &str) -> Result<Option<T>> {
    match kv.get(key)? {
        Some(raw) => {
            let value = serde_json::from_str(&raw).with_context(|| format!("parsing kv value {key}"))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

pub fn put_json<T: Serialize + ?Sized>(
    kv: &dyn KvStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    kv.put(key, &raw, ttl)
}

/// Delete every key under `prefix`, returning how many were removed.
pub fn purge_prefix(kv: &dyn KvStore, prefix: &str) -> Result<usize> {
    let keys = kv.list(prefix)?;
    for key in &keys {
        kv.delete(key)?;
    }
    Ok(keys.len())
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

pub(crate) fn expiry_ms(ttl: Option<Duration>) -> Option<u64> {
    ttl.map(|ttl| now_ms().saturating_add(ttl.as_millis() as u64))
}

pub(crate) fn is_expired(expires_at_ms: Option<u64>) -> bool {
    expires_at_ms.is_some_and(|at| at <= now_ms())
}
