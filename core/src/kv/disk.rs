//! Disk-backed key-value store with a sharded directory layout.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Error, anyhow};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::warn;

use super::{KvStore, Result, expiry_ms, is_expired};

const SHARD_LEN: usize = 2;
const EXTENSION: &str = "json";

/// On-disk record. The plain key is kept so listing can filter by prefix.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    key: String,
    value: String,
    expires_at_ms: Option<u64>,
}

/// Persists each entry in its own file under `root/ab/cd/<hash>.json`.
#[derive(Debug, Clone)]
pub struct DiskKv {
    root: PathBuf,
}

impl DiskKv {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("creating kv root directory at {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        let hash = blake3::hash(key.as_bytes());
        let hex = hash.to_hex();
        let (shard_one, remainder) = hex.as_str().split_at(SHARD_LEN);
        let (shard_two, remainder) = remainder.split_at(SHARD_LEN);
        self.root.join(shard_one).join(shard_two).join(format!("{remainder}.{EXTENSION}"))
    }

    fn read_envelope(path: &Path) -> Result<Option<Envelope>> {
        match fs::read(path) {
            Ok(bytes) => {
                let envelope = serde_json::from_slice(&bytes)
                    .with_context(|| format!("parsing kv entry {}", path.display()))?;
                Ok(Some(envelope))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn remove_path(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for shard_one in read_dirs(&self.root)? {
            for shard_two in read_dirs(&shard_one)? {
                for entry in fs::read_dir(&shard_two)
                    .with_context(|| format!("reading {}", shard_two.display()))?
                {
                    let path = entry?.path();
                    if path.extension().and_then(|ext| ext.to_str()) == Some(EXTENSION) {
                        files.push(path);
                    }
                }
            }
        }
        Ok(files)
    }
}

fn read_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}

impl KvStore for DiskKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match Self::read_envelope(&path)? {
            Some(envelope) if is_expired(envelope.expires_at_ms) => {
                Self::remove_path(&path)?;
                Ok(None)
            }
            Some(envelope) => Ok(Some(envelope.value)),
            None => Ok(None),
        }
    }

    fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let path = self.path_for(key);
        let parent = path.parent().ok_or_else(|| {
            anyhow!("derived kv path {} does not have a parent directory", path.display())
        })?;
        fs::create_dir_all(parent)
            .with_context(|| format!("creating kv shard directory at {}", parent.display()))?;

        let envelope =
            Envelope { key: key.to_string(), value: value.to_string(), expires_at_ms: expiry_ms(ttl) };
        let bytes = serde_json::to_vec(&envelope)?;
        let mut tmp = NamedTempFile::new_in(parent)
            .with_context(|| format!("allocating temp file in {}", parent.display()))?;
        tmp.write_all(&bytes).with_context(|| format!("writing {}", path.display()))?;
        tmp.flush().with_context(|| format!("flushing {}", path.display()))?;
        tmp.persist(&path).map_err(|err| Error::from(err.error))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        Self::remove_path(&self.path_for(key))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for path in self.entry_files()? {
            let envelope = match Self::read_envelope(&path) {
                Ok(Some(envelope)) => envelope,
                Ok(None) => continue,
                Err(err) => {
                    warn!(target: "kv::disk", path = %path.display(), error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if is_expired(envelope.expires_at_ms) {
                Self::remove_path(&path)?;
            } else if envelope.key.starts_with(prefix) {
                keys.push(envelope.key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}
