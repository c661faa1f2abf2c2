//! Client storage persisted as a single JSON file.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use directories::ProjectDirs;
use parking_lot::Mutex;
use tempfile::NamedTempFile;

use super::{ClientStorage, Result};

const APP_QUALIFIER: &str = "com";
const APP_ORGANISATION: &str = "MangaSite";
const APP_NAME: &str = "manga-site";
const FILE_NAME: &str = "client-storage.json";

/// File-backed [`ClientStorage`]. Every write replaces the file atomically.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    /// Storage file under the user's data directory.
    pub fn open_default() -> Result<Self> {
        let dir = ProjectDirs::from(APP_QUALIFIER, APP_ORGANISATION, APP_NAME)
            .map(|dirs| dirs.data_dir().join("state"))
            .ok_or_else(|| anyhow!("unable to resolve application data directory"))?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating storage directory at {}", dir.display()))?;
        Ok(Self::new(dir.join(FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<BTreeMap<String, String>> {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("parsing {}", self.path.display())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let parent = self.path.parent().ok_or_else(|| {
            anyhow!("storage path {} does not have a parent directory", self.path.display())
        })?;
        fs::create_dir_all(parent)?;
        let data = serde_json::to_vec_pretty(entries)?;
        let mut temp = NamedTempFile::new_in(parent)
            .with_context(|| format!("allocating temp file in {}", parent.display()))?;
        temp.write_all(&data)?;
        temp.flush()?;
        match temp.persist(&self.path) {
            Ok(_) => Ok(()),
            Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
                if let Err(remove_err) = fs::remove_file(&self.path) {
                    if remove_err.kind() != io::ErrorKind::NotFound {
                        return Err(remove_err.into());
                    }
                }
                err.file.persist(&self.path).map(|_| ()).map_err(|err| err.error.into())
            }
            Err(err) => Err(err.error.into()),
        }
    }

    fn modify(&self, apply: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<()> {
        let _guard = self.lock.lock();
        let mut entries = self.read_entries()?;
        apply(&mut entries);
        self.write_entries(&entries)
    }
}

impl ClientStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock();
        Ok(self.read_entries()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.modify(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.modify(|entries| {
            entries.remove(key);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_survive_a_new_handle() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join(FILE_NAME);

        let first = FileStorage::new(&path);
        first.set("reading-progress-solo", "42")?;
        first.set("other", "x")?;
        first.remove("other")?;

        let second = FileStorage::new(&path);
        assert_eq!(second.get("reading-progress-solo")?, Some("42".to_string()));
        assert_eq!(second.get("other")?, None);
        Ok(())
    }

    #[test]
    fn missing_file_reads_empty() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = FileStorage::new(dir.path().join(FILE_NAME));
        assert_eq!(storage.get("anything")?, None);
        Ok(())
    }
}
