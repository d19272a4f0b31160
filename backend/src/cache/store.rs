//! Key-value stores behind the path cache.
//!
//! [`JsonDirStore`] keeps one JSON file per entry in a directory scoped to a
//! single data source identity. Writes go through a temporary file that is
//! fsynced and renamed into place, so a reader sees a complete record or
//! nothing at all. Concurrent writers are not coordinated: the last rename
//! wins.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{CacheError, CacheResult};
use crate::models::Node;

/// Storage contract for cached values.
///
/// Implementations must be `Send + Sync` so a cache can be shared by the
/// HTTP front end.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// Returns `Ok(None)` when nothing is stored.
    fn get(&self, key: &str) -> CacheResult<Option<Node>>;

    /// Store `value` under `key`, replacing any previous value.
    fn put(&self, key: &str, value: &Node) -> CacheResult<()>;

    /// Flush pending writes.
    fn sync(&self) -> CacheResult<()>;

    /// All stored records, ordered by key.
    fn entries(&self) -> CacheResult<Vec<CacheRecord>>;

    /// Remove every entry. Returns the number removed.
    fn clear(&self) -> CacheResult<usize>;
}

/// One stored entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Full cache key (`identity/track/slice` or `identity/all`)
    pub key: String,
    /// RFC 3339 timestamp of the write
    pub stored_at: String,
    /// Opaque value returned by the data source
    pub value: Node,
}

impl CacheRecord {
    pub fn new(key: &str, value: &Node) -> Self {
        Self {
            key: key.to_string(),
            stored_at: chrono::Utc::now().to_rfc3339(),
            value: value.clone(),
        }
    }
}

// =============================================================================
// Directory store
// =============================================================================

/// One JSON file per entry, named by the blake3 hash of the key.
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    /// Open (creating if needed) the store directory.
    pub fn open(dir: impl AsRef<Path>) -> CacheResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        // fail early on read-only or locked directories
        let probe = NamedTempFile::new_in(&dir)?;
        drop(probe);

        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let hash = blake3::hash(key.as_bytes());
        self.dir.join(format!("{}.json", hash.to_hex()))
    }

    fn read_record(path: &Path) -> CacheResult<CacheRecord> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl KeyValueStore for JsonDirStore {
    fn get(&self, key: &str) -> CacheResult<Option<Node>> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let record = Self::read_record(&path)?;
        if record.key != key {
            return Err(CacheError::KeyMismatch {
                expected: key.to_string(),
                found: record.key,
            });
        }
        Ok(Some(record.value))
    }

    fn put(&self, key: &str, value: &Node) -> CacheResult<()> {
        let record = CacheRecord::new(key, value);
        let content = serde_json::to_vec(&record)?;

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&content)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.entry_path(key))
            .map_err(|e| CacheError::PersistError(e.to_string()))?;
        Ok(())
    }

    fn sync(&self) -> CacheResult<()> {
        // entries are fsynced on write; flush the directory entry as well
        #[cfg(unix)]
        fs::File::open(&self.dir)?.sync_all()?;
        Ok(())
    }

    fn entries(&self) -> CacheResult<Vec<CacheRecord>> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.dir)?.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                // skip torn or foreign files
                if let Ok(record) = Self::read_record(&path) {
                    records.push(record);
                }
            }
        }
        records.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(records)
    }

    fn clear(&self) -> CacheResult<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)?.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

// =============================================================================
// In-memory store
// =============================================================================

/// Process-local store; nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, CacheRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> CacheResult<std::sync::MutexGuard<'_, BTreeMap<String, CacheRecord>>> {
        self.records
            .lock()
            .map_err(|_| CacheError::PersistError("memory store lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> CacheResult<Option<Node>> {
        Ok(self.lock()?.get(key).map(|r| r.value.clone()))
    }

    fn put(&self, key: &str, value: &Node) -> CacheResult<()> {
        self.lock()?
            .insert(key.to_string(), CacheRecord::new(key, value));
        Ok(())
    }

    fn sync(&self) -> CacheResult<()> {
        Ok(())
    }

    fn entries(&self) -> CacheResult<Vec<CacheRecord>> {
        Ok(self.lock()?.values().cloned().collect())
    }

    fn clear(&self) -> CacheResult<usize> {
        let mut records = self.lock()?;
        let n = records.len();
        records.clear();
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_dir_store_roundtrip() {
        let dir = tempdir().unwrap();
        let store = JsonDirStore::open(dir.path()).unwrap();
        let value = Node::from_json(&json!({"v": [1, 2, 3]}));

        assert_eq!(store.get("src/t1").unwrap(), None);
        store.put("src/t1", &value).unwrap();
        store.sync().unwrap();
        assert_eq!(store.get("src/t1").unwrap(), Some(value));
    }

    #[test]
    fn test_dir_store_corrupt_entry_is_error() {
        let dir = tempdir().unwrap();
        let store = JsonDirStore::open(dir.path()).unwrap();
        store.put("src/t1", &Node::from(1.0)).unwrap();

        fs::write(store.entry_path("src/t1"), b"{\"key\": \"src/t1\", \"val").unwrap();
        assert!(matches!(store.get("src/t1"), Err(CacheError::JsonError(_))));
    }

    #[test]
    fn test_dir_store_entries_and_clear() {
        let dir = tempdir().unwrap();
        let store = JsonDirStore::open(dir.path()).unwrap();
        store.put("src/b", &Node::from(2.0)).unwrap();
        store.put("src/a", &Node::from(1.0)).unwrap();

        let keys: Vec<_> = store.entries().unwrap().into_iter().map(|r| r.key).collect();
        assert_eq!(keys, vec!["src/a", "src/b"]);
        assert_eq!(store.clear().unwrap(), 2);
        assert!(store.entries().unwrap().is_empty());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        store.put("k", &Node::from("x")).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(Node::from("x")));
        assert_eq!(store.clear().unwrap(), 1);
        assert_eq!(store.get("k").unwrap(), None);
    }
}
