//! Path Cache - Persist data source results per dimension path
//!
//! Values are keyed by `identity/track/slice` (or `identity/all` for
//! dimensionless sources) and survive process restarts. The cache never
//! fails a pipeline: an unopenable store turns it into a no-op, and an
//! undecodable entry reads as a miss.

pub mod store;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::api::logs::{log_debug, log_warning};
use crate::error::CacheError;
use crate::models::{path_to_string, Node};

pub use store::{CacheRecord, JsonDirStore, KeyValueStore, MemoryStore};

/// Directory where caches are stored (relative to current dir)
pub const DEFAULT_CACHE_DIR: &str = ".trackreport/cache";

/// Key used for sources that take no dimension arguments.
pub const DIMENSIONLESS_KEY: &str = "all";

/// Persistent per-path cache scoped to one data source identity.
pub struct PathCache {
    identity: String,
    store: Option<Box<dyn KeyValueStore>>,
    warned: AtomicBool,
}

impl PathCache {
    /// Open the cache for `identity` under `cache_dir`.
    ///
    /// If the store can not be opened the cache degrades to a no-op.
    pub fn open(cache_dir: impl AsRef<Path>, identity: &str) -> Self {
        let dir = Self::store_dir(cache_dir.as_ref(), identity);
        match JsonDirStore::open(&dir) {
            Ok(store) => {
                log_debug(format!("Using cache {}", dir.display()));
                Self::with_store(identity, Box::new(store))
            }
            Err(e) => {
                let cache = Self::disabled(identity);
                cache.warn_once(&e);
                cache
            }
        }
    }

    /// Use an explicit store.
    pub fn with_store(identity: &str, store: Box<dyn KeyValueStore>) -> Self {
        Self {
            identity: identity.to_string(),
            store: Some(store),
            warned: AtomicBool::new(false),
        }
    }

    /// A cache that never hits and drops every write.
    pub fn disabled(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
            store: None,
            warned: AtomicBool::new(false),
        }
    }

    /// Directory holding the entries of one source identity.
    pub fn store_dir(cache_dir: &Path, identity: &str) -> PathBuf {
        cache_dir.join(slug(identity))
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Full key for a dimension path.
    pub fn key_for(&self, path: &[String]) -> String {
        if path.is_empty() {
            format!("{}/{}", self.identity, DIMENSIONLESS_KEY)
        } else {
            format!("{}/{}", self.identity, path_to_string(path))
        }
    }

    /// Look up a cached value. Any store failure reads as a miss.
    pub fn get(&self, path: &[String]) -> Option<Node> {
        let store = self.store.as_ref()?;
        let key = self.key_for(path);
        match store.get(&key) {
            Ok(value) => value,
            Err(e) => {
                log_debug(format!("Could not get key '{}' from cache: {}", key, e));
                self.warn_once(&e);
                None
            }
        }
    }

    /// Store a value and flush it. Failures are logged and dropped.
    pub fn put(&self, path: &[String], value: &Node) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let key = self.key_for(path);
        if let Err(e) = store.put(&key, value).and_then(|_| store.sync()) {
            self.warn_once(&e);
        }
    }

    /// All stored records for this identity.
    pub fn entries(&self) -> Vec<CacheRecord> {
        self.store
            .as_ref()
            .and_then(|s| s.entries().ok())
            .unwrap_or_default()
    }

    /// Remove every entry for this identity.
    pub fn clear(&self) -> usize {
        self.store
            .as_ref()
            .and_then(|s| s.clear().ok())
            .unwrap_or(0)
    }

    fn warn_once(&self, error: &CacheError) {
        if !self.warned.swap(true, Ordering::Relaxed) {
            log_warning(format!(
                "Cache for '{}' degraded, bypassing: {}",
                self.identity, error
            ));
        }
    }
}

/// Turn a source identity into a directory name.
fn slug(identity: &str) -> String {
    identity
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '.' || c == '_' { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn path(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_roundtrip_across_reopen() {
        let dir = tempdir().unwrap();
        let value = Node::from_json(&json!({"v": 10, "xs": [1.5, 2.5]}));

        let cache = PathCache::open(dir.path(), "tests::Source");
        assert!(cache.is_enabled());
        assert_eq!(cache.get(&path(&["t1", "s1"])), None);
        cache.put(&path(&["t1", "s1"]), &value);
        drop(cache);

        let reopened = PathCache::open(dir.path(), "tests::Source");
        assert_eq!(reopened.get(&path(&["t1", "s1"])), Some(value));
    }

    #[test]
    fn test_identities_are_isolated() {
        let dir = tempdir().unwrap();
        let a = PathCache::open(dir.path(), "a::Source");
        let b = PathCache::open(dir.path(), "b::Source");
        a.put(&path(&["t1"]), &Node::from(1.0));
        assert_eq!(b.get(&path(&["t1"])), None);
    }

    #[test]
    fn test_dimensionless_key() {
        let cache = PathCache::disabled("m::f");
        assert_eq!(cache.key_for(&[]), "m::f/all");
        assert_eq!(cache.key_for(&path(&["t1", "s1"])), "m::f/t1/s1");
    }

    #[test]
    fn test_unopenable_store_degrades() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let cache = PathCache::open(&blocker, "x");
        assert!(!cache.is_enabled());
        cache.put(&path(&["t1"]), &Node::from(1.0));
        assert_eq!(cache.get(&path(&["t1"])), None);
    }

    #[test]
    fn test_corrupt_entry_is_miss() {
        let dir = tempdir().unwrap();
        let cache = PathCache::open(dir.path(), "src");
        cache.put(&path(&["t1"]), &Node::from(1.0));

        let store_dir = PathCache::store_dir(dir.path(), "src");
        for entry in std::fs::read_dir(&store_dir).unwrap().flatten() {
            std::fs::write(entry.path(), b"garbage").unwrap();
        }
        assert_eq!(cache.get(&path(&["t1"])), None);
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("my_crate::sources::Counts"), "my_crate-sources-Counts");
    }
}
