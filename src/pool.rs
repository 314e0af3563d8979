//! Capacity-bounded cache pool over the content-addressed store.
//!
//! Adds byte accounting and LRU eviction on top of
//! [`ContentAddressedStore`]. The access-order index lives in memory only; on
//! construction it is rebuilt from the shard tree, seeded oldest-first by
//! file modification time.
//!
//! Every operation here is fail-open: an I/O problem is logged and reported
//! as a miss (`try_get`) or as `false` (`put`), never as an error. A cache
//! failure must not block the caller from using a freshly computed result.

use crate::store::ContentAddressedStore;
use log::{debug, info, warn};
use lru::LruCache;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Disk-backed cache with byte-capacity LRU eviction.
pub struct CachePool {
    store: ContentAddressedStore,
    capacity_bytes: u64,
    index: Mutex<PoolIndex>,
}

/// Access-order index: digest → entry size. Mutated only under the pool
/// mutex so eviction and insertion never double-count the byte total.
struct PoolIndex {
    entries: LruCache<String, u64>,
    total_bytes: u64,
}

impl CachePool {
    /// Opens (or creates) a pool rooted at `root` with the given byte
    /// capacity, rebuilding the access-order index from entries already on
    /// disk.
    pub fn new(root: impl Into<PathBuf>, capacity_bytes: u64) -> crate::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let store = ContentAddressedStore::new(&root);

        let mut entries = LruCache::unbounded();
        let mut total_bytes = 0u64;
        let mut found = scan_shard_tree(&root);
        // Oldest first, so the most recently touched entry ends up MRU.
        found.sort_by_key(|(_, _, mtime)| *mtime);
        for (digest, size, _) in found {
            total_bytes += size;
            entries.put(digest, size);
        }

        debug!(
            "cache pool opened at {} ({} entries, {} bytes)",
            root.display(),
            entries.len(),
            total_bytes
        );

        Ok(Self {
            store,
            capacity_bytes,
            index: Mutex::new(PoolIndex {
                entries,
                total_bytes,
            }),
        })
    }

    /// Reads the entry for `key`, promoting it to most recently used.
    /// Returns `None` on a miss or on any read failure.
    pub fn try_get(&self, key: &str) -> Option<Vec<u8>> {
        let digest = self.store.digest(key);
        let mut file = match self.store.open_read(key) {
            Ok(Some(file)) => file,
            Ok(None) => {
                info!("cache MISS: {}", key);
                // Entry vanished behind our back (external cleanup); drop it
                // from the accounting.
                let mut index = self.index.lock().unwrap();
                if let Some(size) = index.entries.pop(&digest) {
                    index.total_bytes = index.total_bytes.saturating_sub(size);
                }
                return None;
            }
            Err(err) => {
                warn!("cache read failed for {}: {}", key, err);
                return None;
            }
        };

        let mut bytes = Vec::new();
        if let Err(err) = file.read_to_end(&mut bytes) {
            warn!("cache read failed for {}: {}", key, err);
            return None;
        }

        info!("cache HIT: {} ({} bytes)", key, bytes.len());
        let mut index = self.index.lock().unwrap();
        if index.entries.get(&digest).is_none() {
            // On-disk entry the scan never saw; adopt it.
            index.total_bytes += bytes.len() as u64;
            index.entries.put(digest, bytes.len() as u64);
        }
        Some(bytes)
    }

    /// Writes `bytes` as the entry for `key`, then evicts least-recently-used
    /// entries until the byte total fits the capacity again.
    ///
    /// Returns `false` on any I/O failure. Replacing an existing key adjusts
    /// the total by the size delta.
    pub fn put(&self, key: &str, bytes: &[u8]) -> bool {
        let written = match self.store.write(key, &mut &bytes[..]) {
            Ok(written) => written,
            Err(err) => {
                warn!("cache write failed for {}: {}", key, err);
                return false;
            }
        };
        info!("cache PUT: {} ({} bytes)", key, written);

        let digest = self.store.digest(key);
        let mut index = self.index.lock().unwrap();
        if let Some(old) = index.entries.put(digest, written) {
            index.total_bytes = index.total_bytes.saturating_sub(old);
        }
        index.total_bytes += written;
        self.evict_locked(&mut index);
        true
    }

    /// Whether an entry exists for `key`. Does not touch the access order.
    pub fn contains(&self, key: &str) -> bool {
        self.store.exists(key)
    }

    /// Deletes every entry and resets the byte accounting to zero.
    pub fn clear(&self) {
        let mut index = self.index.lock().unwrap();
        if let Ok(level1) = fs::read_dir(self.store.root()) {
            for entry in level1.flatten() {
                let path = entry.path();
                // Only shard directories (two hex characters) belong to us.
                if path.is_dir() && is_shard_dir_name(&entry.file_name()) {
                    if let Err(err) = fs::remove_dir_all(&path) {
                        warn!("failed to clear {}: {}", path.display(), err);
                    }
                }
            }
        }
        index.entries.clear();
        index.total_bytes = 0;
        info!("cache cleared");
    }

    /// Current byte total held by the accounting index.
    pub fn total_bytes(&self) -> u64 {
        self.index.lock().unwrap().total_bytes
    }

    /// Number of tracked entries.
    pub fn len(&self) -> usize {
        self.index.lock().unwrap().entries.len()
    }

    /// Whether the pool holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity in bytes.
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }

    /// Pops LRU entries and deletes their files until the total fits the
    /// budget. An entry larger than the whole budget evicts itself; the
    /// caller still holds its bytes in memory.
    fn evict_locked(&self, index: &mut PoolIndex) {
        while index.total_bytes > self.capacity_bytes {
            let Some((digest, size)) = index.entries.pop_lru() else {
                break;
            };
            index.total_bytes = index.total_bytes.saturating_sub(size);
            match self.store.shard_path(&digest) {
                Ok(path) => {
                    if let Err(err) = fs::remove_file(&path) {
                        warn!("failed to evict {}: {}", path.display(), err);
                    } else {
                        debug!("evicted {} ({} bytes)", digest, size);
                    }
                }
                Err(err) => warn!("unevictable index entry: {}", err),
            }
        }
    }
}

fn is_shard_dir_name(name: &std::ffi::OsStr) -> bool {
    name.to_str()
        .map(|s| s.len() == 2 && s.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false)
}

/// Walks the two shard levels and collects `(digest, size, mtime)` for every
/// plausible entry file. Unreadable pieces are skipped.
fn scan_shard_tree(root: &Path) -> Vec<(String, u64, SystemTime)> {
    let mut found = Vec::new();
    let Ok(level1) = fs::read_dir(root) else {
        return found;
    };
    for first in level1.flatten().filter(|e| e.path().is_dir()) {
        let Ok(level2) = fs::read_dir(first.path()) else {
            continue;
        };
        for second in level2.flatten().filter(|e| e.path().is_dir()) {
            let Ok(files) = fs::read_dir(second.path()) else {
                continue;
            };
            for file in files.flatten() {
                let name = file.file_name();
                let Some(digest) = name.to_str() else {
                    continue;
                };
                if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                    continue;
                }
                let Ok(meta) = file.metadata() else {
                    continue;
                };
                if !meta.is_file() {
                    continue;
                }
                let mtime = meta.modified().unwrap_or(UNIX_EPOCH);
                found.push((digest.to_string(), meta.len(), mtime));
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn put_then_try_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let pool = CachePool::new(dir.path(), GIB_TEST).unwrap();

        assert!(pool.put("/tmp/a.png", b"abcdef"));
        assert_eq!(pool.try_get("/tmp/a.png").unwrap(), b"abcdef");
        assert!(pool.contains("/tmp/a.png"));
    }

    #[test]
    fn miss_returns_none() {
        let dir = TempDir::new().unwrap();
        let pool = CachePool::new(dir.path(), GIB_TEST).unwrap();
        assert!(pool.try_get("/nope").is_none());
        assert!(!pool.contains("/nope"));
    }

    #[test]
    fn double_put_does_not_double_count() {
        let dir = TempDir::new().unwrap();
        let pool = CachePool::new(dir.path(), GIB_TEST).unwrap();

        assert!(pool.put("k", b"same-bytes"));
        assert!(pool.put("k", b"same-bytes"));

        assert_eq!(pool.len(), 1);
        assert_eq!(pool.total_bytes(), b"same-bytes".len() as u64);
        assert_eq!(pool.try_get("k").unwrap(), b"same-bytes");
    }

    #[test]
    fn replacement_adjusts_total_by_delta() {
        let dir = TempDir::new().unwrap();
        let pool = CachePool::new(dir.path(), GIB_TEST).unwrap();

        pool.put("k", b"four");
        pool.put("k", b"twelve-chars");
        assert_eq!(pool.total_bytes(), 12);
    }

    #[test]
    fn eviction_keeps_total_under_capacity() {
        let dir = TempDir::new().unwrap();
        let pool = CachePool::new(dir.path(), 25).unwrap();

        pool.put("a", &[0u8; 10]);
        pool.put("b", &[0u8; 10]);
        pool.put("c", &[0u8; 10]);

        assert!(pool.total_bytes() <= 25);
        assert_eq!(pool.len(), 2);
        // "a" was least recently used and must be gone from disk.
        assert!(!pool.contains("a"));
        assert!(pool.contains("b"));
        assert!(pool.contains("c"));
    }

    #[test]
    fn try_get_promotes_against_eviction() {
        let dir = TempDir::new().unwrap();
        let pool = CachePool::new(dir.path(), 25).unwrap();

        pool.put("a", &[0u8; 10]);
        pool.put("b", &[0u8; 10]);
        // Touch "a" so "b" becomes the eviction candidate.
        assert!(pool.try_get("a").is_some());
        pool.put("c", &[0u8; 10]);

        assert!(pool.contains("a"));
        assert!(!pool.contains("b"));
        assert!(pool.contains("c"));
    }

    #[test]
    fn clear_removes_entries_and_resets_accounting() {
        let dir = TempDir::new().unwrap();
        let pool = CachePool::new(dir.path(), GIB_TEST).unwrap();

        pool.put("a", b"bytes");
        pool.put("b", b"bytes");
        pool.clear();

        assert!(pool.is_empty());
        assert_eq!(pool.total_bytes(), 0);
        assert!(!pool.contains("a"));
        assert!(pool.try_get("b").is_none());
    }

    #[test]
    fn reopen_rebuilds_accounting_from_disk() {
        let dir = TempDir::new().unwrap();
        {
            let pool = CachePool::new(dir.path(), GIB_TEST).unwrap();
            pool.put("a", b"12345");
            pool.put("b", b"123");
        }

        let reopened = CachePool::new(dir.path(), GIB_TEST).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.total_bytes(), 8);
        assert_eq!(reopened.try_get("a").unwrap(), b"12345");
    }

    #[test]
    fn oversized_entry_is_still_served_in_memory() {
        let dir = TempDir::new().unwrap();
        let pool = CachePool::new(dir.path(), 4).unwrap();

        // Larger than the whole budget: the write succeeds, then eviction
        // reclaims it.
        assert!(pool.put("big", &[0u8; 16]));
        assert!(pool.total_bytes() <= 4);
    }

    const GIB_TEST: u64 = 1024 * 1024 * 1024;
}
