//! Content-addressed persistent store.
//!
//! Maps an opaque logical key (typically an absolute file path) to a SHA-256
//! digest of the key itself and stores one byte-stream entry per digest under
//! a two-level sharded directory layout:
//!
//! ```text
//! <root>/<digest[0..2]>/<digest[2..4]>/<digest>
//! ```
//!
//! The digest is computed over the *key*, not the stored bytes, so a key that
//! is reused for different content keeps addressing the same entry. The shard
//! prefixes bound directory fan-out to 256×256 subdirectories.

use crate::error::{CacheError, Result};
use log::debug;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Length of a hex-encoded 256-bit digest.
const DIGEST_HEX_LEN: usize = 64;

fn sha256_hex(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Raw byte-stream store addressed by hashed logical keys.
///
/// Has no knowledge of what is stored; see [`crate::CachePool`] for capacity
/// accounting on top of it.
pub struct ContentAddressedStore {
    root: PathBuf,
    hasher: fn(&str) -> String,
}

impl ContentAddressedStore {
    /// Creates a store rooted at `root`. The directory itself is created
    /// lazily by the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            hasher: sha256_hex,
        }
    }

    /// Test seam: swaps the digest function so path validation is reachable.
    #[cfg(test)]
    fn with_hasher(root: impl Into<PathBuf>, hasher: fn(&str) -> String) -> Self {
        Self {
            root: root.into(),
            hasher,
        }
    }

    /// Root directory of the shard tree.
    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    /// Hex digest of a logical key.
    pub(crate) fn digest(&self, key: &str) -> String {
        (self.hasher)(key)
    }

    /// Builds the sharded path for an already-computed digest.
    ///
    /// Fails with [`CacheError::InvalidDigest`] unless the digest is exactly
    /// 64 hex characters. With the built-in SHA-256 hasher this cannot fire;
    /// it guards a misbehaving replacement hasher.
    pub(crate) fn shard_path(&self, digest: &str) -> Result<PathBuf> {
        if digest.len() != DIGEST_HEX_LEN {
            return Err(CacheError::InvalidDigest(format!(
                "expected {} hex characters, got {}",
                DIGEST_HEX_LEN,
                digest.len()
            )));
        }
        if !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CacheError::InvalidDigest(format!(
                "non-hex character in digest {:?}",
                digest
            )));
        }

        Ok(self
            .root
            .join(&digest[0..2])
            .join(&digest[2..4])
            .join(digest))
    }

    /// Computes the digest for `key` and derives its sharded storage path.
    pub fn derive_path(&self, key: &str) -> Result<PathBuf> {
        let digest = self.digest(key);
        self.shard_path(&digest)
    }

    /// Whether a regular file exists for `key`.
    pub fn exists(&self, key: &str) -> bool {
        self.derive_path(key).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Opens the entry for `key` for reading. `Ok(None)` is a miss; other
    /// I/O problems are reported as errors.
    pub fn open_read(&self, key: &str) -> Result<Option<File>> {
        let path = self.derive_path(key)?;
        match File::open(&path) {
            Ok(file) => Ok(Some(file)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Copies `reader` into the entry for `key`, replacing any existing
    /// content, and returns the number of bytes written.
    ///
    /// The bytes go to a temporary file in the destination shard directory
    /// and are renamed into place once fully written, so concurrent readers
    /// never observe a partially-written entry under the final name.
    pub fn write<R: Read>(&self, key: &str, reader: &mut R) -> Result<u64> {
        let path = self.derive_path(key)?;
        let shard_dir = path.parent().expect("sharded path always has a parent");
        fs::create_dir_all(shard_dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(shard_dir)?;
        let written = io::copy(reader, &mut tmp)?;
        tmp.persist(&path)
            .map_err(|err| CacheError::from(err.error))?;

        debug!("stored {} bytes at {}", written, path.display());
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    #[test]
    fn derive_path_is_sharded_by_digest_prefix() {
        let store = ContentAddressedStore::new("/cache");
        let path = store.derive_path("/tmp/img.png").unwrap();
        let digest = store.digest("/tmp/img.png");

        assert_eq!(digest.len(), 64);
        assert_eq!(
            path,
            Path::new("/cache")
                .join(&digest[0..2])
                .join(&digest[2..4])
                .join(&digest)
        );
    }

    #[test]
    fn derive_path_is_deterministic() {
        let store = ContentAddressedStore::new("/cache");
        assert_eq!(
            store.derive_path("key").unwrap(),
            store.derive_path("key").unwrap()
        );
    }

    #[test]
    fn short_digest_is_rejected() {
        let store = ContentAddressedStore::with_hasher("/cache", |_| "abc123".to_string());
        assert!(matches!(
            store.derive_path("key"),
            Err(CacheError::InvalidDigest(_))
        ));
    }

    #[test]
    fn non_hex_digest_is_rejected() {
        let store = ContentAddressedStore::with_hasher("/cache", |_| "g".repeat(64));
        assert!(matches!(
            store.derive_path("key"),
            Err(CacheError::InvalidDigest(_))
        ));
    }

    #[test]
    fn write_then_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = ContentAddressedStore::new(dir.path());

        let written = store.write("some/key", &mut &b"payload"[..]).unwrap();
        assert_eq!(written, 7);
        assert!(store.exists("some/key"));

        let mut bytes = Vec::new();
        store
            .open_read("some/key")
            .unwrap()
            .expect("entry should exist")
            .read_to_end(&mut bytes)
            .unwrap();
        assert_eq!(bytes, b"payload");
    }

    #[test]
    fn write_replaces_existing_entry() {
        let dir = TempDir::new().unwrap();
        let store = ContentAddressedStore::new(dir.path());

        store.write("k", &mut &b"first"[..]).unwrap();
        store.write("k", &mut &b"second"[..]).unwrap();

        let mut bytes = Vec::new();
        store
            .open_read("k")
            .unwrap()
            .unwrap()
            .read_to_end(&mut bytes)
            .unwrap();
        assert_eq!(bytes, b"second");
    }

    #[test]
    fn missing_entry_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = ContentAddressedStore::new(dir.path());
        assert!(!store.exists("missing"));
        assert!(store.open_read("missing").unwrap().is_none());
    }

    #[test]
    fn write_leaves_no_temp_files_behind() {
        let dir = TempDir::new().unwrap();
        let store = ContentAddressedStore::new(dir.path());
        store.write("k", &mut &b"bytes"[..]).unwrap();

        let shard_dir = store.derive_path("k").unwrap().parent().unwrap().to_path_buf();
        let names: Vec<_> = fs::read_dir(shard_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
        assert_eq!(names[0].len(), 64);
    }

    proptest! {
        #[test]
        fn distinct_keys_derive_distinct_paths(a in ".{1,64}", b in ".{1,64}") {
            prop_assume!(a != b);
            let store = ContentAddressedStore::new("/cache");
            prop_assert_ne!(store.derive_path(&a).unwrap(), store.derive_path(&b).unwrap());
        }
    }
}
