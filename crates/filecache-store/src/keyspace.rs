//! Keying and directory sharding
//!
//! Every key maps to a slot: a base filename (the lowercase hex SHA-256 of
//! salt, domain, and key, NUL-separated) under up to three two-hex-character
//! shard directories taken from the hash prefix. Hashing removes pathological
//! key characters from paths, sharding bounds per-directory entry counts, and
//! the salt isolates instances co-located on one filesystem.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Value store meta suffix (historical name retained for format compatibility)
pub const META_SUFFIX: &str = "php";

/// External payload suffix
pub const BIN_SUFFIX: &str = "bin";

/// Per-key advisory lock suffix
pub const LOCK_SUFFIX: &str = "lock";

/// File store meta suffix
pub const FILE_META_SUFFIX: &str = "meta.php";

/// Content extension used when the caller picks none
pub const DEFAULT_CONTENT_EXT: &str = "bin";

/// Domain tag for the value store
pub const VALUE_DOMAIN: &str = "";

/// Domain tag for the file store
pub const FILE_DOMAIN: &str = "file";

/// Maps keys to on-disk slots under a fixed root
#[derive(Clone, Debug)]
pub struct Keyspace {
    root: PathBuf,
    salt: String,
    shard_depth: u8,
}

impl Keyspace {
    /// Create a keyspace rooted at `root`
    pub fn new(root: impl Into<PathBuf>, salt: impl Into<String>, shard_depth: u8) -> Self {
        Self {
            root: root.into(),
            salt: salt.into(),
            shard_depth,
        }
    }

    /// Root directory of this keyspace
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Compute the slot hash for a key
    pub fn hash(&self, domain: &str, key: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.salt.as_bytes());
        hasher.update([0u8]);
        hasher.update(domain.as_bytes());
        hasher.update([0u8]);
        hasher.update(key);
        hex::encode(hasher.finalize())
    }

    /// Resolve a key to its on-disk slot
    pub fn slot(&self, domain: &str, key: &[u8]) -> Slot {
        let hash = self.hash(domain, key);
        let mut dir = self.root.clone();
        for level in 0..usize::from(self.shard_depth) {
            dir.push(&hash[level * 2..level * 2 + 2]);
        }
        Slot { dir, base: hash }
    }
}

/// The filesystem base path derived from a key's salted hash
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Slot {
    dir: PathBuf,
    base: String,
}

impl Slot {
    /// Directory holding this slot's files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Base filename (the full hex hash)
    pub fn base(&self) -> &str {
        &self.base
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", self.base, suffix))
    }

    /// Value store meta file path
    pub fn meta_path(&self) -> PathBuf {
        self.sibling(META_SUFFIX)
    }

    /// External payload path
    pub fn bin_path(&self) -> PathBuf {
        self.sibling(BIN_SUFFIX)
    }

    /// Advisory lock file path
    pub fn lock_path(&self) -> PathBuf {
        self.sibling(LOCK_SUFFIX)
    }

    /// File store meta file path
    pub fn file_meta_path(&self) -> PathBuf {
        self.sibling(FILE_META_SUFFIX)
    }

    /// File store content path with the caller-chosen extension
    pub fn content_path(&self, ext: &str) -> PathBuf {
        self.sibling(ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        let ks = Keyspace::new("/cache", "file-cache", 2);
        assert_eq!(
            ks.hash(VALUE_DOMAIN, b"greet"),
            ks.hash(VALUE_DOMAIN, b"greet")
        );
        assert_eq!(ks.hash(VALUE_DOMAIN, b"greet").len(), 64);
    }

    #[test]
    fn test_salt_domain_and_key_isolate_slots() {
        let ks = Keyspace::new("/cache", "file-cache", 2);
        let other_salt = Keyspace::new("/cache", "another-salt", 2);

        let base = ks.hash(VALUE_DOMAIN, b"greet");
        assert_ne!(base, ks.hash(VALUE_DOMAIN, b"greet2"));
        assert_ne!(base, ks.hash(FILE_DOMAIN, b"greet"));
        assert_ne!(base, other_salt.hash(VALUE_DOMAIN, b"greet"));
    }

    #[test]
    fn test_shard_depth_layout() {
        let key = b"shard-me";
        for depth in 0..=3u8 {
            let ks = Keyspace::new("/cache", "s", depth);
            let slot = ks.slot(VALUE_DOMAIN, key);
            let hash = ks.hash(VALUE_DOMAIN, key);

            let mut expected = PathBuf::from("/cache");
            for level in 0..usize::from(depth) {
                expected.push(&hash[level * 2..level * 2 + 2]);
            }
            assert_eq!(slot.dir(), expected.as_path());
            assert_eq!(slot.base(), hash);
        }
    }

    #[test]
    fn test_slot_sibling_paths() {
        let ks = Keyspace::new("/cache", "s", 1);
        let slot = ks.slot(VALUE_DOMAIN, b"k");
        let meta = slot.meta_path();
        let name = meta.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with(".php"));
        assert!(!name.ends_with(".meta.php"));

        let file_meta = slot.file_meta_path();
        let name = file_meta.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with(".meta.php"));

        assert_eq!(slot.content_path("png").extension().unwrap(), "png");
    }
}
