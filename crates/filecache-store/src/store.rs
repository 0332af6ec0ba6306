//! Value store operations
//!
//! The value store persists encoded values under salted-hash slots. The
//! meta file is the entry's existence marker and is always published by
//! atomic rename; external payloads are published to the `.bin` sibling
//! before the meta that references them, so a reader observing a new meta
//! always finds its payload. Corrupt, torn, or expired entries are purged
//! on read and reported as misses - readers recover, they never fail.

use crate::atomic;
use crate::codec::{self, Codec};
use crate::gc;
use crate::keyspace::{Keyspace, Slot, VALUE_DOMAIN};
use crate::lock::KeyLock;
use filecache_common::{CacheConfig, Error, Result, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Deletion budget for the GC sweep a set triggers opportunistically
const OPPORTUNISTIC_GC_LIMIT: usize = 100;

/// Current wall-clock time in epoch seconds
pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Engine statistics for monitoring
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Reads that returned a live value
    pub hits: AtomicU64,
    /// Reads that returned nothing
    pub misses: AtomicU64,
    /// Entries published
    pub writes: AtomicU64,
    /// Entries purged during reads (expired or corrupt)
    pub purges: AtomicU64,
    /// Entries removed by garbage collection
    pub gc_removed: AtomicU64,
}

impl CacheStats {
    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64
    }

    /// Reset all statistics
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
        self.purges.store(0, Ordering::Relaxed);
        self.gc_removed.store(0, Ordering::Relaxed);
    }
}

/// A filesystem-backed cache instance
///
/// All state lives under the root directory; independent processes opening
/// the same root with the same salt observe one shared cache. Construct an
/// instance explicitly and hand it to callers through their normal
/// dependency channels; tests point each instance at a temp directory.
#[derive(Debug)]
pub struct FileCache {
    root: PathBuf,
    config: CacheConfig,
    keys: Keyspace,
    file_keys: Keyspace,
    stats: CacheStats,
}

impl FileCache {
    /// Open a cache rooted at `root`, creating the directory if needed
    ///
    /// Fails with a configuration error when the root cannot be created or
    /// is not writable; nothing else is fatal at construction.
    pub fn open(root: impl AsRef<Path>, config: CacheConfig) -> Result<Self> {
        config.validate()?;

        let root = root.as_ref();
        fs::create_dir_all(root).map_err(|e| {
            Error::config(format!("cache root {} is uncreatable: {e}", root.display()))
        })?;
        let root = fs::canonicalize(root).map_err(|e| {
            Error::config(format!("cache root {} is unresolvable: {e}", root.display()))
        })?;

        // Unwritable roots must fail now, not on first set
        let probe = atomic::tmp_sibling(&root.join(".writable"));
        fs::write(&probe, b"").map_err(|e| {
            Error::config(format!("cache root {} is not writable: {e}", root.display()))
        })?;
        let _ = fs::remove_file(&probe);

        let keys = Keyspace::new(root.clone(), config.salt.clone(), config.shard_depth);
        let file_keys = Keyspace::new(
            root.join(&config.file_subdir),
            config.salt.clone(),
            config.shard_depth,
        );

        Ok(Self {
            root,
            config,
            keys,
            file_keys,
            stats: CacheStats::default(),
        })
    }

    /// Cache root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Active configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Engine statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub(crate) fn file_keys(&self) -> &Keyspace {
        &self.file_keys
    }

    fn slot(&self, key: &[u8]) -> Slot {
        self.keys.slot(VALUE_DOMAIN, key)
    }

    /// Look up a value; `Ok(None)` is a miss
    ///
    /// Expired and corrupt entries are purged on the way out. A stored
    /// `Value::Null` is a hit and is distinguishable from a miss.
    pub fn get(&self, key: &[u8]) -> Result<Option<Value>> {
        let slot = self.slot(key);
        match self.load(&slot) {
            Some(value) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(value))
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    fn load(&self, slot: &Slot) -> Option<Value> {
        let meta_path = slot.meta_path();
        let meta_bytes = match fs::read(&meta_path) {
            Ok(bytes) => bytes,
            Err(_) => return None,
        };

        let meta = match crate::meta::ValueMeta::from_bytes(&meta_bytes) {
            Ok(meta) => meta,
            Err(e) => {
                debug!(path = %meta_path.display(), error = %e, "purging corrupt meta");
                self.purge_entry(slot);
                return None;
            }
        };

        if meta.is_expired(unix_now()) {
            self.purge_entry(slot);
            return None;
        }

        let raw = match meta.payload {
            Some(inline) => inline,
            None => match fs::read(slot.bin_path()) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    // The payload vanished under us; the meta is a lie now
                    debug!(path = %meta_path.display(), "purging meta with missing payload");
                    let _ = fs::remove_file(&meta_path);
                    self.stats.purges.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
                // Transient read error: miss, but keep the entry
                Err(_) => return None,
            },
        };

        let raw = if meta.compressed {
            match codec::inflate(&raw) {
                Ok(bytes) => bytes,
                Err(e) => {
                    debug!(path = %meta_path.display(), error = %e, "purging undecompressable entry");
                    self.purge_entry(slot);
                    return None;
                }
            }
        } else {
            raw
        };

        let decoded = Codec::from_tag(&meta.codec_tag)
            .and_then(|codec| codec.decode(&raw));
        match decoded {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(path = %meta_path.display(), error = %e, "purging undecodable entry");
                self.purge_entry(slot);
                None
            }
        }
    }

    /// Store a value under `key`
    ///
    /// `None` applies the configured default TTL; a zero TTL never expires.
    pub fn set(&self, key: &[u8], value: &Value, ttl: Option<Duration>) -> Result<()> {
        let slot = self.slot(key);
        let expires_at = self.expiry_at(ttl);

        let codec = Codec::from(self.config.codec);
        let encoded = codec.encode(value)?;
        let (payload, compressed) =
            codec::maybe_compress(encoded, self.config.compress_threshold);

        if payload.len() <= self.config.max_inline_bytes {
            let meta = crate::meta::ValueMeta {
                expires_at,
                compressed,
                codec_tag: codec.tag().to_string(),
                payload: Some(payload),
            };
            atomic::write_atomic(&slot.meta_path(), &meta.to_bytes())?;
            // A previous generation may have been external
            let _ = fs::remove_file(slot.bin_path());
        } else {
            // Payload first: a reader who sees the new meta must find it
            atomic::write_atomic(&slot.bin_path(), &payload)?;
            let meta = crate::meta::ValueMeta {
                expires_at,
                compressed,
                codec_tag: codec.tag().to_string(),
                payload: None,
            };
            atomic::write_atomic(&slot.meta_path(), &meta.to_bytes())?;
        }

        self.stats.writes.fetch_add(1, Ordering::Relaxed);
        self.maybe_gc();
        Ok(())
    }

    /// Remove an entry; absent files are not an error
    pub fn delete(&self, key: &[u8]) {
        let slot = self.slot(key);
        let _ = fs::remove_file(slot.meta_path());
        let _ = fs::remove_file(slot.bin_path());
        let _ = fs::remove_file(slot.lock_path());
    }

    /// Cheap presence probe: meta parse and TTL check, no payload load
    pub fn exists(&self, key: &[u8]) -> bool {
        let slot = self.slot(key);
        let meta_bytes = match fs::read(slot.meta_path()) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        match crate::meta::ValueMeta::from_bytes(&meta_bytes) {
            Ok(meta) if !meta.is_expired(unix_now()) => true,
            Ok(_) => {
                self.purge_entry(&slot);
                false
            }
            Err(_) => {
                self.purge_entry(&slot);
                false
            }
        }
    }

    /// Return the cached value, computing and storing it on a miss
    ///
    /// Under concurrent callers for the same key, at most one per host runs
    /// `compute`; the rest observe the freshly written value. When the
    /// filesystem refuses advisory locking the caller computes without
    /// exclusion - liveness over deduplication, the result is still correct.
    pub fn remember<F>(&self, key: &[u8], ttl: Option<Duration>, compute: F) -> Result<Value>
    where
        F: FnOnce() -> Result<Value>,
    {
        if let Some(value) = self.get(key)? {
            return Ok(value);
        }

        let slot = self.slot(key);
        let guard = if let Err(e) = atomic::ensure_dir(slot.dir()) {
            warn!(error = %e, "lock directory unavailable, computing without exclusion");
            None
        } else {
            match KeyLock::acquire(&slot.lock_path()) {
                Ok(guard) => Some(guard),
                Err(e) => {
                    warn!(error = %e, "lock unavailable, computing without exclusion");
                    None
                }
            }
        };

        if guard.is_some() {
            // Another caller may have published while we waited on the lock
            if let Some(value) = self.get(key)? {
                return Ok(value);
            }
        }

        let value = compute()?;
        self.set(key, &value, ttl)?;
        Ok(value)
    }

    /// Delete every file under the root, then the emptied directories
    ///
    /// Entries added concurrently may survive the pass.
    pub fn clear(&self) {
        clear_dir(&self.root);
    }

    /// Sweep expired entries, deleting at most `limit`; returns the count
    pub fn gc(&self, limit: usize) -> usize {
        let removed = gc::sweep(&self.root, limit, unix_now());
        self.stats
            .gc_removed
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    fn maybe_gc(&self) {
        let probability = self.config.gc_probability;
        if probability > 0.0 && rand::random::<f64>() < probability {
            let removed = self.gc(OPPORTUNISTIC_GC_LIMIT);
            debug!(removed, "opportunistic gc");
        }
    }

    pub(crate) fn expiry_at(&self, ttl: Option<Duration>) -> u64 {
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        if ttl.is_zero() {
            0
        } else {
            // A nonzero TTL must never collapse to "never expires"
            unix_now().saturating_add(ttl.as_secs().max(1))
        }
    }

    fn purge_entry(&self, slot: &Slot) {
        let _ = fs::remove_file(slot.meta_path());
        let _ = fs::remove_file(slot.bin_path());
        self.stats.purges.fetch_add(1, Ordering::Relaxed);
    }
}

fn clear_dir(dir: &Path) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            clear_dir(&path);
            let _ = fs::remove_dir(&path);
        } else {
            let _ = fs::remove_file(&path);
        }
    }
}
