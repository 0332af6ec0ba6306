//! File store operations
//!
//! The file store keeps opaque content files fetched from a local path or
//! URL, keyed like the value store but under its own root subdirectory and
//! domain tag. The meta record carries only the expiry and the absolute
//! content path; the content file itself is the payload.

use crate::atomic;
use crate::fetch;
use crate::keyspace::{Slot, DEFAULT_CONTENT_EXT, FILE_DOMAIN};
use crate::lock::KeyLock;
use crate::meta::FileMeta;
use crate::store::{unix_now, FileCache};
use filecache_common::{Error, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{debug, warn};

impl FileCache {
    fn file_slot(&self, key: &[u8]) -> Slot {
        self.file_keys().slot(FILE_DOMAIN, key)
    }

    /// Look up the cached content path for `key`; `Ok(None)` is a miss
    ///
    /// An expired entry loses both meta and content; a meta whose content
    /// file vanished is purged. Either way the caller sees a miss.
    pub fn file_path(&self, key: &[u8]) -> Result<Option<PathBuf>> {
        let slot = self.file_slot(key);
        Ok(self.load_file(&slot))
    }

    fn load_file(&self, slot: &Slot) -> Option<PathBuf> {
        let meta_path = slot.file_meta_path();
        let bytes = fs::read(&meta_path).ok()?;

        let meta = match FileMeta::from_bytes(&bytes) {
            Ok(meta) => meta,
            Err(e) => {
                debug!(path = %meta_path.display(), error = %e, "purging corrupt file meta");
                let _ = fs::remove_file(&meta_path);
                self.stats().purges.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if meta.is_expired(unix_now()) {
            let _ = fs::remove_file(&meta_path);
            let _ = fs::remove_file(&meta.content_path);
            self.stats().purges.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        if !meta.content_path.is_file() {
            debug!(path = %meta_path.display(), "purging file meta with missing content");
            let _ = fs::remove_file(&meta_path);
            self.stats().purges.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        Some(meta.content_path)
    }

    /// Return the cached content path, fetching and storing it on a miss
    ///
    /// `source` is an existing local file or a URL. Stampede-safe like
    /// `remember`: per-key exclusive lock, double-check, degraded path when
    /// the filesystem refuses locking. Fetch failures propagate.
    pub fn remember_file(
        &self,
        key: &[u8],
        ttl: Option<Duration>,
        source: &str,
        ext: Option<&str>,
    ) -> Result<PathBuf> {
        let ext = match ext {
            Some(ext) => validate_ext(ext)?,
            None => DEFAULT_CONTENT_EXT,
        };

        if let Some(path) = self.file_path(key)? {
            return Ok(path);
        }

        let slot = self.file_slot(key);
        let guard = if let Err(e) = atomic::ensure_dir(slot.dir()) {
            warn!(error = %e, "lock directory unavailable, fetching without exclusion");
            None
        } else {
            match KeyLock::acquire(&slot.lock_path()) {
                Ok(guard) => Some(guard),
                Err(e) => {
                    warn!(error = %e, "lock unavailable, fetching without exclusion");
                    None
                }
            }
        };

        if guard.is_some() {
            // Another caller may have fetched while we waited on the lock
            if let Some(path) = self.file_path(key)? {
                return Ok(path);
            }
        }

        let dest = slot.content_path(ext);
        fetch::fetch_to(source, &dest, &self.config().http)?;

        let meta = FileMeta {
            expires_at: self.expiry_at(ttl),
            content_path: dest.clone(),
        };
        atomic::write_atomic(&slot.file_meta_path(), &meta.to_bytes())?;
        self.stats().writes.fetch_add(1, Ordering::Relaxed);
        Ok(dest)
    }

    /// Remove a file store entry and its content; absent files are not an
    /// error
    pub fn delete_file(&self, key: &[u8]) {
        let slot = self.file_slot(key);
        if let Some(path) = self.load_file(&slot) {
            let _ = fs::remove_file(path);
        }
        let _ = fs::remove_file(slot.file_meta_path());
        let _ = fs::remove_file(slot.lock_path());
    }
}

/// Content extensions share the slot namespace with meta and lock files,
/// so the reserved suffixes and path metacharacters are refused
fn validate_ext(ext: &str) -> Result<&str> {
    let reserved = ext == "php" || ext == "lock" || ext == "tmp";
    if ext.is_empty() || reserved || !ext.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(Error::config(format!("invalid content extension: {ext:?}")));
    }
    Ok(ext)
}
