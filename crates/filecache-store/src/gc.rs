//! Garbage collection of expired entries
//!
//! A sweep walks the tree depth-first and inspects every meta file it
//! finds. Expired and unparseable metas are deleted along with their
//! payload and lock siblings, up to a per-invocation deletion budget; the
//! remainder survives to the next sweep. Non-meta strays (an orphaned
//! `.bin` whose meta vanished) are harmless and left for an operator
//! sweep. Every removal is best-effort: a concurrent deleter winning a
//! race is not an error.

use crate::keyspace::{BIN_SUFFIX, LOCK_SUFFIX};
use crate::meta::{FileMeta, ValueMeta};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Dotted meta suffixes; the file store form must be tested first since
/// `.meta.php` also ends in `.php`
const FILE_META_DOT_SUFFIX: &str = ".meta.php";
const VALUE_META_DOT_SUFFIX: &str = ".php";

/// Sweep `root`, deleting at most `limit` expired or corrupt entries;
/// returns the number deleted
pub fn sweep(root: &Path, limit: usize, now: u64) -> usize {
    let mut removed = 0;
    sweep_dir(root, limit, now, &mut removed);
    removed
}

fn sweep_dir(dir: &Path, limit: usize, now: u64, removed: &mut usize) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        if *removed >= limit {
            return;
        }
        let path = entry.path();
        if path.is_dir() {
            sweep_dir(&path, limit, now, removed);
        } else if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if let Some(base) = name.strip_suffix(FILE_META_DOT_SUFFIX) {
                sweep_file_meta(&path, base, now, removed);
            } else if let Some(base) = name.strip_suffix(VALUE_META_DOT_SUFFIX) {
                sweep_value_meta(&path, base, now, removed);
            }
        }
    }
}

fn sweep_value_meta(path: &Path, base: &str, now: u64, removed: &mut usize) {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(_) => return,
    };
    match ValueMeta::from_bytes(&bytes) {
        Ok(meta) if !meta.is_expired(now) => {}
        Ok(_) => {
            let _ = fs::remove_file(path.with_file_name(format!("{base}.{BIN_SUFFIX}")));
            let _ = fs::remove_file(path.with_file_name(format!("{base}.{LOCK_SUFFIX}")));
            delete_meta(path, removed);
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "collecting unparseable meta");
            delete_meta(path, removed);
        }
    }
}

fn sweep_file_meta(path: &Path, base: &str, now: u64, removed: &mut usize) {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(_) => return,
    };
    match FileMeta::from_bytes(&bytes) {
        Ok(meta) if !meta.is_expired(now) => {}
        Ok(meta) => {
            let _ = fs::remove_file(&meta.content_path);
            let _ = fs::remove_file(path.with_file_name(format!("{base}.{LOCK_SUFFIX}")));
            delete_meta(path, removed);
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "collecting unparseable meta");
            delete_meta(path, removed);
        }
    }
}

fn delete_meta(path: &Path, removed: &mut usize) {
    if fs::remove_file(path).is_ok() {
        *removed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atomic::write_atomic;
    use crate::keyspace::{Keyspace, VALUE_DOMAIN};
    use tempfile::tempdir;

    fn write_value_entry(keys: &Keyspace, key: &[u8], expires_at: u64, external: bool) {
        let slot = keys.slot(VALUE_DOMAIN, key);
        let meta = ValueMeta {
            expires_at,
            compressed: false,
            codec_tag: "native".to_string(),
            payload: (!external).then(|| b"\"v\"".to_vec()),
        };
        if external {
            write_atomic(&slot.bin_path(), b"\"v\"").unwrap();
        }
        write_atomic(&slot.meta_path(), &meta.to_bytes()).unwrap();
        write_atomic(&slot.lock_path(), b"").unwrap();
    }

    #[test]
    fn test_sweep_deletes_min_of_expired_and_limit() {
        let dir = tempdir().unwrap();
        let keys = Keyspace::new(dir.path(), "s", 2);

        for i in 0..6u8 {
            write_value_entry(&keys, &[i], 1, false);
        }
        for i in 100..103u8 {
            write_value_entry(&keys, &[i], 0, false);
        }

        assert_eq!(sweep(dir.path(), 4, 1_000_000), 4);
        assert_eq!(sweep(dir.path(), 1000, 1_000_000), 2);
        assert_eq!(sweep(dir.path(), 1000, 1_000_000), 0);

        // Never-expiring entries survive every sweep
        for i in 100..103u8 {
            assert!(keys.slot(VALUE_DOMAIN, &[i]).meta_path().is_file());
        }
    }

    #[test]
    fn test_sweep_removes_expired_siblings() {
        let dir = tempdir().unwrap();
        let keys = Keyspace::new(dir.path(), "s", 1);
        write_value_entry(&keys, b"gone", 1, true);

        assert_eq!(sweep(dir.path(), 10, 1_000_000), 1);
        let slot = keys.slot(VALUE_DOMAIN, b"gone");
        assert!(!slot.meta_path().exists());
        assert!(!slot.bin_path().exists());
        assert!(!slot.lock_path().exists());
    }

    #[test]
    fn test_sweep_collects_unparseable_meta() {
        let dir = tempdir().unwrap();
        let keys = Keyspace::new(dir.path(), "s", 1);
        let slot = keys.slot(VALUE_DOMAIN, b"junk");
        write_atomic(&slot.meta_path(), b"not a record").unwrap();

        assert_eq!(sweep(dir.path(), 10, 0), 1);
        assert!(!slot.meta_path().exists());
    }

    #[test]
    fn test_sweep_leaves_strays_alone() {
        let dir = tempdir().unwrap();
        let keys = Keyspace::new(dir.path(), "s", 1);
        let slot = keys.slot(VALUE_DOMAIN, b"orphan");
        write_atomic(&slot.bin_path(), b"orphaned payload").unwrap();

        assert_eq!(sweep(dir.path(), 10, 1_000_000), 0);
        assert!(slot.bin_path().is_file());
    }

    #[test]
    fn test_sweep_expired_file_meta_removes_content() {
        let dir = tempdir().unwrap();
        let keys = Keyspace::new(dir.path().join("files"), "s", 1);
        let slot = keys.slot(crate::keyspace::FILE_DOMAIN, b"asset");

        let content = slot.content_path("png");
        write_atomic(&content, b"image bytes").unwrap();
        let meta = FileMeta {
            expires_at: 1,
            content_path: content.clone(),
        };
        write_atomic(&slot.file_meta_path(), &meta.to_bytes()).unwrap();

        assert_eq!(sweep(dir.path(), 10, 1_000_000), 1);
        assert!(!slot.file_meta_path().exists());
        assert!(!content.exists());
    }
}
