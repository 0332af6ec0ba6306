//! Atomic file publication
//!
//! Writers never touch a target path directly. The payload goes to a
//! randomly named `.tmp` sibling first and is renamed over the target, so a
//! reader observes either the previous complete file or the new complete
//! file, never a partial one. Rename is atomic on a single filesystem;
//! concurrent publishers yield exactly one winning final content.

use filecache_common::{Error, Result};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Mode for created cache directories
pub const DIR_MODE: u32 = 0o775;

/// Mode for published cache files
pub const FILE_MODE: u32 = 0o664;

/// Ensure a directory exists, tolerating concurrent creators
pub fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    match fs::create_dir_all(dir) {
        Ok(()) => {
            set_mode(dir, DIR_MODE);
            Ok(())
        }
        // A racing creator got there first
        Err(e) if dir.is_dir() => {
            debug!(dir = %dir.display(), error = %e, "directory created concurrently");
            Ok(())
        }
        Err(e) => Err(Error::write(dir, e)),
    }
}

/// Derive a randomly suffixed tmp sibling for a target path
pub fn tmp_sibling(path: &Path) -> PathBuf {
    let nonce: [u8; 6] = rand::random();
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{}.tmp", hex::encode(nonce)));
    PathBuf::from(name)
}

/// Publish `bytes` at `path` via tmp-file + rename
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let tmp = tmp_sibling(path);
    if let Err(e) = write_tmp(&tmp, bytes) {
        let _ = fs::remove_file(&tmp);
        return Err(Error::write(path, e));
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(Error::write(path, e));
    }
    Ok(())
}

fn write_tmp(tmp: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(tmp)?;
    // Exclusive advisory lock while the tmp file is open for writing; the
    // random name makes contention impossible, so a refusing filesystem is
    // not an error.
    if let Err(e) = file.lock() {
        debug!(tmp = %tmp.display(), error = %e, "advisory lock on tmp file unavailable");
    }
    file.write_all(bytes)?;
    set_file_mode(&file, FILE_MODE);
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) {
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(mode));
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) {}

#[cfg(unix)]
fn set_file_mode(file: &File, mode: u32) {
    let _ = file.set_permissions(fs::Permissions::from_mode(mode));
}

#[cfg(not(unix))]
fn set_file_mode(_file: &File, _mode: u32) {}
