//! Per-key advisory lock files
//!
//! The lock file grants mutual exclusion for the stampede-safe compute
//! paths only; its presence or absence implies nothing about entry
//! validity, and it is never removed while contended. Locks are advisory:
//! they coordinate cooperating cache instances, not arbitrary processes.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use tracing::debug;

/// An exclusive advisory lock held on a per-key lock file
///
/// The lock is released when the guard drops, on every exit path.
#[derive(Debug)]
pub struct KeyLock {
    file: File,
}

impl KeyLock {
    /// Open-or-create the lock file and block until exclusivity is granted
    ///
    /// Errors surface both open failures and filesystems that refuse
    /// advisory locking; callers degrade to unlocked computation.
    pub fn acquire(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.lock()?;
        Ok(Self { file })
    }
}

impl Drop for KeyLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            debug!(error = %e, "lock release failed; dropped handle releases it");
        }
    }
}
