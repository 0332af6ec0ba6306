//! Byte-stream fetcher
//!
//! Delivers the full content of a source - an existing local file or a
//! URL - to a destination path atomically. The transfer lands in a tmp
//! sibling and is renamed into place, so a partially transferred file is
//! never observable at the destination.

use crate::atomic;
use filecache_common::{Error, HttpConfig, Result};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use tracing::debug;

/// Copy `source` to `dest` atomically
///
/// A source naming an existing local file is copied; anything else is
/// treated as a URL and fetched with the configured timeouts and
/// User-Agent. On failure the tmp file is removed best-effort and a fetch
/// or write error surfaces.
pub fn fetch_to(source: &str, dest: &Path, http: &HttpConfig) -> Result<()> {
    if let Some(parent) = dest.parent() {
        atomic::ensure_dir(parent)?;
    }

    let tmp = atomic::tmp_sibling(dest);
    if let Err(e) = transfer(source, &tmp, http) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    if let Err(e) = fs::rename(&tmp, dest) {
        let _ = fs::remove_file(&tmp);
        return Err(Error::write(dest, e));
    }
    debug!(source, dest = %dest.display(), "fetched");
    Ok(())
}

fn transfer(source: &str, tmp: &Path, http: &HttpConfig) -> Result<()> {
    let mut out = File::create_new(tmp).map_err(|e| Error::write(tmp, e))?;

    if Path::new(source).is_file() {
        let mut input =
            File::open(source).map_err(|e| Error::fetch(source, e.to_string()))?;
        io::copy(&mut input, &mut out).map_err(|e| Error::fetch(source, e.to_string()))?;
    } else {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(http.connect_timeout)
            .timeout(http.read_timeout)
            .user_agent(http.user_agent.clone())
            .build()
            .map_err(|e| Error::fetch(source, e.to_string()))?;

        let mut response = client
            .get(source)
            .send()
            .map_err(|e| Error::fetch(source, e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::fetch(
                source,
                format!("HTTP status {}", response.status()),
            ));
        }
        response
            .copy_to(&mut out)
            .map_err(|e| Error::fetch(source, e.to_string()))?;
    }
    Ok(())
}
