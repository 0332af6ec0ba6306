//! Configuration types for filecache
//!
//! All options carry defaults; an empty `CacheConfig::default()` yields a
//! working cache. The cache root itself is passed to the constructor, not
//! configured here, so tests can point each instance at a temp directory.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum number of shard directory levels
pub const MAX_SHARD_DEPTH: u8 = 3;

/// Cache configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Salt mixed into the slot hash; isolates instances sharing a filesystem
    pub salt: String,
    /// TTL applied when the caller passes none
    pub default_ttl: Duration,
    /// Directory fan-out levels (0..=3)
    pub shard_depth: u8,
    /// Payloads above this size go to an external `.bin` sibling
    pub max_inline_bytes: usize,
    /// Payloads at or above this size are candidates for deflate
    pub compress_threshold: usize,
    /// Value codec used by writes
    pub codec: CodecKind,
    /// Chance in [0, 1] of running a bounded GC sweep inside a set
    pub gc_probability: f64,
    /// Root subdirectory for the file store
    pub file_subdir: String,
    /// URL fetch settings
    pub http: HttpConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            salt: "file-cache".to_string(),
            default_ttl: Duration::from_secs(300),
            shard_depth: 2,
            max_inline_bytes: 262_144,
            compress_threshold: 8_192,
            codec: CodecKind::default(),
            gc_probability: 0.0,
            file_subdir: "files".to_string(),
            http: HttpConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Validate option ranges; called once at cache construction
    pub fn validate(&self) -> crate::Result<()> {
        if self.shard_depth > MAX_SHARD_DEPTH {
            return Err(crate::Error::config(format!(
                "shard_depth {} exceeds maximum {}",
                self.shard_depth, MAX_SHARD_DEPTH
            )));
        }
        if !(0.0..=1.0).contains(&self.gc_probability) {
            return Err(crate::Error::config(format!(
                "gc_probability {} outside [0, 1]",
                self.gc_probability
            )));
        }
        Ok(())
    }
}

/// Which self-describing codec a write records in the meta `s` tag
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CodecKind {
    /// Portable JSON encoding
    #[default]
    Native,
    /// Compact CBOR encoding
    CompactBinary,
}

/// Settings for the URL byte-stream fetcher
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Connection establishment timeout
    pub connect_timeout: Duration,
    /// Whole-transfer read timeout
    pub read_timeout: Duration,
    /// User-Agent header sent with fetches
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(20),
            user_agent: "FileCache/1.0".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.salt, "file-cache");
        assert_eq!(config.shard_depth, 2);
        assert_eq!(config.max_inline_bytes, 262_144);
        assert_eq!(config.http.user_agent, "FileCache/1.0");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        let config = CacheConfig {
            shard_depth: 4,
            ..CacheConfig::default()
        };
        assert!(config.validate().is_err());

        let config = CacheConfig {
            gc_probability: 1.5,
            ..CacheConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_codec_kind_tags() {
        let json = serde_json::to_string(&CodecKind::CompactBinary).unwrap();
        assert_eq!(json, "\"compact-binary\"");
    }
}
