//! Filecache Storage Engine - filesystem-backed caching
//!
//! This crate implements the cache storage engine for filecache including:
//! - Salted-hash keying with configurable directory sharding
//! - Atomic tmp-file + rename publication
//! - Inline/external payload split with optional deflate compression
//! - Per-key advisory file locks for stampede-safe computation
//! - A file store for opaque fetched content
//! - Opportunistic, bounded garbage collection of expired entries
//!
//! All coordination happens through the filesystem: independent processes
//! sharing only the cache directory observe a consistent store with no
//! central coordinator.

pub mod atomic;
pub mod codec;
pub mod fetch;
pub mod filestore;
pub mod gc;
pub mod keyspace;
pub mod lock;
pub mod meta;
pub mod store;

// Re-exports
pub use codec::Codec;
pub use keyspace::{Keyspace, Slot};
pub use meta::{FileMeta, ValueMeta};
pub use store::{CacheStats, FileCache};

pub use filecache_common::{CacheConfig, CodecKind, Error, HttpConfig, Result, Value};
