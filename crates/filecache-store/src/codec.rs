//! Value serialization and payload compression
//!
//! Values are encoded by a self-describing codec whose tag is persisted in
//! the meta record; the tag, not the writer's configuration, selects the
//! decoder on read. Encoded payloads at or above the configured threshold
//! are run through deflate and the smaller form wins.

use filecache_common::{CodecKind, Error, Result, Value};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Tag for the portable JSON encoding
pub const NATIVE_TAG: &str = "native";

/// Tag for the compact CBOR encoding
pub const COMPACT_BINARY_TAG: &str = "compact-binary";

/// A value codec identified by its persisted tag
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Codec {
    /// JSON via serde_json
    Native,
    /// CBOR via ciborium
    CompactBinary,
}

impl From<CodecKind> for Codec {
    fn from(kind: CodecKind) -> Self {
        match kind {
            CodecKind::Native => Self::Native,
            CodecKind::CompactBinary => Self::CompactBinary,
        }
    }
}

impl Codec {
    /// The tag recorded in meta for payloads this codec produced
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Native => NATIVE_TAG,
            Self::CompactBinary => COMPACT_BINARY_TAG,
        }
    }

    /// Resolve a persisted tag back to a codec
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            NATIVE_TAG => Ok(Self::Native),
            COMPACT_BINARY_TAG => Ok(Self::CompactBinary),
            other => Err(Error::UnknownCodec(other.to_string())),
        }
    }

    /// Encode a value to payload bytes
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        match self {
            Self::Native => {
                serde_json::to_vec(value).map_err(|e| Error::Serialize(e.to_string()))
            }
            Self::CompactBinary => {
                let mut buf = Vec::new();
                ciborium::into_writer(value, &mut buf)
                    .map_err(|e| Error::Serialize(e.to_string()))?;
                Ok(buf)
            }
        }
    }

    /// Decode payload bytes back into a value
    pub fn decode(&self, bytes: &[u8]) -> Result<Value> {
        match self {
            Self::Native => {
                serde_json::from_slice(bytes).map_err(|e| Error::Deserialize(e.to_string()))
            }
            Self::CompactBinary => {
                ciborium::from_reader(bytes).map_err(|e| Error::Deserialize(e.to_string()))
            }
        }
    }
}

/// Deflate `bytes` if they reach `threshold` and the result is strictly
/// smaller; returns the winning payload and whether compression was adopted
pub fn maybe_compress(bytes: Vec<u8>, threshold: usize) -> (Vec<u8>, bool) {
    if bytes.len() < threshold {
        return (bytes, false);
    }
    match deflate(&bytes) {
        Ok(compressed) if compressed.len() < bytes.len() => (compressed, true),
        _ => (bytes, false),
    }
}

fn deflate(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

/// Inflate a deflate-compressed payload
pub fn inflate(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    DeflateDecoder::new(bytes)
        .read_to_end(&mut out)
        .map_err(|e| Error::Deserialize(format!("inflate failed: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample_values() -> Vec<Value> {
        let mut map = BTreeMap::new();
        map.insert("k".to_string(), Value::from("v"));
        vec![
            Value::Null,
            Value::from(true),
            Value::from(-9_000_000_000i64),
            Value::from(2.5f64),
            Value::from("unicode: héllo"),
            Value::Bytes((0..=255u8).collect()),
            Value::List(vec![Value::from(1i64), Value::Null]),
            Value::Map(map),
        ]
    }

    #[test]
    fn test_both_codecs_roundtrip_every_variant() {
        for codec in [Codec::Native, Codec::CompactBinary] {
            for value in sample_values() {
                let bytes = codec.encode(&value).unwrap();
                let back = codec.decode(&bytes).unwrap();
                assert_eq!(back, value, "codec {codec:?}");
            }
        }
    }

    #[test]
    fn test_tag_roundtrip() {
        assert_eq!(Codec::from_tag("native").unwrap(), Codec::Native);
        assert_eq!(
            Codec::from_tag("compact-binary").unwrap(),
            Codec::CompactBinary
        );
        assert!(Codec::from_tag("igbinary").is_err());
    }

    #[test]
    fn test_compression_adopted_for_low_entropy() {
        let bytes = vec![b'a'; 1024 * 1024];
        let (payload, compressed) = maybe_compress(bytes.clone(), 8_192);
        assert!(compressed);
        assert!(payload.len() < bytes.len());
        assert_eq!(inflate(&payload).unwrap(), bytes);
    }

    #[test]
    fn test_compression_rejected_for_high_entropy() {
        // A fixed xorshift keeps this deterministic while staying incompressible
        let mut state = 0x9E37_79B9_7F4A_7C15u64;
        let mut bytes = Vec::with_capacity(1024 * 1024);
        while bytes.len() < 1024 * 1024 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            bytes.extend_from_slice(&state.to_le_bytes());
        }
        let (payload, compressed) = maybe_compress(bytes.clone(), 8_192);
        assert!(!compressed);
        assert_eq!(payload, bytes);
    }

    #[test]
    fn test_below_threshold_is_untouched() {
        let bytes = vec![b'a'; 100];
        let (payload, compressed) = maybe_compress(bytes.clone(), 8_192);
        assert!(!compressed);
        assert_eq!(payload, bytes);
    }

    #[test]
    fn test_inflate_rejects_garbage() {
        assert!(inflate(b"definitely not deflate").is_err());
    }
}
