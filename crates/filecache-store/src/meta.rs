//! Meta records
//!
//! The meta file is the authoritative record of an entry: its presence
//! defines existence, and its rename is the publishing barrier. Records are
//! compact length-prefixed binary with a CRC32C footer so a reader can parse
//! them in microseconds and detect any corruption.
//!
//! Value meta format:
//! ```text
//! +--------+---------+-------+---------+--------+-----+------+---------+--------+
//! | Magic  | Version | Flags | Expires | TagLen | Tag | PLen | Payload | CRC32C |
//! | 4B     | 1B      | 1B    | 8B      | 1B     | var | 4B   | var     | 4B     |
//! +--------+---------+-------+---------+--------+-----+------+---------+--------+
//! ```
//!
//! File meta format:
//! ```text
//! +--------+---------+---------+---------+------+--------+
//! | Magic  | Version | Expires | PathLen | Path | CRC32C |
//! | 4B     | 1B      | 8B      | 2B      | var  | 4B     |
//! +--------+---------+---------+---------+------+--------+
//! ```

use filecache_common::{Error, Result};
use std::path::{Path, PathBuf};

/// Magic number for value store meta records
pub const VALUE_META_MAGIC: [u8; 4] = *b"FCM1";

/// Magic number for file store meta records
pub const FILE_META_MAGIC: [u8; 4] = *b"FCF1";

/// Current meta record version
pub const META_VERSION: u8 = 1;

const FLAG_INLINE: u8 = 0b0000_0001;
const FLAG_COMPRESSED: u8 = 0b0000_0010;

/// Minimum value meta size: header + empty tag + zero payload + CRC
const VALUE_META_MIN: usize = 4 + 1 + 1 + 8 + 1 + 4 + 4;

/// Minimum file meta size: header + empty path + CRC
const FILE_META_MIN: usize = 4 + 1 + 8 + 2 + 4;

/// Authoritative record for a value store entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValueMeta {
    /// Absolute expiration instant in epoch seconds; 0 means never
    pub expires_at: u64,
    /// True when the payload bytes are deflate-compressed
    pub compressed: bool,
    /// Serializer tag naming the payload encoding
    pub codec_tag: String,
    /// Inline payload bytes; `None` means the payload lives in `.bin`
    pub payload: Option<Vec<u8>>,
}

impl ValueMeta {
    /// Whether the payload is embedded in the meta file
    #[must_use]
    pub fn inline(&self) -> bool {
        self.payload.is_some()
    }

    /// Whether the entry is semantically absent at `now`
    #[must_use]
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at != 0 && self.expires_at < now
    }

    /// Serialize the record
    pub fn to_bytes(&self) -> Vec<u8> {
        let payload = self.payload.as_deref().unwrap_or(&[]);
        let mut buf = Vec::with_capacity(VALUE_META_MIN + self.codec_tag.len() + payload.len());

        buf.extend_from_slice(&VALUE_META_MAGIC);
        buf.push(META_VERSION);

        let mut flags = 0u8;
        if self.payload.is_some() {
            flags |= FLAG_INLINE;
        }
        if self.compressed {
            flags |= FLAG_COMPRESSED;
        }
        buf.push(flags);

        buf.extend_from_slice(&self.expires_at.to_le_bytes());
        buf.push(self.codec_tag.len() as u8);
        buf.extend_from_slice(self.codec_tag.as_bytes());
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(payload);

        let crc = crc32c::crc32c(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Parse a record, verifying magic, version, framing, and checksum
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < VALUE_META_MIN {
            return Err(Error::Deserialize("value meta too small".into()));
        }
        if data[0..4] != VALUE_META_MAGIC {
            return Err(Error::Deserialize("invalid value meta magic".into()));
        }
        if data[4] != META_VERSION {
            return Err(Error::Deserialize(format!(
                "unsupported meta version: {}",
                data[4]
            )));
        }
        verify_crc(data)?;

        let flags = data[5];
        let expires_at = u64::from_le_bytes(data[6..14].try_into().unwrap());

        let tag_len = data[14] as usize;
        let tag_end = 15 + tag_len;
        if data.len() < tag_end + 4 + 4 {
            return Err(Error::Deserialize("value meta tag truncated".into()));
        }
        let codec_tag = std::str::from_utf8(&data[15..tag_end])
            .map_err(|_| Error::Deserialize("value meta tag is not UTF-8".into()))?
            .to_string();

        let payload_len =
            u32::from_le_bytes(data[tag_end..tag_end + 4].try_into().unwrap()) as usize;
        let payload_end = tag_end + 4 + payload_len;
        if data.len() != payload_end + 4 {
            return Err(Error::Deserialize("value meta length mismatch".into()));
        }

        let inline = flags & FLAG_INLINE != 0;
        if !inline && payload_len != 0 {
            return Err(Error::Deserialize(
                "external value meta carries a payload".into(),
            ));
        }

        Ok(Self {
            expires_at,
            compressed: flags & FLAG_COMPRESSED != 0,
            codec_tag,
            payload: inline.then(|| data[tag_end + 4..payload_end].to_vec()),
        })
    }
}

/// Authoritative record for a file store entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileMeta {
    /// Absolute expiration instant in epoch seconds; 0 means never
    pub expires_at: u64,
    /// Absolute path of the cached content file
    pub content_path: PathBuf,
}

impl FileMeta {
    /// Whether the entry is semantically absent at `now`
    #[must_use]
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at != 0 && self.expires_at < now
    }

    /// Serialize the record
    pub fn to_bytes(&self) -> Vec<u8> {
        let path = self.content_path.to_string_lossy();
        let mut buf = Vec::with_capacity(FILE_META_MIN + path.len());

        buf.extend_from_slice(&FILE_META_MAGIC);
        buf.push(META_VERSION);
        buf.extend_from_slice(&self.expires_at.to_le_bytes());
        buf.extend_from_slice(&(path.len() as u16).to_le_bytes());
        buf.extend_from_slice(path.as_bytes());

        let crc = crc32c::crc32c(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Parse a record, verifying magic, version, framing, and checksum
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < FILE_META_MIN {
            return Err(Error::Deserialize("file meta too small".into()));
        }
        if data[0..4] != FILE_META_MAGIC {
            return Err(Error::Deserialize("invalid file meta magic".into()));
        }
        if data[4] != META_VERSION {
            return Err(Error::Deserialize(format!(
                "unsupported meta version: {}",
                data[4]
            )));
        }
        verify_crc(data)?;

        let expires_at = u64::from_le_bytes(data[5..13].try_into().unwrap());
        let path_len = u16::from_le_bytes(data[13..15].try_into().unwrap()) as usize;
        if data.len() != 15 + path_len + 4 {
            return Err(Error::Deserialize("file meta length mismatch".into()));
        }
        let path = std::str::from_utf8(&data[15..15 + path_len])
            .map_err(|_| Error::Deserialize("file meta path is not UTF-8".into()))?;

        Ok(Self {
            expires_at,
            content_path: Path::new(path).to_path_buf(),
        })
    }
}

fn verify_crc(data: &[u8]) -> Result<()> {
    let body = &data[..data.len() - 4];
    let stored = u32::from_le_bytes(data[data.len() - 4..].try_into().unwrap());
    if crc32c::crc32c(body) != stored {
        return Err(Error::Deserialize("meta checksum mismatch".into()));
    }
    Ok(())
}
