//! The cached-value variant type
//!
//! Stored values are restricted to a tagged variant covering scalars, byte
//! strings, ordered sequences, and string-keyed mappings. Callers needing
//! richer structures encode to this variant explicitly; the meta codec tag
//! names the encoding used to persist it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A value storable in the cache
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Self::Map(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        assert!(Value::Null.is_null());
        assert_eq!(Value::from(42i64).as_int(), Some(42));
        assert_eq!(Value::from(42i64).as_float(), Some(42.0));
        assert_eq!(Value::from("hello").as_text(), Some("hello"));
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert!(Value::from("hello").as_int().is_none());
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut map = BTreeMap::new();
        map.insert("name".to_string(), Value::from("cache"));
        map.insert("hits".to_string(), Value::from(7i64));
        let value = Value::List(vec![
            Value::Null,
            Value::from(3.25f64),
            Value::Bytes(vec![0, 159, 146]),
            Value::Map(map),
        ]);

        let json = serde_json::to_vec(&value).unwrap();
        let back: Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, value);
    }
}
