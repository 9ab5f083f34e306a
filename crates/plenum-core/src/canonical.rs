//! Canonical JSON codec for every value persisted to a repository tree.
//!
//! Two parties that serialize the same value must produce byte-identical
//! files, otherwise re-tallying a ballot with no new votes would dirty the
//! index and produce spurious commits. The rules:
//!
//! - maps are keyed lexicographically (schemas use `BTreeMap`);
//! - struct fields serialize in declaration order;
//! - output is pretty-printed with a trailing newline, matching what a human
//!   auditor sees when reading the governance repository directly.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Serializes `value` into canonical bytes.
pub fn to_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = serde_json::to_vec_pretty(value)?;
    buf.push(b'\n');
    Ok(buf)
}

/// Serializes `value` into a canonical string.
pub fn to_string<T: Serialize>(value: &T) -> Result<String> {
    let mut s = serde_json::to_string_pretty(value)?;
    s.push('\n');
    Ok(s)
}

/// Compact single-line rendering, used for commit-message `args:` trailers.
pub fn to_compact<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Deserializes a value previously written by [`to_bytes`].
pub fn from_slice<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    #[test]
    fn map_keys_are_ordered() {
        let mut m = BTreeMap::new();
        m.insert("z".to_string(), 1);
        m.insert("a".to_string(), 2);
        let s = super::to_string(&m).unwrap();
        assert!(s.find("\"a\"").unwrap() < s.find("\"z\"").unwrap());
        assert!(s.ends_with('\n'));
    }

    #[test]
    fn round_trip() {
        let v = vec!["x".to_string(), "y".to_string()];
        let bytes = super::to_bytes(&v).unwrap();
        let back: Vec<String> = super::from_slice(&bytes).unwrap();
        assert_eq!(v, back);
    }

    #[test]
    fn identical_values_produce_identical_bytes() {
        let mut a = BTreeMap::new();
        a.insert("k".to_string(), vec![1, 2, 3]);
        let b = a.clone();
        assert_eq!(super::to_bytes(&a).unwrap(), super::to_bytes(&b).unwrap());
    }
}
