//! Typed key→value store layered on the journal.
//!
//! Keys serialize into one path segment (`<key>.json`) under a namespace;
//! values go through the canonical codec. The store has no ACID guarantees of
//! its own — atomicity derives from the enclosing commit.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::journal::{validate_segment, ClonedRepo, Namespace};

/// A value usable as a KV key: round-trips through one path segment.
pub trait Key: Sized {
    /// Renders the key as a path segment (without the `.json` suffix).
    fn to_segment(&self) -> String;
    /// Parses a key back from its path segment.
    fn from_segment(segment: &str) -> Result<Self>;
}

impl Key for String {
    fn to_segment(&self) -> String {
        self.clone()
    }

    fn from_segment(segment: &str) -> Result<Self> {
        validate_segment(segment)?;
        Ok(segment.to_string())
    }
}

/// Typed KV over a namespace of a cloned repository tree.
///
/// Zero-sized; one `Kv` value per (key, value) type pair is conventionally
/// stored in a `const` next to the namespace it is used with.
#[derive(Clone, Copy, Debug, Default)]
pub struct Kv<K, V> {
    _marker: PhantomData<fn(K) -> V>,
}

impl<K: Key, V: Serialize + DeserializeOwned> Kv<K, V> {
    /// Creates the store handle.
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    fn file_ns(ns: &Namespace, key: &K) -> Namespace {
        ns.join(format!("{}.json", key.to_segment()))
    }

    /// Reads the value at `key`, failing with `NotExist` when absent.
    pub fn get(&self, ns: &Namespace, tree: &ClonedRepo, key: &K) -> Result<V> {
        tree.read_json(&Self::file_ns(ns, key))
    }

    /// Stages the value at `key`, overwriting any prior value.
    pub fn set(&self, ns: &Namespace, tree: &ClonedRepo, key: &K, value: &V) -> Result<()> {
        tree.write_json_staged(&Self::file_ns(ns, key), value)
    }

    /// Stages removal of the value at `key`.
    pub fn remove(&self, ns: &Namespace, tree: &ClonedRepo, key: &K) -> Result<()> {
        tree.remove_staged(&Self::file_ns(ns, key))
    }

    /// True when a value exists at `key`.
    pub fn exists(&self, ns: &Namespace, tree: &ClonedRepo, key: &K) -> bool {
        tree.exists(&Self::file_ns(ns, key))
    }

    /// Lists every key in the namespace, sorted.
    pub fn list_keys(&self, ns: &Namespace, tree: &ClonedRepo) -> Result<Vec<K>> {
        let mut keys = Vec::new();
        for name in tree.list(ns)? {
            if let Some(stem) = name.strip_suffix(".json") {
                keys.push(K::from_segment(stem)?);
            }
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::process::Command;

    use tempfile::TempDir;

    use super::Kv;
    use crate::cancel::CancelToken;
    use crate::journal::{ClonedRepo, Namespace, RepoAddress};

    fn scratch_repo(root: &Path) -> ClonedRepo {
        let remote = root.join("remote.git");
        std::fs::create_dir_all(&remote).unwrap();
        let status = Command::new("git")
            .current_dir(&remote)
            .args(["init", "--bare", "--quiet", "-b", "main", "."])
            .status()
            .unwrap();
        assert!(status.success());
        ClonedRepo::clone(
            &CancelToken::new(),
            &RepoAddress::new(remote.to_string_lossy()),
        )
        .unwrap()
    }

    #[test]
    fn set_get_list_remove() {
        let root = TempDir::new().unwrap();
        let tree = scratch_repo(root.path());
        let ns = Namespace::new(["account"]);
        let kv: Kv<String, u64> = Kv::new();

        kv.set(&ns, &tree, &"alice".to_string(), &7).unwrap();
        kv.set(&ns, &tree, &"bob".to_string(), &3).unwrap();

        assert_eq!(kv.get(&ns, &tree, &"alice".to_string()).unwrap(), 7);
        assert_eq!(
            kv.list_keys(&ns, &tree).unwrap(),
            vec!["alice".to_string(), "bob".to_string()]
        );

        kv.remove(&ns, &tree, &"alice".to_string()).unwrap();
        assert!(kv
            .get(&ns, &tree, &"alice".to_string())
            .unwrap_err()
            .is_not_exist());
    }

    #[test]
    fn missing_namespace_lists_empty() {
        let root = TempDir::new().unwrap();
        let tree = scratch_repo(root.path());
        let kv: Kv<String, u64> = Kv::new();
        assert!(kv
            .list_keys(&Namespace::new(["nothing"]), &tree)
            .unwrap()
            .is_empty());
    }
}
