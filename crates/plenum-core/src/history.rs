//! Append-only audit log.
//!
//! Events are staged alongside the mutation that caused them and land in the
//! same commit, so a failed transaction never leaves a log entry behind. The
//! log exists for auditing, never for replay.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::journal::{ClonedRepo, Namespace};

/// Root of the history log in the governance tree.
pub fn history_ns() -> Namespace {
    Namespace::new(["history"])
}

/// One audit event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    /// Operation name, e.g. `account_transfer`.
    pub op: String,
    /// Free-form operator note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Operation arguments.
    #[serde(default)]
    pub args: BTreeMap<String, Value>,
    /// Operation result, when one is worth recording.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl Event {
    /// Creates an event with no note, arguments or result.
    pub fn new(op: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            note: None,
            args: BTreeMap::new(),
            result: None,
        }
    }

    /// Attaches the operator note.
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Attaches one named argument. Unserializable values degrade to `null`.
    pub fn arg<T: Serialize>(mut self, key: impl Into<String>, value: &T) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.args.insert(key.into(), value);
        self
    }

    /// Attaches the result value.
    pub fn result<T: Serialize>(mut self, value: &T) -> Self {
        self.result = serde_json::to_value(value).ok();
        self
    }
}

/// Stages `event` under `history/<unix-millis>-<seq>.json`.
///
/// The sequence component disambiguates events staged within the same
/// millisecond and grows monotonically across the whole log.
pub fn log_staged(cx: &CancelToken, tree: &ClonedRepo, event: &Event) -> Result<()> {
    cx.check()?;
    let millis = Utc::now().timestamp_millis();
    let seq = next_seq(tree)?;
    let ns = history_ns().join(format!("{millis}-{seq}.json"));
    tree.write_json_staged(&ns, event)
}

fn next_seq(tree: &ClonedRepo) -> Result<u64> {
    let mut max = None;
    for name in tree.list(&history_ns())? {
        let Some(stem) = name.strip_suffix(".json") else {
            continue;
        };
        let Some((_, seq)) = stem.split_once('-') else {
            continue;
        };
        if let Ok(seq) = seq.parse::<u64>() {
            max = Some(max.map_or(seq, |m: u64| m.max(seq)));
        }
    }
    Ok(max.map_or(0, |m| m + 1))
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::process::Command;

    use tempfile::TempDir;

    use super::{history_ns, log_staged, Event};
    use crate::cancel::CancelToken;
    use crate::journal::{ClonedRepo, RepoAddress};

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
    fn events_get_distinct_monotone_names() {
        let cx = CancelToken::new();
        let root = TempDir::new().unwrap();
        let tree = scratch_repo(root.path());

        log_staged(&cx, &tree, &Event::new("op_one")).unwrap();
        log_staged(&cx, &tree, &Event::new("op_two").note("second")).unwrap();
        log_staged(&cx, &tree, &Event::new("op_three").arg("k", &1)).unwrap();

        let names = tree.list(&history_ns()).unwrap();
        assert_eq!(names.len(), 3);
        let seqs: Vec<u64> = {
            let mut s: Vec<u64> = names
                .iter()
                .map(|n| {
                    n.strip_suffix(".json")
                        .and_then(|stem| stem.split_once('-'))
                        .map(|(_, seq)| seq.parse().unwrap())
                        .unwrap()
                })
                .collect();
            s.sort_unstable();
            s
        };
        assert_eq!(seqs, vec![0, 1, 2]);
    }
}
