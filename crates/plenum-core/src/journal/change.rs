//! Change records rendered into commit messages.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical;

/// Metadata describing one staged mutation.
///
/// The first line of the resulting commit message is the human summary; the
/// trailing `op:` and `args:` lines let operators grep the governance branch
/// for specific operations.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Change {
    /// Machine-readable operation name, e.g. `ballot_open`.
    pub op: String,
    /// Human summary, used as the commit subject.
    pub msg: String,
    /// Operation arguments, serialized into the `args:` trailer.
    pub args: BTreeMap<String, Value>,
}

impl Change {
    /// Creates a change record with no arguments.
    pub fn new(op: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            msg: msg.into(),
            args: BTreeMap::new(),
        }
    }

    /// Attaches one named argument.
    ///
    /// Unserializable arguments degrade to JSON `null` rather than failing
    /// the transaction; the args trailer is advisory metadata.
    pub fn arg<T: Serialize>(mut self, key: impl Into<String>, value: &T) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.args.insert(key.into(), value);
        self
    }

    /// Renders the full commit message, summary plus trailers.
    pub fn commit_message(&self) -> String {
        let args = canonical::to_compact(&self.args).unwrap_or_else(|_| "{}".to_string());
        format!("{}\n\nop:{}\nargs:{}", self.msg, self.op, args)
    }
}
