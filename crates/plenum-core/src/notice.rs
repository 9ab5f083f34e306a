//! Notices: user-facing messages produced by policy handlers.
//!
//! The kernel stores notices as data in a per-motion queue; rendering them
//! (to an issue tracker, chat, or anywhere else) is a front-end concern.
//! Notices are staged alongside successful state changes only — a failed
//! transaction aborts its commit and its notices with it.

use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::journal::{ClonedRepo, Namespace};
use crate::motion::MotionId;

/// One user-facing message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    /// Message body, plain text.
    pub body: String,
}

impl Notice {
    /// Creates a notice.
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }
}

/// Notices accumulated by one policy invocation.
pub type Notices = Vec<Notice>;

/// Convenience constructor for a single-notice list.
pub fn notice(body: impl Into<String>) -> Notices {
    vec![Notice::new(body)]
}

/// Queue directory for a motion's notices.
pub fn notices_ns(motion: &MotionId) -> Namespace {
    Namespace::new(["motion"]).join(motion.as_str()).join("notices")
}

/// Stages `notices` at the tail of the motion's queue.
pub fn stage_staged(
    cx: &CancelToken,
    gov: &ClonedRepo,
    motion: &MotionId,
    notices: &Notices,
) -> Result<()> {
    if notices.is_empty() {
        return Ok(());
    }
    cx.check()?;
    let ns = notices_ns(motion);
    let mut seq = next_seq(gov, &ns)?;
    for notice in notices {
        gov.write_json_staged(&ns.join(format!("{seq}.json")), notice)?;
        seq += 1;
    }
    Ok(())
}

/// Reads the motion's queued notices in order.
pub fn list_local(gov: &ClonedRepo, motion: &MotionId) -> Result<Notices> {
    let ns = notices_ns(motion);
    let mut numbered: Vec<(u64, Notice)> = Vec::new();
    for name in gov.list(&ns)? {
        let Some(stem) = name.strip_suffix(".json") else {
            continue;
        };
        let Ok(seq) = stem.parse::<u64>() else {
            continue;
        };
        numbered.push((seq, gov.read_json(&ns.join(&name))?));
    }
    numbered.sort_by_key(|(seq, _)| *seq);
    Ok(numbered.into_iter().map(|(_, notice)| notice).collect())
}

fn next_seq(gov: &ClonedRepo, ns: &Namespace) -> Result<u64> {
    let mut next = 0;
    for name in gov.list(ns)? {
        if let Some(stem) = name.strip_suffix(".json") {
            if let Ok(seq) = stem.parse::<u64>() {
                next = next.max(seq + 1);
            }
        }
    }
    Ok(next)
}
