//! Motions: governance items driven by pluggable policies.
//!
//! A motion is a concern (issue) or a proposal (change request). Each motion
//! names the policy that interprets its lifecycle; policies open and close
//! ballots, maintain per-motion state under the motion's policy namespace,
//! and react to typed cross-references between motions.

pub mod policies;

mod ops;
mod policy;
mod schema;


use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::journal::{validate_segment, Namespace};
use crate::kv::Key;

pub use ops::{
    add_ref, add_ref_staged, cancel_motion, cancel_motion_staged, close_motion,
    close_motion_staged, freeze_motion, freeze_motion_staged, get_motion_local, is_motion_local,
    list_motions, list_motions_local, open_motion, open_motion_staged, remove_ref,
    remove_ref_staged, score_all, score_all_staged, show_motion, show_motion_local,
    unfreeze_motion, unfreeze_motion_staged, update_motion, update_motion_staged, MotionView,
    OpenMotionArgs,
};
pub use policy::{install_policy, lookup_policy, Policy};
pub use schema::{Motion, MotionType, Ref, RefType};

/// Motion identifier, e.g. the tracker's issue number.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MotionId(String);

impl MotionId {
    /// Wraps a validated motion id.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        validate_segment(&id)?;
        Ok(Self(id))
    }

    /// The id as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MotionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Key for MotionId {
    fn to_segment(&self) -> String {
        self.0.clone()
    }

    fn from_segment(segment: &str) -> Result<Self> {
        Self::new(segment)
    }
}

/// Root of the motion namespace.
pub fn motion_root_ns() -> Namespace {
    Namespace::new(["motion"])
}

/// Namespace of one motion's policy-defined subtree.
pub fn policy_ns(id: &MotionId) -> Namespace {
    motion_root_ns().join(id.as_str()).join("policy")
}
