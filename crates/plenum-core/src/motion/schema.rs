//! Motion records and typed references.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::MotionId;
use crate::member::UserHandle;

/// Kind of a motion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionType {
    /// An issue to be prioritized.
    Concern,
    /// A change request addressing concerns.
    Proposal,
}

/// Kind of a directed reference between motions.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RefType(String);

impl RefType {
    /// Wraps a reference type name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// A proposal claims to address a concern.
    pub fn claims() -> Self {
        Self("claims".to_string())
    }

    /// A proposal resolves a concern when merged.
    pub fn resolves() -> Self {
        Self("resolves".to_string())
    }

    /// The type name as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A typed directed edge between two motions.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ref {
    /// Edge type.
    #[serde(rename = "type")]
    pub ref_type: RefType,
    /// Source motion.
    pub from: MotionId,
    /// Target motion.
    pub to: MotionId,
}

/// One motion record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Motion {
    /// Motion identifier.
    pub id: MotionId,
    /// Concern or proposal.
    #[serde(rename = "type")]
    pub motion_type: MotionType,
    /// Registry name of the policy driving this motion.
    pub policy: String,
    /// The member who opened the motion.
    pub author: UserHandle,
    /// Human title.
    pub title: String,
    /// Human body.
    pub body: String,
    /// URL of the motion in the community's issue tracker.
    pub tracker_url: String,
    /// Free-form labels, kept sorted.
    pub labels: Vec<String>,
    /// Outgoing references.
    pub refs_to: Vec<Ref>,
    /// Incoming references.
    pub refs_by: Vec<Ref>,
    /// Frozen motions are parked by their policy.
    pub frozen: bool,
    /// Closed motions reached a terminal state.
    pub closed: bool,
    /// Cancelled motions reached a terminal state without resolution.
    pub cancelled: bool,
    /// When the motion was opened.
    pub opened_at: DateTime<Utc>,
    /// Latest policy-computed score.
    pub score: f64,
}

impl Motion {
    /// True for concerns.
    pub fn is_concern(&self) -> bool {
        self.motion_type == MotionType::Concern
    }

    /// True for proposals.
    pub fn is_proposal(&self) -> bool {
        self.motion_type == MotionType::Proposal
    }

    /// True once the motion reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.closed || self.cancelled
    }
}
