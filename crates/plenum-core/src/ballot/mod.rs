//! Ballots: named, strategy-driven polls with credit escrow.
//!
//! A ballot materializes as three files under `ballot/<id>/`: the
//! advertisement (immutable parameters plus mutable flags), the tally (the
//! authoritative tabulation), and the strategy descriptor. Members vote by
//! mailing signed envelopes from their own repositories; the organizer's
//! tally pulls those envelopes, lets the strategy accept or reject each one,
//! and moves voting credits between the voter's account and the ballot's
//! escrow account accordingly.
//!
//! Lifecycle: `open → frozen ⇌ open → closed | cancelled`. Closed and
//! cancelled ballots are immutable; `erase` may then remove the tree.

mod lifecycle;
mod list;
mod open;
mod qv;
mod schema;
mod strategy;
mod tally;
mod track;
mod vote;


use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Result;
use crate::journal::{validate_segment, Namespace};

pub use lifecycle::{
    cancel, cancel_staged, close, close_staged, erase, erase_staged, freeze, freeze_staged,
    is_frozen_local, load_ad_local, unfreeze, unfreeze_staged,
};
pub use list::{list, list_local, show, show_local, ListFilter};
pub use open::{open, open_staged, OpenArgs};
pub use qv::{QvStrategy, QV_STRATEGY_NAME};
pub use schema::{
    AcceptedVote, AdTally, Advertisement, Election, RejectedVote, StrengthAndScore, Tally,
    VoteEnvelope, AD_FILE, STRATEGY_FILE, TALLY_FILE,
};
pub use strategy::{
    install_strategy, load_strategy_local, lookup_strategy, FetchedVote, Strategy,
    StrategyDescriptor,
};
pub use tally::{tally, tally_all_staged, tally_staged};
pub use track::{track, PendingVote, VoteStatus};
pub use vote::{vote, vote_staged};

/// Ballot identifier: one or more validated path segments, rendered with
/// `/` separators (e.g. `pp/c1`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BallotId(Vec<String>);

impl BallotId {
    /// Parses a slash-separated ballot id, validating every segment.
    pub fn parse(id: &str) -> Result<Self> {
        let segments: Vec<String> = id.split('/').map(str::to_string).collect();
        for segment in &segments {
            validate_segment(segment)?;
        }
        Ok(Self(segments))
    }

    /// Builds an id from segments already known to be valid (crate-internal
    /// identifier types).
    pub(crate) fn from_segments(segments: Vec<String>) -> Self {
        Self(segments)
    }

    /// The id's path segments.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Renders the id as a single path-safe segment (for account ids).
    pub fn mangled(&self) -> String {
        self.0.join("-")
    }
}

impl fmt::Display for BallotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

impl Serialize for BallotId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for BallotId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(D::Error::custom)
    }
}

/// Root of the ballot namespace.
pub fn ballot_root_ns() -> Namespace {
    Namespace::new(["ballot"])
}

/// Namespace of one ballot's tree.
pub fn ballot_ns(id: &BallotId) -> Namespace {
    let mut ns = ballot_root_ns();
    for segment in id.segments() {
        ns = ns.join(segment);
    }
    ns
}

/// Mail topic carrying votes for `id`.
pub fn ballot_topic(id: &BallotId) -> String {
    format!("ballot/{id}")
}
