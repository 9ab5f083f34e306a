//! On-repo ballot forms: advertisement, vote envelope, tally.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::BallotId;
use crate::account::AccountId;
use crate::error::{GovError, Result};
use crate::journal::{CommitId, RepoAddress};
use crate::mail::SeqNo;
use crate::member::{GroupName, UserHandle};

/// File name of the advertisement within a ballot's tree.
pub const AD_FILE: &str = "ad.json";
/// File name of the tally within a ballot's tree.
pub const TALLY_FILE: &str = "tally.json";
/// File name of the strategy descriptor within a ballot's tree.
pub const STRATEGY_FILE: &str = "strategy.json";

/// The advertisement: a ballot's immutable parameters plus mutable flags.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Advertisement {
    /// Address of the governance repository owning the ballot.
    pub gov: RepoAddress,
    /// Ballot identifier.
    pub id: BallotId,
    /// What the ballot decides, e.g. `concern priority poll`.
    pub purpose: String,
    /// Human title.
    pub title: String,
    /// Human description.
    pub description: String,
    /// Available choices. An empty list admits free-form choices.
    pub choices: Vec<String>,
    /// Name of the registered strategy tallying this ballot.
    pub strategy: String,
    /// The participating group.
    pub participants: GroupName,
    /// Escrow account holding charged credits.
    pub escrow: AccountId,
    /// Frozen ballots accept no new votes during tally.
    pub frozen: bool,
    /// Closed ballots are immutable; escrow has been routed.
    pub closed: bool,
    /// Cancelled ballots are immutable; charges have been refunded.
    pub cancelled: bool,
    /// Head of the governance branch when the ballot was opened.
    pub parent_commit: CommitId,
}

impl Advertisement {
    /// True once the ballot reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.closed || self.cancelled
    }

    /// Fails unless `choice` is admitted by this ballot.
    pub fn check_choice(&self, choice: &str) -> Result<()> {
        if !self.choices.is_empty() && !self.choices.iter().any(|c| c == choice) {
            return Err(GovError::invariant(format!(
                "choice {choice:?} is not available on ballot {}",
                self.id
            )));
        }
        Ok(())
    }
}

/// One (choice, strength) pair within a vote envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Election {
    /// The chosen option.
    pub choice: String,
    /// Signed vote strength; the strategy derives charge and score from it.
    pub strength: f64,
}

/// The signed payload a member mails when voting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoteEnvelope {
    /// Head of the governance branch when the ad was read.
    pub ad_commit: CommitId,
    /// Snapshot of the advertisement voted on.
    pub ad: Advertisement,
    /// The elections cast.
    pub elections: Vec<Election>,
}

impl VoteEnvelope {
    /// Checks internal consistency against the ballot the tally is running
    /// for: the envelope must reference the same ballot and only cast
    /// admitted choices.
    pub fn verify_consistency(&self, id: &BallotId) -> Result<()> {
        if self.ad.id != *id {
            return Err(GovError::invariant(format!(
                "envelope references ballot {}, expected {id}",
                self.ad.id
            )));
        }
        if self.elections.is_empty() {
            return Err(GovError::invariant("envelope casts no elections"));
        }
        Ok(())
    }
}

/// A user's standing on one choice.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrengthAndScore {
    /// The strength currently in force (later votes replace earlier ones).
    pub strength: f64,
    /// The effective vote contributed to the choice's score.
    pub score: f64,
}

/// An accepted envelope, as recorded in the tally.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AcceptedVote {
    /// Stream sequence number of the envelope.
    pub seq: SeqNo,
    /// When the organizer accepted it.
    pub accepted_at: DateTime<Utc>,
    /// The elections applied.
    pub elections: Vec<Election>,
}

/// A rejected envelope, as recorded in the tally.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RejectedVote {
    /// Stream sequence number of the envelope.
    pub seq: SeqNo,
    /// When the organizer rejected it.
    pub rejected_at: DateTime<Utc>,
    /// The elections that were not applied.
    pub elections: Vec<Election>,
    /// Why the envelope was rejected.
    pub reason: String,
}

/// The authoritative tabulation of a ballot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tally {
    /// The tallied ballot.
    pub ballot: BallotId,
    /// Aggregate score per choice.
    pub scores: BTreeMap<String, f64>,
    /// Per-user standing per choice.
    pub scores_by_user: BTreeMap<UserHandle, BTreeMap<String, StrengthAndScore>>,
    /// Accepted envelopes per user, in acceptance order.
    pub accepted: BTreeMap<UserHandle, Vec<AcceptedVote>>,
    /// Rejected envelopes per user, in rejection order.
    pub rejected: BTreeMap<UserHandle, Vec<RejectedVote>>,
    /// Net credits charged per user (currently held in escrow).
    pub charges: BTreeMap<UserHandle, f64>,
}

impl Tally {
    /// An empty tally for a freshly opened ballot.
    pub fn empty(ballot: BallotId) -> Self {
        Self {
            ballot,
            scores: BTreeMap::new(),
            scores_by_user: BTreeMap::new(),
            accepted: BTreeMap::new(),
            rejected: BTreeMap::new(),
            charges: BTreeMap::new(),
        }
    }

    /// Total attention the ballot has received: the sum of all scores.
    pub fn attention(&self) -> f64 {
        self.scores.values().sum()
    }

    /// Sequence numbers of every envelope this tally has already consumed
    /// for `user`, accepted or rejected.
    pub fn consumed_seqs(&self, user: &UserHandle) -> Vec<SeqNo> {
        let mut seqs: Vec<SeqNo> = self
            .accepted
            .get(user)
            .map(|votes| votes.iter().map(|vote| vote.seq).collect::<Vec<_>>())
            .unwrap_or_default();
        if let Some(rejected) = self.rejected.get(user) {
            seqs.extend(rejected.iter().map(|vote| vote.seq));
        }
        seqs.sort_unstable();
        seqs
    }
}

/// A ballot's advertisement and tally together, as returned by `show`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdTally {
    /// The advertisement.
    pub ad: Advertisement,
    /// The tally.
    pub tally: Tally,
}
