//! Member-side vote tracking.

use serde::{Deserialize, Serialize};

use super::list::show_local;
use super::schema::{AcceptedVote, Election, RejectedVote, VoteEnvelope};
use super::{ballot_topic, BallotId};
use crate::cancel::CancelToken;
use crate::error::Result;
use crate::journal::{ClonedRepo, OwnerAddress, RepoAddress};
use crate::mail::{self, SeqNo};
use crate::member;

/// A vote sent by the member but not yet consumed into the tally.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingVote {
    /// Stream sequence number of the envelope.
    pub seq: SeqNo,
    /// The elections waiting to be tallied.
    pub elections: Vec<Election>,
}

/// The member's standing on one ballot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoteStatus {
    /// Envelopes the tally accepted.
    pub accepted: Vec<AcceptedVote>,
    /// Envelopes the tally rejected, with reasons.
    pub rejected: Vec<RejectedVote>,
    /// Envelopes in the member's stream the tally has not consumed yet.
    pub pending: Vec<PendingVote>,
}

/// Reports the member's accepted, rejected and pending votes on `id`.
///
/// The member is identified by matching the voter's public repository
/// address against the community's user records.
pub fn track(
    cx: &CancelToken,
    voter: &OwnerAddress,
    gov: &RepoAddress,
    id: &BallotId,
) -> Result<VoteStatus> {
    let gov_clone = ClonedRepo::clone(cx, gov)?;
    let voter_public = ClonedRepo::clone(cx, &voter.public)?;

    let handle = member::find_user_by_url(&gov_clone, &voter.public)?;
    let tally = show_local(&gov_clone, id)?.tally;
    let consumed = tally.consumed_seqs(&handle);

    let sent: Vec<(SeqNo, VoteEnvelope)> =
        mail::sent_payloads(&voter_public, gov_clone.address(), &ballot_topic(id))?;
    let pending = sent
        .into_iter()
        .filter(|(seq, _)| consumed.binary_search(seq).is_err())
        .map(|(seq, envelope)| PendingVote {
            seq,
            elections: envelope.elections,
        })
        .collect();

    Ok(VoteStatus {
        accepted: tally.accepted.get(&handle).cloned().unwrap_or_default(),
        rejected: tally.rejected.get(&handle).cloned().unwrap_or_default(),
        pending,
    })
}
