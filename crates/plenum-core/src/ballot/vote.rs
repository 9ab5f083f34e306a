//! Member-side voting.

use super::lifecycle::load_ad_local;
use super::schema::{Election, VoteEnvelope};
use super::{ballot_topic, BallotId};
use crate::cancel::CancelToken;
use crate::error::{GovError, Result};
use crate::journal::{Change, ClonedOwner, ClonedRepo, OwnerAddress, RepoAddress};
use crate::mail::{self, SeqNo};

/// Casts `elections` on a ballot from the voter's own repositories; one
/// commit in the voter's public repo, pushed.
pub fn vote(
    cx: &CancelToken,
    voter: &OwnerAddress,
    gov: &RepoAddress,
    id: &BallotId,
    elections: Vec<Election>,
) -> Result<SeqNo> {
    let gov_clone = ClonedRepo::clone(cx, gov)?;
    let voter_clone = ClonedOwner::clone(cx, voter)?;
    let seq = vote_staged(cx, &voter_clone, &gov_clone, id, elections)?;
    let change = Change::new("ballot_vote", format!("Vote on ballot {id}"))
        .arg("id", id)
        .arg("seq", &seq);
    voter_clone.public.commit_if_changed(cx, &change)?;
    voter_clone.public.push(cx)?;
    Ok(seq)
}

/// Stages a vote into the voter's public tree.
///
/// The envelope snapshots the advertisement and anchors at the governance
/// head observed at vote time, then travels over mail on the ballot's topic.
pub fn vote_staged(
    cx: &CancelToken,
    voter: &ClonedOwner,
    gov: &ClonedRepo,
    id: &BallotId,
    elections: Vec<Election>,
) -> Result<SeqNo> {
    cx.check()?;
    let ad = load_ad_local(gov, id)?;
    if ad.is_terminal() {
        return Err(GovError::invariant(format!(
            "ballot {id} is closed or cancelled"
        )));
    }
    if elections.is_empty() {
        return Err(GovError::invariant("a vote must cast at least one election"));
    }
    for election in &elections {
        ad.check_choice(&election.choice)?;
    }
    let envelope = VoteEnvelope {
        ad_commit: gov.head()?,
        ad,
        elections,
    };
    let seq = mail::send_signed_staged(cx, voter, gov.address(), &ballot_topic(id), &envelope)?;
    tracing::info!(id = %id, seq, "staged vote");
    Ok(seq)
}
