//! Tallying: fetch member votes, fold them through the strategy.
//!
//! Member repositories are cloned with bounded parallelism; everything else
//! is sequential. Each member is observed at whatever its HEAD is at clone
//! time — a member pushing mid-tally may or may not be seen by this tick,
//! and will be seen by the next one.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use super::lifecycle::load_ad_local;
use super::schema::{Tally, TALLY_FILE};
use super::strategy::{load_strategy_local, FetchedVote, Strategy as _};
use super::{ballot_ns, ballot_topic, BallotId, ListFilter};
use crate::cancel::CancelToken;
use crate::error::{GovError, Result};
use crate::journal::{Change, ClonedRepo, RepoAddress};
use crate::mail;
use crate::member::{self, UserHandle};

/// Tallies a ballot; one commit, pushed.
pub fn tally(
    cx: &CancelToken,
    gov: &RepoAddress,
    id: &BallotId,
    fetch_par: usize,
) -> Result<Tally> {
    let cloned = ClonedRepo::clone(cx, gov)?;
    let tally = tally_staged(cx, &cloned, id, fetch_par)?;
    let change = Change::new("ballot_tally", format!("Tally votes on ballot {id}")).arg("id", id);
    cloned.commit_if_changed(cx, &change)?;
    cloned.push(cx)?;
    Ok(tally)
}

/// Stages one tally pass over `id`.
///
/// Fails with an invariant error on closed or cancelled ballots. Frozen
/// ballots still consume incoming envelopes, rejecting each with reason
/// `frozen`. Re-running with no new votes stages nothing.
pub fn tally_staged(
    cx: &CancelToken,
    gov: &ClonedRepo,
    id: &BallotId,
    fetch_par: usize,
) -> Result<Tally> {
    cx.check()?;
    let ad = load_ad_local(gov, id)?;
    if ad.is_terminal() {
        return Err(GovError::invariant(format!(
            "cannot tally closed or cancelled ballot {id}"
        )));
    }

    let users = member::list_group_users_local(gov, &ad.participants)?;
    let mut voters = Vec::with_capacity(users.len());
    for user in users {
        let profile = member::get_user_local(gov, &user)?;
        voters.push((user, profile.public_url));
    }

    let clones = clone_member_repos(cx, &voters, fetch_par);

    let topic = ballot_topic(id);
    let mut fetched: Vec<FetchedVote> = Vec::new();
    for ((user, url), clone) in voters.iter().zip(clones) {
        let member_tree = match clone {
            Some(Ok(tree)) => tree,
            Some(Err(GovError::Cancelled)) => return Err(GovError::Cancelled),
            Some(Err(err)) => {
                tracing::warn!(user = %user, url = %url, error = %err, "skipping unreachable member");
                continue;
            }
            None => {
                return Err(GovError::remote(format!(
                    "vote fetch worker for {user} died"
                )))
            }
        };
        mail::receive_signed_staged(
            cx,
            gov,
            url,
            &member_tree,
            &topic,
            |seq, envelope: super::schema::VoteEnvelope| {
                envelope.verify_consistency(id)?;
                fetched.push(FetchedVote {
                    voter: user.clone(),
                    seq,
                    envelope,
                });
                Ok(())
            },
        )?;
    }

    let current: Tally = gov.read_json(&ballot_ns(id).join(TALLY_FILE))?;
    let strategy = load_strategy_local(gov, id)?;
    let updated = strategy.tally(cx, gov, &ad, &current, &fetched)?;
    if updated != current {
        gov.write_json_staged(&ballot_ns(id).join(TALLY_FILE), &updated)?;
    }
    tracing::info!(id = %id, fetched = fetched.len(), "tallied ballot");
    Ok(updated)
}

/// Stages a tally of every ballot that is not closed or cancelled, returning
/// one change record per tallied ballot.
pub fn tally_all_staged(
    cx: &CancelToken,
    gov: &ClonedRepo,
    max_par: usize,
) -> Result<Vec<Change>> {
    let filter = ListFilter {
        only_open: true,
        ..ListFilter::default()
    };
    let mut changes = Vec::new();
    for ad in super::list_local(gov, &filter)? {
        cx.check()?;
        tally_staged(cx, gov, &ad.id, max_par)?;
        changes.push(
            Change::new("ballot_tally", format!("Tally votes on ballot {}", ad.id))
                .arg("id", &ad.id),
        );
    }
    Ok(changes)
}

/// Clones every voter's public repository with at most `max_par` workers.
///
/// Results are positionally aligned with `voters`; a `None` means the worker
/// responsible for that slot panicked.
fn clone_member_repos(
    cx: &CancelToken,
    voters: &[(UserHandle, RepoAddress)],
    max_par: usize,
) -> Vec<Option<Result<ClonedRepo>>> {
    let workers = max_par.max(1).min(voters.len().max(1));
    let next = AtomicUsize::new(0);
    let mut results: Vec<Option<Result<ClonedRepo>>> = Vec::new();
    results.resize_with(voters.len(), || None);

    thread::scope(|scope| {
        let next = &next;
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            handles.push(scope.spawn(move || {
                let mut chunk = Vec::new();
                loop {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some((_, url)) = voters.get(index) else {
                        break;
                    };
                    chunk.push((index, ClonedRepo::clone(cx, url)));
                }
                chunk
            }));
        }
        for handle in handles {
            if let Ok(chunk) = handle.join() {
                for (index, result) in chunk {
                    results[index] = Some(result);
                }
            }
        }
    });
    results
}
