//! Quadratic voting.
//!
//! Charge = strength²; effective vote = strength. A user's later vote on a
//! choice replaces the earlier one, so the charge delta is
//! `new² − old²` and may be negative (a refund from escrow). An envelope
//! whose net charge exceeds the voter's credit balance is rejected whole.

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::Value;

use super::schema::{AcceptedVote, Advertisement, RejectedVote, StrengthAndScore, Tally};
use super::strategy::{FetchedVote, Strategy};
use crate::account::{self, AccountId, Holding};
use crate::cancel::CancelToken;
use crate::error::Result;
use crate::journal::ClonedRepo;

/// Registry name of the quadratic voting strategy.
pub const QV_STRATEGY_NAME: &str = "qv";

/// The quadratic voting strategy.
#[derive(Clone, Copy, Debug, Default)]
pub struct QvStrategy;

impl QvStrategy {
    /// Creates the strategy.
    pub const fn new() -> Self {
        Self
    }
}

impl Strategy for QvStrategy {
    fn name(&self) -> &'static str {
        QV_STRATEGY_NAME
    }

    fn params(&self) -> Result<Value> {
        Ok(Value::Object(serde_json::Map::new()))
    }

    fn tally(
        &self,
        cx: &CancelToken,
        gov: &ClonedRepo,
        ad: &Advertisement,
        current: &Tally,
        fetched: &[FetchedVote],
    ) -> Result<Tally> {
        let mut tally = current.clone();
        for vote in fetched {
            cx.check()?;
            if ad.frozen {
                reject(&mut tally, vote, "frozen");
                continue;
            }
            if let Err(err) = vote
                .envelope
                .elections
                .iter()
                .try_for_each(|e| ad.check_choice(&e.choice))
            {
                reject(&mut tally, vote, &err.to_string());
                continue;
            }
            apply_envelope(cx, gov, ad, &mut tally, vote)?;
        }
        Ok(tally)
    }
}

fn apply_envelope(
    cx: &CancelToken,
    gov: &ClonedRepo,
    ad: &Advertisement,
    tally: &mut Tally,
    vote: &FetchedVote,
) -> Result<()> {
    // Replay the elections against the strengths in force to find the net
    // charge; later elections in the same envelope replace earlier ones.
    let mut in_force: BTreeMap<String, f64> = tally
        .scores_by_user
        .get(&vote.voter)
        .map(|choices| {
            choices
                .iter()
                .map(|(choice, s)| (choice.clone(), s.strength))
                .collect()
        })
        .unwrap_or_default();
    let mut net_charge = 0.0;
    let mut score_deltas: BTreeMap<String, f64> = BTreeMap::new();
    for election in &vote.envelope.elections {
        let old = in_force.get(&election.choice).copied().unwrap_or(0.0);
        let new = election.strength;
        net_charge += new * new - old * old;
        *score_deltas.entry(election.choice.clone()).or_insert(0.0) += new - old;
        in_force.insert(election.choice.clone(), new);
    }

    // Credits move before the tally is touched; a failed charge rejects the
    // whole envelope and leaves no trace beyond the rejection record.
    let voter_account = AccountId::user(&vote.voter);
    let note = format!("vote charge on ballot {}", ad.id);
    let movement = if net_charge > 0.0 {
        account::transfer_staged(
            cx,
            gov,
            &voter_account,
            &ad.escrow,
            &Holding::credits(net_charge),
            &note,
        )
    } else if net_charge < 0.0 {
        account::transfer_staged(
            cx,
            gov,
            &ad.escrow,
            &voter_account,
            &Holding::credits(-net_charge),
            &note,
        )
    } else {
        Ok(())
    };
    match movement {
        Ok(()) => {}
        Err(err) if err.is_invariant() => {
            reject(tally, vote, &format!("insufficient balance: {err}"));
            return Ok(());
        }
        Err(err) => return Err(err),
    }

    for (choice, delta) in score_deltas {
        *tally.scores.entry(choice).or_insert(0.0) += delta;
    }
    let user_scores = tally
        .scores_by_user
        .entry(vote.voter.clone())
        .or_default();
    for (choice, strength) in in_force {
        user_scores.insert(
            choice,
            StrengthAndScore {
                strength,
                score: strength,
            },
        );
    }
    *tally.charges.entry(vote.voter.clone()).or_insert(0.0) += net_charge;
    tally
        .accepted
        .entry(vote.voter.clone())
        .or_default()
        .push(AcceptedVote {
            seq: vote.seq,
            accepted_at: Utc::now(),
            elections: vote.envelope.elections.clone(),
        });
    Ok(())
}

fn reject(tally: &mut Tally, vote: &FetchedVote, reason: &str) {
    tally
        .rejected
        .entry(vote.voter.clone())
        .or_default()
        .push(RejectedVote {
            seq: vote.seq,
            rejected_at: Utc::now(),
            elections: vote.envelope.elections.clone(),
            reason: reason.to_string(),
        });
}
