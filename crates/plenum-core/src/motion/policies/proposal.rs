//! The proposal (change approval) policy.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{approval_poll_id, load_state, save_state_staged, APPROVAL_CHOICE};
use crate::account::AccountId;
use crate::ballot::{self, BallotId, OpenArgs};
use crate::cancel::CancelToken;
use crate::error::Result;
use crate::journal::{ClonedRepo, Namespace};
use crate::member::GroupName;
use crate::motion::policy::Policy;
use crate::motion::schema::Motion;
use crate::notice::{notice, Notices};

/// Registry name of the proposal policy.
pub const PROPOSAL_POLICY_NAME: &str = "proposal";

/// Per-proposal policy state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProposalState {
    /// The proposal's approval poll.
    pub approval_poll: BallotId,
    /// Approval score as of the last score refresh; the eligibility rule
    /// reads this, not the live tally.
    pub latest_approval_score: f64,
}

/// Change approval: a per-proposal quadratic approval poll whose score
/// gates the proposal's eligibility to resolve concerns.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProposalPolicy;

impl ProposalPolicy {
    /// Creates the policy.
    pub const fn new() -> Self {
        Self
    }

    fn refresh_score(
        &self,
        gov: &ClonedRepo,
        policy_ns: &Namespace,
    ) -> Result<(f64, ProposalState)> {
        let mut state: ProposalState = load_state(gov, policy_ns)?;
        let poll = ballot::show_local(gov, &state.approval_poll)?;
        let score = poll
            .tally
            .scores
            .get(APPROVAL_CHOICE)
            .copied()
            .unwrap_or(0.0);
        if (state.latest_approval_score - score).abs() > f64::EPSILON {
            state.latest_approval_score = score;
            save_state_staged(gov, policy_ns, &state)?;
        }
        Ok((score, state))
    }
}

impl Policy for ProposalPolicy {
    fn name(&self) -> &'static str {
        PROPOSAL_POLICY_NAME
    }

    fn open(
        &self,
        cx: &CancelToken,
        gov: &ClonedRepo,
        motion: &Motion,
        policy_ns: &Namespace,
    ) -> Result<Notices> {
        let poll = approval_poll_id(&motion.id);
        let state = ProposalState {
            approval_poll: poll.clone(),
            latest_approval_score: 0.0,
        };
        save_state_staged(gov, policy_ns, &state)?;

        let strategy = ballot::lookup_strategy(ballot::QV_STRATEGY_NAME)?;
        ballot::open_staged(
            cx,
            gov,
            strategy.as_ref(),
            OpenArgs {
                id: poll.clone(),
                escrow: AccountId::escrow_for_ballot(&poll),
                purpose: "proposal approval poll".to_string(),
                title: format!("Approval poll for proposal {}", motion.id),
                description: format!(
                    "Up/down vote the approval of proposal {}: {}",
                    motion.id, motion.title
                ),
                choices: vec![APPROVAL_CHOICE.to_string()],
                participants: GroupName::everybody(),
            },
        )?;
        Ok(notice(format!(
            "Managing this change request as proposal {} with approval poll {poll}.",
            motion.id
        )))
    }

    fn score(
        &self,
        _cx: &CancelToken,
        gov: &ClonedRepo,
        _motion: &Motion,
        policy_ns: &Namespace,
    ) -> Result<(f64, Notices)> {
        let (score, _) = self.refresh_score(gov, policy_ns)?;
        Ok((score, notice(format!("Updated approval tally to {score}."))))
    }

    fn update(
        &self,
        _cx: &CancelToken,
        gov: &ClonedRepo,
        _motion: &Motion,
        policy_ns: &Namespace,
    ) -> Result<Notices> {
        self.refresh_score(gov, policy_ns)?;
        Ok(Notices::new())
    }

    fn close(
        &self,
        cx: &CancelToken,
        gov: &ClonedRepo,
        motion: &Motion,
        policy_ns: &Namespace,
        escrow_to: &AccountId,
    ) -> Result<Notices> {
        let state: ProposalState = load_state(gov, policy_ns)?;
        ballot::close_staged(cx, gov, &state.approval_poll, escrow_to)?;
        Ok(notice(format!(
            "Closed proposal {} at approval score {}.",
            motion.id, state.latest_approval_score
        )))
    }

    fn cancel(
        &self,
        cx: &CancelToken,
        gov: &ClonedRepo,
        motion: &Motion,
        policy_ns: &Namespace,
    ) -> Result<Notices> {
        let state: ProposalState = load_state(gov, policy_ns)?;
        ballot::cancel_staged(cx, gov, &state.approval_poll)?;
        Ok(notice(format!(
            "Cancelled proposal {}; voters were refunded.",
            motion.id
        )))
    }

    fn freeze(
        &self,
        cx: &CancelToken,
        gov: &ClonedRepo,
        motion: &Motion,
        policy_ns: &Namespace,
    ) -> Result<Notices> {
        let state: ProposalState = load_state(gov, policy_ns)?;
        if ballot::is_frozen_local(gov, &state.approval_poll)? {
            return Ok(Notices::new());
        }
        ballot::freeze_staged(cx, gov, &state.approval_poll)?;
        Ok(notice(format!("Proposal {} has been frozen.", motion.id)))
    }

    fn unfreeze(
        &self,
        cx: &CancelToken,
        gov: &ClonedRepo,
        motion: &Motion,
        policy_ns: &Namespace,
    ) -> Result<Notices> {
        let state: ProposalState = load_state(gov, policy_ns)?;
        if !ballot::is_frozen_local(gov, &state.approval_poll)? {
            return Ok(Notices::new());
        }
        ballot::unfreeze_staged(cx, gov, &state.approval_poll)?;
        Ok(notice(format!("Proposal {} has been unfrozen.", motion.id)))
    }

    fn show(&self, gov: &ClonedRepo, _motion: &Motion, policy_ns: &Namespace) -> Result<Value> {
        let state: ProposalState = load_state(gov, policy_ns)?;
        let poll = ballot::show_local(gov, &state.approval_poll)?;
        Ok(json!({
            "state": state,
            "approval_poll": poll,
        }))
    }
}
