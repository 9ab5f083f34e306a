//! The concern (issue prioritization) policy.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{
    is_proposal_eligible, load_state, priority_poll_id, save_state_staged, PRIORITY_CHOICE,
};
use crate::account::AccountId;
use crate::ballot::{self, BallotId, OpenArgs};
use crate::cancel::CancelToken;
use crate::error::Result;
use crate::journal::{ClonedRepo, Namespace};
use crate::member::GroupName;
use crate::motion::ops;
use crate::motion::policy::Policy;
use crate::motion::schema::{Motion, Ref, RefType};
use crate::notice::{notice, Notice, Notices};

/// Registry name of the concern policy.
pub const CONCERN_POLICY_NAME: &str = "concern";

/// Per-concern policy state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConcernState {
    /// The concern's priority poll.
    pub priority_poll: BallotId,
    /// References from proposals currently considered eligible to resolve
    /// this concern.
    pub eligible_proposals: Vec<Ref>,
}

/// Issue prioritization: a per-concern quadratic priority poll, frozen while
/// an eligible proposal addresses the concern.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConcernPolicy;

impl ConcernPolicy {
    /// Creates the policy.
    pub const fn new() -> Self {
        Self
    }

    fn refresh_freeze(
        &self,
        cx: &CancelToken,
        gov: &ClonedRepo,
        motion: &Motion,
        state: &ConcernState,
    ) -> Result<Notices> {
        let mut notices = Notices::new();
        if !state.eligible_proposals.is_empty() && !motion.frozen {
            ops::freeze_motion_staged(cx, gov, &motion.id)?;
            notices.push(Notice::new(
                "Freezing this concern: an eligible proposal addresses it.",
            ));
        }
        if state.eligible_proposals.is_empty() && motion.frozen {
            ops::unfreeze_motion_staged(cx, gov, &motion.id)?;
            notices.push(Notice::new(
                "Unfreezing this concern: no eligible proposal addresses it.",
            ));
        }
        Ok(notices)
    }
}

impl Policy for ConcernPolicy {
    fn name(&self) -> &'static str {
        CONCERN_POLICY_NAME
    }

    fn open(
        &self,
        cx: &CancelToken,
        gov: &ClonedRepo,
        motion: &Motion,
        policy_ns: &Namespace,
    ) -> Result<Notices> {
        let poll = priority_poll_id(&motion.id);
        let state = ConcernState {
            priority_poll: poll.clone(),
            eligible_proposals: Vec::new(),
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
                purpose: "concern priority poll".to_string(),
                title: format!("Prioritization poll for concern {}", motion.id),
                description: format!(
                    "Up/down vote the priority of concern {}: {}",
                    motion.id, motion.title
                ),
                choices: vec![PRIORITY_CHOICE.to_string()],
                participants: GroupName::everybody(),
            },
        )?;
        Ok(notice(format!(
            "Managing this issue as concern {} with priority poll {poll}.",
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
        let state: ConcernState = load_state(gov, policy_ns)?;
        let poll = ballot::show_local(gov, &state.priority_poll)?;
        let score = poll.tally.attention();
        Ok((
            score,
            notice(format!("Updated prioritization tally to {score}.")),
        ))
    }

    fn update(
        &self,
        cx: &CancelToken,
        gov: &ClonedRepo,
        motion: &Motion,
        policy_ns: &Namespace,
    ) -> Result<Notices> {
        let mut state: ConcernState = load_state(gov, policy_ns)?;
        state
            .eligible_proposals
            .retain(|reference| is_proposal_eligible(gov, &reference.from));
        state.eligible_proposals.sort();
        save_state_staged(gov, policy_ns, &state)?;
        self.refresh_freeze(cx, gov, motion, &state)
    }

    fn close(
        &self,
        cx: &CancelToken,
        gov: &ClonedRepo,
        motion: &Motion,
        policy_ns: &Namespace,
        escrow_to: &AccountId,
    ) -> Result<Notices> {
        let state: ConcernState = load_state(gov, policy_ns)?;
        let poll = ballot::show_local(gov, &state.priority_poll)?;
        ballot::close_staged(cx, gov, &state.priority_poll, escrow_to)?;
        let score = poll
            .tally
            .scores
            .get(PRIORITY_CHOICE)
            .copied()
            .unwrap_or(0.0);
        Ok(notice(format!(
            "Closed concern {} at priority score {score}; {} participant(s) voted.",
            motion.id,
            poll.tally.scores_by_user.len()
        )))
    }

    fn cancel(
        &self,
        cx: &CancelToken,
        gov: &ClonedRepo,
        motion: &Motion,
        policy_ns: &Namespace,
    ) -> Result<Notices> {
        let state: ConcernState = load_state(gov, policy_ns)?;
        ballot::cancel_staged(cx, gov, &state.priority_poll)?;
        Ok(notice(format!(
            "Cancelled concern {}; voters were refunded.",
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
        let state: ConcernState = load_state(gov, policy_ns)?;
        if ballot::is_frozen_local(gov, &state.priority_poll)? {
            return Ok(Notices::new());
        }
        ballot::freeze_staged(cx, gov, &state.priority_poll)?;
        Ok(notice(format!("Concern {} has been frozen.", motion.id)))
    }

    fn unfreeze(
        &self,
        cx: &CancelToken,
        gov: &ClonedRepo,
        motion: &Motion,
        policy_ns: &Namespace,
    ) -> Result<Notices> {
        let state: ConcernState = load_state(gov, policy_ns)?;
        if !ballot::is_frozen_local(gov, &state.priority_poll)? {
            return Ok(Notices::new());
        }
        ballot::unfreeze_staged(cx, gov, &state.priority_poll)?;
        Ok(notice(format!("Concern {} has been unfrozen.", motion.id)))
    }

    fn show(&self, gov: &ClonedRepo, _motion: &Motion, policy_ns: &Namespace) -> Result<Value> {
        let state: ConcernState = load_state(gov, policy_ns)?;
        let poll = ballot::show_local(gov, &state.priority_poll)?;
        Ok(json!({
            "state": state,
            "priority_poll": poll,
        }))
    }

    fn add_ref_from(
        &self,
        _cx: &CancelToken,
        gov: &ClonedRepo,
        reference: &Ref,
        from: &Motion,
        _to: &Motion,
        _from_ns: &Namespace,
        to_ns: &Namespace,
    ) -> Result<Notices> {
        if reference.ref_type != RefType::resolves() {
            return Ok(Notices::new());
        }
        if !is_proposal_eligible(gov, &from.id) {
            return Ok(Notices::new());
        }
        let mut state: ConcernState = load_state(gov, to_ns)?;
        if state.eligible_proposals.contains(reference) {
            return Ok(Notices::new());
        }
        state.eligible_proposals.push(reference.clone());
        state.eligible_proposals.sort();
        save_state_staged(gov, to_ns, &state)?;
        Ok(notice(format!(
            "This issue is now addressed by eligible proposal {}.",
            from.id
        )))
    }

    fn remove_ref_from(
        &self,
        _cx: &CancelToken,
        gov: &ClonedRepo,
        reference: &Ref,
        from: &Motion,
        _to: &Motion,
        _from_ns: &Namespace,
        to_ns: &Namespace,
    ) -> Result<Notices> {
        let mut state: ConcernState = load_state(gov, to_ns)?;
        if !state.eligible_proposals.contains(reference) {
            return Ok(Notices::new());
        }
        state.eligible_proposals.retain(|r| r != reference);
        save_state_staged(gov, to_ns, &state)?;
        Ok(notice(format!(
            "This issue is no longer addressed by proposal {}.",
            from.id
        )))
    }
}
