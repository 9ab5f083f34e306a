//! Built-in motion policies: concern prioritization and proposal approval.
//!
//! Each policy owns a per-motion poll ballot (quadratic voting, single
//! choice, `everybody` participants) and keeps its state under the motion's
//! policy namespace. Concerns freeze while an eligible proposal addresses
//! them; a proposal is eligible while it is open and its latest approval
//! score is positive.

mod concern;
mod proposal;

pub use concern::{ConcernPolicy, ConcernState, CONCERN_POLICY_NAME};
pub use proposal::{ProposalPolicy, ProposalState, PROPOSAL_POLICY_NAME};

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{ops, MotionId};
use crate::ballot::BallotId;
use crate::error::Result;
use crate::journal::{ClonedRepo, Namespace};

/// Single choice on a concern's priority poll.
pub const PRIORITY_CHOICE: &str = "rank";
/// Single choice on a proposal's approval poll.
pub const APPROVAL_CHOICE: &str = "approve";

/// The priority poll allocated for a concern.
pub fn priority_poll_id(motion: &MotionId) -> BallotId {
    BallotId::from_segments(vec!["pp".to_string(), motion.as_str().to_string()])
}

/// The approval poll allocated for a proposal.
pub fn approval_poll_id(motion: &MotionId) -> BallotId {
    BallotId::from_segments(vec!["ap".to_string(), motion.as_str().to_string()])
}

fn state_ns(policy_ns: &Namespace) -> Namespace {
    policy_ns.join("state.json")
}

fn load_state<T: DeserializeOwned>(gov: &ClonedRepo, policy_ns: &Namespace) -> Result<T> {
    gov.read_json(&state_ns(policy_ns))
}

fn save_state_staged<T: Serialize>(
    gov: &ClonedRepo,
    policy_ns: &Namespace,
    state: &T,
) -> Result<()> {
    gov.write_json_staged(&state_ns(policy_ns), state)
}

/// Eligibility rule shared by both policies: the proposal must exist, be a
/// proposal, be open, and its latest approval score must be positive.
pub fn is_proposal_eligible(gov: &ClonedRepo, proposal: &MotionId) -> bool {
    let Ok(motion) = ops::get_motion_local(gov, proposal) else {
        return false;
    };
    if !motion.is_proposal() || motion.is_terminal() {
        return false;
    }
    let Ok(state) = load_state::<ProposalState>(gov, &super::policy_ns(proposal)) else {
        return false;
    };
    state.latest_approval_score > 0.0
}
