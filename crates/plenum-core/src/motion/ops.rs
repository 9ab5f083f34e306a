//! Motion operations: the engine dispatching to policies.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::policy::{lookup_policy, Policy as _};
use super::schema::{Motion, MotionType, Ref, RefType};
use super::{motion_root_ns, policy_ns, MotionId};
use crate::account::AccountId;
use crate::cancel::CancelToken;
use crate::error::{GovError, Result};
use crate::history::{self, Event};
use crate::journal::{Change, ClonedRepo, RepoAddress};
use crate::kv::Kv;
use crate::member::UserHandle;
use crate::notice;

const MOTION_KV: Kv<MotionId, Motion> = Kv::new();

/// Arguments to [`open_motion`].
#[derive(Clone, Debug)]
pub struct OpenMotionArgs {
    /// Motion identifier; must not already exist.
    pub id: MotionId,
    /// Concern or proposal.
    pub motion_type: MotionType,
    /// Registry name of the driving policy.
    pub policy: String,
    /// The member opening the motion.
    pub author: UserHandle,
    /// Human title.
    pub title: String,
    /// Human body.
    pub body: String,
    /// URL in the community's issue tracker.
    pub tracker_url: String,
    /// Free-form labels.
    pub labels: Vec<String>,
}

/// A motion together with its policy's view, as returned by `show`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MotionView {
    /// The motion record.
    pub motion: Motion,
    /// The policy's rendering of its state.
    pub policy: Value,
}

fn save_staged(gov: &ClonedRepo, motion: &Motion) -> Result<()> {
    MOTION_KV.set(&motion_root_ns(), gov, &motion.id, motion)
}

/// True when the motion exists.
pub fn is_motion_local(gov: &ClonedRepo, id: &MotionId) -> bool {
    MOTION_KV.exists(&motion_root_ns(), gov, id)
}

/// Reads a motion record.
pub fn get_motion_local(gov: &ClonedRepo, id: &MotionId) -> Result<Motion> {
    MOTION_KV.get(&motion_root_ns(), gov, id)
}

/// Lists every motion, sorted by id.
pub fn list_motions_local(gov: &ClonedRepo) -> Result<Vec<Motion>> {
    let mut motions = Vec::new();
    for id in MOTION_KV.list_keys(&motion_root_ns(), gov)? {
        motions.push(get_motion_local(gov, &id)?);
    }
    Ok(motions)
}

/// Lists every motion; read-only clone.
pub fn list_motions(cx: &CancelToken, gov: &RepoAddress) -> Result<Vec<Motion>> {
    let cloned = ClonedRepo::clone(cx, gov)?;
    list_motions_local(&cloned)
}

/// Opens a motion; one commit, pushed.
pub fn open_motion(cx: &CancelToken, gov: &RepoAddress, args: OpenMotionArgs) -> Result<Motion> {
    let cloned = ClonedRepo::clone(cx, gov)?;
    let motion = open_motion_staged(cx, &cloned, args)?;
    let change = Change::new("motion_open", format!("Open motion {}", motion.id))
        .arg("id", &motion.id)
        .arg("policy", &motion.policy);
    cloned.commit_if_changed(cx, &change)?;
    cloned.push(cx)?;
    Ok(motion)
}

/// Stages a new motion and dispatches the policy's `open` handler.
pub fn open_motion_staged(
    cx: &CancelToken,
    gov: &ClonedRepo,
    args: OpenMotionArgs,
) -> Result<Motion> {
    cx.check()?;
    if is_motion_local(gov, &args.id) {
        return Err(GovError::already_exists(format!("motion {}", args.id)));
    }
    let mut labels = args.labels;
    labels.sort();
    let motion = Motion {
        id: args.id,
        motion_type: args.motion_type,
        policy: args.policy,
        author: args.author,
        title: args.title,
        body: args.body,
        tracker_url: args.tracker_url,
        labels,
        refs_to: Vec::new(),
        refs_by: Vec::new(),
        frozen: false,
        closed: false,
        cancelled: false,
        opened_at: Utc::now(),
        score: 0.0,
    };
    save_staged(gov, &motion)?;

    let policy = lookup_policy(&motion.policy)?;
    let notices = policy.open(cx, gov, &motion, &policy_ns(&motion.id))?;
    notice::stage_staged(cx, gov, &motion.id, &notices)?;

    history::log_staged(
        cx,
        gov,
        &Event::new("motion_open")
            .arg("id", &motion.id)
            .arg("type", &motion.motion_type)
            .arg("policy", &motion.policy),
    )?;
    tracing::info!(id = %motion.id, policy = %motion.policy, "opened motion");
    Ok(motion)
}

fn require_open(motion: &Motion) -> Result<()> {
    if motion.is_terminal() {
        return Err(GovError::invariant(format!(
            "motion {} is closed or cancelled",
            motion.id
        )));
    }
    Ok(())
}

/// Closes a motion; one commit, pushed.
pub fn close_motion(
    cx: &CancelToken,
    gov: &RepoAddress,
    id: &MotionId,
    escrow_to: &AccountId,
) -> Result<()> {
    let cloned = ClonedRepo::clone(cx, gov)?;
    close_motion_staged(cx, &cloned, id, escrow_to)?;
    let change = Change::new("motion_close", format!("Close motion {id}"))
        .arg("id", id)
        .arg("escrow_to", escrow_to);
    cloned.commit_if_changed(cx, &change)?;
    cloned.push(cx)
}

/// Stages closure of a motion through its policy.
pub fn close_motion_staged(
    cx: &CancelToken,
    gov: &ClonedRepo,
    id: &MotionId,
    escrow_to: &AccountId,
) -> Result<()> {
    cx.check()?;
    let mut motion = get_motion_local(gov, id)?;
    require_open(&motion)?;
    let policy = lookup_policy(&motion.policy)?;
    let notices = policy.close(cx, gov, &motion, &policy_ns(id), escrow_to)?;
    motion.closed = true;
    save_staged(gov, &motion)?;
    notice::stage_staged(cx, gov, id, &notices)?;
    history::log_staged(
        cx,
        gov,
        &Event::new("motion_close")
            .arg("id", id)
            .arg("escrow_to", escrow_to),
    )
}

/// Cancels a motion; one commit, pushed.
pub fn cancel_motion(cx: &CancelToken, gov: &RepoAddress, id: &MotionId) -> Result<()> {
    let cloned = ClonedRepo::clone(cx, gov)?;
    cancel_motion_staged(cx, &cloned, id)?;
    let change = Change::new("motion_cancel", format!("Cancel motion {id}")).arg("id", id);
    cloned.commit_if_changed(cx, &change)?;
    cloned.push(cx)
}

/// Stages cancellation of a motion through its policy.
pub fn cancel_motion_staged(cx: &CancelToken, gov: &ClonedRepo, id: &MotionId) -> Result<()> {
    cx.check()?;
    let mut motion = get_motion_local(gov, id)?;
    require_open(&motion)?;
    let policy = lookup_policy(&motion.policy)?;
    let notices = policy.cancel(cx, gov, &motion, &policy_ns(id))?;
    motion.cancelled = true;
    save_staged(gov, &motion)?;
    notice::stage_staged(cx, gov, id, &notices)?;
    history::log_staged(cx, gov, &Event::new("motion_cancel").arg("id", id))
}

/// Freezes a motion; one commit, pushed.
pub fn freeze_motion(cx: &CancelToken, gov: &RepoAddress, id: &MotionId) -> Result<()> {
    let cloned = ClonedRepo::clone(cx, gov)?;
    freeze_motion_staged(cx, &cloned, id)?;
    let change = Change::new("motion_freeze", format!("Freeze motion {id}")).arg("id", id);
    cloned.commit_if_changed(cx, &change)?;
    cloned.push(cx)
}

/// Stages the frozen flag and dispatches the policy's `freeze` handler.
pub fn freeze_motion_staged(cx: &CancelToken, gov: &ClonedRepo, id: &MotionId) -> Result<()> {
    cx.check()?;
    let mut motion = get_motion_local(gov, id)?;
    require_open(&motion)?;
    if motion.frozen {
        return Ok(());
    }
    motion.frozen = true;
    save_staged(gov, &motion)?;
    let policy = lookup_policy(&motion.policy)?;
    let notices = policy.freeze(cx, gov, &motion, &policy_ns(id))?;
    notice::stage_staged(cx, gov, id, &notices)?;
    history::log_staged(cx, gov, &Event::new("motion_freeze").arg("id", id))
}

/// Unfreezes a motion; one commit, pushed.
pub fn unfreeze_motion(cx: &CancelToken, gov: &RepoAddress, id: &MotionId) -> Result<()> {
    let cloned = ClonedRepo::clone(cx, gov)?;
    unfreeze_motion_staged(cx, &cloned, id)?;
    let change = Change::new("motion_unfreeze", format!("Unfreeze motion {id}")).arg("id", id);
    cloned.commit_if_changed(cx, &change)?;
    cloned.push(cx)
}

/// Stages clearing of the frozen flag and dispatches the policy handler.
pub fn unfreeze_motion_staged(cx: &CancelToken, gov: &ClonedRepo, id: &MotionId) -> Result<()> {
    cx.check()?;
    let mut motion = get_motion_local(gov, id)?;
    require_open(&motion)?;
    if !motion.frozen {
        return Ok(());
    }
    motion.frozen = false;
    save_staged(gov, &motion)?;
    let policy = lookup_policy(&motion.policy)?;
    let notices = policy.unfreeze(cx, gov, &motion, &policy_ns(id))?;
    notice::stage_staged(cx, gov, id, &notices)?;
    history::log_staged(cx, gov, &Event::new("motion_unfreeze").arg("id", id))
}

/// Revalidates a motion's policy state; one commit, pushed.
pub fn update_motion(cx: &CancelToken, gov: &RepoAddress, id: &MotionId) -> Result<()> {
    let cloned = ClonedRepo::clone(cx, gov)?;
    update_motion_staged(cx, &cloned, id)?;
    let change = Change::new("motion_update", format!("Update motion {id}")).arg("id", id);
    cloned.commit_if_changed(cx, &change)?;
    cloned.push(cx)
}

/// Dispatches the policy's `update` handler.
pub fn update_motion_staged(cx: &CancelToken, gov: &ClonedRepo, id: &MotionId) -> Result<()> {
    cx.check()?;
    let motion = get_motion_local(gov, id)?;
    require_open(&motion)?;
    let policy = lookup_policy(&motion.policy)?;
    let notices = policy.update(cx, gov, &motion, &policy_ns(id))?;
    notice::stage_staged(cx, gov, id, &notices)
}

/// Refreshes every open motion's score; one commit, pushed.
pub fn score_all(cx: &CancelToken, gov: &RepoAddress) -> Result<Vec<(MotionId, f64)>> {
    let cloned = ClonedRepo::clone(cx, gov)?;
    let scores = score_all_staged(cx, &cloned)?;
    let change = Change::new("motion_score_all", "Refresh motion scores")
        .arg("count", &scores.len());
    cloned.commit_if_changed(cx, &change)?;
    cloned.push(cx)?;
    Ok(scores)
}

/// Recomputes and stores the score of every open motion via its policy.
pub fn score_all_staged(cx: &CancelToken, gov: &ClonedRepo) -> Result<Vec<(MotionId, f64)>> {
    let mut scores = Vec::new();
    for mut motion in list_motions_local(gov)? {
        if motion.is_terminal() {
            continue;
        }
        cx.check()?;
        let policy = lookup_policy(&motion.policy)?;
        let (score, notices) = policy.score(cx, gov, &motion, &policy_ns(&motion.id))?;
        motion.score = score;
        save_staged(gov, &motion)?;
        notice::stage_staged(cx, gov, &motion.id, &notices)?;
        scores.push((motion.id, score));
    }
    Ok(scores)
}

/// Shows a motion with its policy view; read-only clone.
pub fn show_motion(cx: &CancelToken, gov: &RepoAddress, id: &MotionId) -> Result<MotionView> {
    let cloned = ClonedRepo::clone(cx, gov)?;
    show_motion_local(&cloned, id)
}

/// Reads a motion with its policy view from the local tree.
pub fn show_motion_local(gov: &ClonedRepo, id: &MotionId) -> Result<MotionView> {
    let motion = get_motion_local(gov, id)?;
    let policy = lookup_policy(&motion.policy)?;
    let view = policy.show(gov, &motion, &policy_ns(id))?;
    Ok(MotionView {
        motion,
        policy: view,
    })
}

/// Adds a typed reference between motions; one commit, pushed.
pub fn add_ref(
    cx: &CancelToken,
    gov: &RepoAddress,
    ref_type: &RefType,
    from: &MotionId,
    to: &MotionId,
) -> Result<()> {
    let cloned = ClonedRepo::clone(cx, gov)?;
    add_ref_staged(cx, &cloned, ref_type, from, to)?;
    let change = Change::new("motion_add_ref", format!("Add {ref_type} ref {from} -> {to}"))
        .arg("type", ref_type)
        .arg("from", from)
        .arg("to", to);
    cloned.commit_if_changed(cx, &change)?;
    cloned.push(cx)
}

/// Stages a reference on both motions and dispatches both policies.
///
/// The source policy sees `add_ref_to`, the target policy `add_ref_from`;
/// both run inside the same staged transaction, so either both land or
/// neither does.
pub fn add_ref_staged(
    cx: &CancelToken,
    gov: &ClonedRepo,
    ref_type: &RefType,
    from: &MotionId,
    to: &MotionId,
) -> Result<()> {
    cx.check()?;
    let mut from_motion = get_motion_local(gov, from)?;
    let mut to_motion = get_motion_local(gov, to)?;
    let reference = Ref {
        ref_type: ref_type.clone(),
        from: from.clone(),
        to: to.clone(),
    };
    if from_motion.refs_to.contains(&reference) {
        return Ok(());
    }
    from_motion.refs_to.push(reference.clone());
    from_motion.refs_to.sort();
    to_motion.refs_by.push(reference.clone());
    to_motion.refs_by.sort();
    save_staged(gov, &from_motion)?;
    save_staged(gov, &to_motion)?;

    let from_policy = lookup_policy(&from_motion.policy)?;
    let to_policy = lookup_policy(&to_motion.policy)?;
    let from_ns = policy_ns(from);
    let to_ns = policy_ns(to);
    let from_notices = from_policy.add_ref_to(
        cx, gov, &reference, &from_motion, &to_motion, &from_ns, &to_ns,
    )?;
    let to_notices = to_policy.add_ref_from(
        cx, gov, &reference, &from_motion, &to_motion, &from_ns, &to_ns,
    )?;
    notice::stage_staged(cx, gov, from, &from_notices)?;
    notice::stage_staged(cx, gov, to, &to_notices)?;

    history::log_staged(
        cx,
        gov,
        &Event::new("motion_add_ref")
            .arg("type", ref_type)
            .arg("from", from)
            .arg("to", to),
    )
}

/// Removes a typed reference between motions; one commit, pushed.
pub fn remove_ref(
    cx: &CancelToken,
    gov: &RepoAddress,
    ref_type: &RefType,
    from: &MotionId,
    to: &MotionId,
) -> Result<()> {
    let cloned = ClonedRepo::clone(cx, gov)?;
    remove_ref_staged(cx, &cloned, ref_type, from, to)?;
    let change = Change::new(
        "motion_remove_ref",
        format!("Remove {ref_type} ref {from} -> {to}"),
    )
    .arg("type", ref_type)
    .arg("from", from)
    .arg("to", to);
    cloned.commit_if_changed(cx, &change)?;
    cloned.push(cx)
}

/// Stages removal of a reference from both motions and dispatches both
/// policies.
pub fn remove_ref_staged(
    cx: &CancelToken,
    gov: &ClonedRepo,
    ref_type: &RefType,
    from: &MotionId,
    to: &MotionId,
) -> Result<()> {
    cx.check()?;
    let mut from_motion = get_motion_local(gov, from)?;
    let mut to_motion = get_motion_local(gov, to)?;
    let reference = Ref {
        ref_type: ref_type.clone(),
        from: from.clone(),
        to: to.clone(),
    };
    if !from_motion.refs_to.contains(&reference) {
        return Ok(());
    }
    from_motion.refs_to.retain(|r| r != &reference);
    to_motion.refs_by.retain(|r| r != &reference);
    save_staged(gov, &from_motion)?;
    save_staged(gov, &to_motion)?;

    let from_policy = lookup_policy(&from_motion.policy)?;
    let to_policy = lookup_policy(&to_motion.policy)?;
    let from_ns = policy_ns(from);
    let to_ns = policy_ns(to);
    let from_notices = from_policy.remove_ref_to(
        cx, gov, &reference, &from_motion, &to_motion, &from_ns, &to_ns,
    )?;
    let to_notices = to_policy.remove_ref_from(
        cx, gov, &reference, &from_motion, &to_motion, &from_ns, &to_ns,
    )?;
    notice::stage_staged(cx, gov, from, &from_notices)?;
    notice::stage_staged(cx, gov, to, &to_notices)?;

    history::log_staged(
        cx,
        gov,
        &Event::new("motion_remove_ref")
            .arg("type", ref_type)
            .arg("from", from)
            .arg("to", to),
    )
}
