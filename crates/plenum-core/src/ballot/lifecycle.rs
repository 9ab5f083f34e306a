//! Ballot lifecycle: freeze, unfreeze, close, cancel, erase.

use super::schema::{Advertisement, Tally, AD_FILE, TALLY_FILE};
use super::{ballot_ns, BallotId};
use crate::account::{self, AccountId, Asset, Holding};
use crate::cancel::CancelToken;
use crate::error::{GovError, Result};
use crate::history::{self, Event};
use crate::journal::{Change, ClonedRepo, RepoAddress};

/// Reads a ballot's advertisement from the local tree.
pub fn load_ad_local(gov: &ClonedRepo, id: &BallotId) -> Result<Advertisement> {
    gov.read_json(&ballot_ns(id).join(AD_FILE))
}

/// True when the ballot exists and is frozen.
pub fn is_frozen_local(gov: &ClonedRepo, id: &BallotId) -> Result<bool> {
    Ok(load_ad_local(gov, id)?.frozen)
}

fn load_tally_local(gov: &ClonedRepo, id: &BallotId) -> Result<Tally> {
    gov.read_json(&ballot_ns(id).join(TALLY_FILE))
}

fn save_ad_staged(gov: &ClonedRepo, ad: &Advertisement) -> Result<()> {
    gov.write_json_staged(&ballot_ns(&ad.id).join(AD_FILE), ad)
}

fn require_live(ad: &Advertisement) -> Result<()> {
    if ad.is_terminal() {
        return Err(GovError::invariant(format!(
            "ballot {} is closed or cancelled",
            ad.id
        )));
    }
    Ok(())
}

/// Freezes a ballot; one commit, pushed.
pub fn freeze(cx: &CancelToken, gov: &RepoAddress, id: &BallotId) -> Result<()> {
    let cloned = ClonedRepo::clone(cx, gov)?;
    freeze_staged(cx, &cloned, id)?;
    let change = Change::new("ballot_freeze", format!("Freeze ballot {id}")).arg("id", id);
    cloned.commit_if_changed(cx, &change)?;
    cloned.push(cx)
}

/// Stages the frozen flag. Frozen ballots accept no new votes during tally.
pub fn freeze_staged(cx: &CancelToken, gov: &ClonedRepo, id: &BallotId) -> Result<()> {
    cx.check()?;
    let mut ad = load_ad_local(gov, id)?;
    require_live(&ad)?;
    if ad.frozen {
        return Ok(());
    }
    ad.frozen = true;
    save_ad_staged(gov, &ad)?;
    history::log_staged(cx, gov, &Event::new("ballot_freeze").arg("id", id))
}

/// Unfreezes a ballot; one commit, pushed.
pub fn unfreeze(cx: &CancelToken, gov: &RepoAddress, id: &BallotId) -> Result<()> {
    let cloned = ClonedRepo::clone(cx, gov)?;
    unfreeze_staged(cx, &cloned, id)?;
    let change = Change::new("ballot_unfreeze", format!("Unfreeze ballot {id}")).arg("id", id);
    cloned.commit_if_changed(cx, &change)?;
    cloned.push(cx)
}

/// Stages clearing of the frozen flag.
pub fn unfreeze_staged(cx: &CancelToken, gov: &ClonedRepo, id: &BallotId) -> Result<()> {
    cx.check()?;
    let mut ad = load_ad_local(gov, id)?;
    require_live(&ad)?;
    if !ad.frozen {
        return Ok(());
    }
    ad.frozen = false;
    save_ad_staged(gov, &ad)?;
    history::log_staged(cx, gov, &Event::new("ballot_unfreeze").arg("id", id))
}

/// Closes a ballot, routing the remaining escrow to `escrow_to`; one commit,
/// pushed.
pub fn close(
    cx: &CancelToken,
    gov: &RepoAddress,
    id: &BallotId,
    escrow_to: &AccountId,
) -> Result<()> {
    let cloned = ClonedRepo::clone(cx, gov)?;
    close_staged(cx, &cloned, id, escrow_to)?;
    let change = Change::new("ballot_close", format!("Close ballot {id}"))
        .arg("id", id)
        .arg("escrow_to", escrow_to);
    cloned.commit_if_changed(cx, &change)?;
    cloned.push(cx)
}

/// Stages closure: the remaining escrow balance moves to `escrow_to` and the
/// tally becomes immutable.
pub fn close_staged(
    cx: &CancelToken,
    gov: &ClonedRepo,
    id: &BallotId,
    escrow_to: &AccountId,
) -> Result<()> {
    cx.check()?;
    let mut ad = load_ad_local(gov, id)?;
    require_live(&ad)?;
    let escrow_balance = account::get_local(gov, &ad.escrow)?.balance(&Asset::credits());
    if escrow_balance.quantity != 0.0 {
        account::transfer_staged(
            cx,
            gov,
            &ad.escrow,
            escrow_to,
            &escrow_balance,
            &format!("close ballot {id}"),
        )?;
    }
    ad.closed = true;
    save_ad_staged(gov, &ad)?;
    history::log_staged(
        cx,
        gov,
        &Event::new("ballot_close")
            .arg("id", id)
            .arg("escrow_to", escrow_to)
            .arg("escrow_routed", &escrow_balance),
    )?;
    tracing::info!(id = %id, escrow_to = %escrow_to, "closed ballot");
    Ok(())
}

/// Cancels a ballot; one commit, pushed.
pub fn cancel(cx: &CancelToken, gov: &RepoAddress, id: &BallotId) -> Result<()> {
    let cloned = ClonedRepo::clone(cx, gov)?;
    cancel_staged(cx, &cloned, id)?;
    let change = Change::new("ballot_cancel", format!("Cancel ballot {id}")).arg("id", id);
    cloned.commit_if_changed(cx, &change)?;
    cloned.push(cx)
}

/// Stages cancellation: every user's recorded charge returns from escrow to
/// that user's voting account, then the ballot becomes immutable.
pub fn cancel_staged(cx: &CancelToken, gov: &ClonedRepo, id: &BallotId) -> Result<()> {
    cx.check()?;
    let mut ad = load_ad_local(gov, id)?;
    require_live(&ad)?;
    let tally = load_tally_local(gov, id)?;
    for (user, charge) in &tally.charges {
        if *charge == 0.0 {
            continue;
        }
        account::transfer_staged(
            cx,
            gov,
            &ad.escrow,
            &AccountId::user(user),
            &Holding::credits(*charge),
            &format!("refund on cancellation of ballot {id}"),
        )?;
    }
    ad.cancelled = true;
    save_ad_staged(gov, &ad)?;
    history::log_staged(
        cx,
        gov,
        &Event::new("ballot_cancel")
            .arg("id", id)
            .arg("refunded", &tally.charges),
    )?;
    tracing::info!(id = %id, "cancelled ballot");
    Ok(())
}

/// Erases a closed or cancelled ballot's tree; one commit, pushed.
pub fn erase(cx: &CancelToken, gov: &RepoAddress, id: &BallotId) -> Result<()> {
    let cloned = ClonedRepo::clone(cx, gov)?;
    erase_staged(cx, &cloned, id)?;
    let change = Change::new("ballot_erase", format!("Erase ballot {id}")).arg("id", id);
    cloned.commit_if_changed(cx, &change)?;
    cloned.push(cx)
}

/// Stages removal of the ballot tree. Only terminal ballots may be erased.
pub fn erase_staged(cx: &CancelToken, gov: &ClonedRepo, id: &BallotId) -> Result<()> {
    cx.check()?;
    let ad = load_ad_local(gov, id)?;
    if !ad.is_terminal() {
        return Err(GovError::invariant(format!(
            "ballot {id} must be closed or cancelled before erasure"
        )));
    }
    gov.remove_dir_staged(&ballot_ns(id))?;
    history::log_staged(cx, gov, &Event::new("ballot_erase").arg("id", id))
}
