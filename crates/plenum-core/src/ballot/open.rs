//! Opening ballots.

use super::schema::{Advertisement, Tally, AD_FILE, STRATEGY_FILE, TALLY_FILE};
use super::strategy::{Strategy, StrategyDescriptor};
use super::{ballot_ns, BallotId};
use crate::account::{self, AccountId, OwnerId};
use crate::cancel::CancelToken;
use crate::error::{GovError, Result};
use crate::history::{self, Event};
use crate::journal::{Change, ClonedRepo, RepoAddress};
use crate::member::{self, GroupName};

/// Arguments to [`open`], grouped to keep call sites readable.
#[derive(Clone, Debug)]
pub struct OpenArgs {
    /// Ballot identifier; must not already exist.
    pub id: BallotId,
    /// Escrow account for charged credits; created if absent.
    pub escrow: AccountId,
    /// What the ballot decides.
    pub purpose: String,
    /// Human title.
    pub title: String,
    /// Human description.
    pub description: String,
    /// Available choices.
    pub choices: Vec<String>,
    /// Participating group; must exist.
    pub participants: GroupName,
}

/// Opens a ballot; one commit, pushed.
pub fn open(
    cx: &CancelToken,
    gov: &RepoAddress,
    strategy: &dyn Strategy,
    args: OpenArgs,
) -> Result<Advertisement> {
    let cloned = ClonedRepo::clone(cx, gov)?;
    let ad = open_staged(cx, &cloned, strategy, args)?;
    let change = Change::new("ballot_open", format!("Open ballot {}", ad.id))
        .arg("id", &ad.id)
        .arg("strategy", &ad.strategy)
        .arg("participants", &ad.participants);
    cloned.commit_if_changed(cx, &change)?;
    cloned.push(cx)?;
    Ok(ad)
}

/// Stages a new ballot: advertisement, empty tally, strategy descriptor, and
/// the escrow account when it does not exist yet.
///
/// The descriptor file is overwritten on every open; the `ballot_open`
/// history event captures the descriptor so strategy parameters at open time
/// survive a later erase-and-reopen in the audit log.
pub fn open_staged(
    cx: &CancelToken,
    gov: &ClonedRepo,
    strategy: &dyn Strategy,
    args: OpenArgs,
) -> Result<Advertisement> {
    cx.check()?;
    let ns = ballot_ns(&args.id);
    if gov.exists(&ns.join(AD_FILE)) {
        return Err(GovError::already_exists(format!("ballot {}", args.id)));
    }
    if !member::is_group_local(gov, &args.participants) {
        return Err(GovError::invariant(format!(
            "participant group {} does not exist",
            args.participants
        )));
    }
    if !account::exists_local(gov, &args.escrow) {
        account::create_staged(
            cx,
            gov,
            &args.escrow,
            &OwnerId::Group(args.participants.clone()),
            &format!("escrow for ballot {}", args.id),
        )?;
    }

    let ad = Advertisement {
        gov: gov.address().clone(),
        id: args.id,
        purpose: args.purpose,
        title: args.title,
        description: args.description,
        choices: args.choices,
        strategy: strategy.name().to_string(),
        participants: args.participants,
        escrow: args.escrow,
        frozen: false,
        closed: false,
        cancelled: false,
        parent_commit: gov.head()?,
    };
    gov.write_json_staged(&ns.join(AD_FILE), &ad)?;
    gov.write_json_staged(&ns.join(TALLY_FILE), &Tally::empty(ad.id.clone()))?;
    let descriptor = StrategyDescriptor::of(strategy)?;
    gov.write_json_staged(&ns.join(STRATEGY_FILE), &descriptor)?;

    history::log_staged(
        cx,
        gov,
        &Event::new("ballot_open")
            .arg("id", &ad.id)
            .arg("strategy", &descriptor)
            .arg("participants", &ad.participants),
    )?;
    tracing::info!(id = %ad.id, strategy = %ad.strategy, "opened ballot");
    Ok(ad)
}
