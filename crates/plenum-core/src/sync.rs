//! The governance tick.
//!
//! One tick tallies every open ballot and drains every member's bureau
//! stream, all inside a single clone→commit→push cycle. Ticks are externally
//! serialized: run one organizer process at a time. When two organizers race
//! anyway, the losing push surfaces [`crate::GovError::Conflict`]; re-running
//! the tick against a fresh clone reconciles with no lost votes, because
//! member streams are consumed by cursor, not deleted.

use serde::{Deserialize, Serialize};

use crate::ballot;
use crate::bureau;
use crate::cancel::CancelToken;
use crate::error::Result;
use crate::journal::{Change, ClonedRepo, RepoAddress};
use crate::member::GroupName;

/// What one tick did.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SyncReport {
    /// Change records from tallying and bureau processing, in order.
    pub changes: Vec<Change>,
}

/// Performs one governance tick; one commit, pushed.
pub fn sync(cx: &CancelToken, gov: &RepoAddress, max_par: usize) -> Result<SyncReport> {
    let cloned = ClonedRepo::clone(cx, gov)?;
    let report = sync_staged(cx, &cloned, max_par)?;
    let change = Change::new("sync_tick", "Governance tick")
        .arg("changes", &report.changes.len());
    cloned.commit_if_changed(cx, &change)?;
    cloned.push(cx)?;
    tracing::info!(changes = report.changes.len(), "completed governance tick");
    Ok(report)
}

/// Stages one tick: tally all open ballots, then process bureau requests
/// from everybody.
pub fn sync_staged(cx: &CancelToken, gov: &ClonedRepo, max_par: usize) -> Result<SyncReport> {
    let mut changes = ballot::tally_all_staged(cx, gov, max_par)?;
    changes.extend(bureau::process_staged(cx, gov, &GroupName::everybody())?);
    Ok(SyncReport { changes })
}
