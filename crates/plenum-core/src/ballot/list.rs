//! Showing and listing ballots.

use super::lifecycle::load_ad_local;
use super::schema::{AdTally, Advertisement, Tally, AD_FILE, TALLY_FILE};
use super::{ballot_ns, ballot_root_ns, BallotId};
use crate::cancel::CancelToken;
use crate::error::Result;
use crate::journal::{ClonedRepo, RepoAddress};
use crate::member::{self, UserHandle};

/// Predicate over ballots for [`list`]; an unset field does not filter.
#[derive(Clone, Debug, Default)]
pub struct ListFilter {
    /// Keep only ballots that are neither closed nor cancelled.
    pub only_open: bool,
    /// Keep only closed ballots.
    pub only_closed: bool,
    /// Keep only frozen ballots.
    pub only_frozen: bool,
    /// Keep only ballots whose participant group contains this user.
    pub with_participant: Option<UserHandle>,
}

impl ListFilter {
    fn admits(&self, gov: &ClonedRepo, ad: &Advertisement) -> bool {
        if self.only_open && ad.is_terminal() {
            return false;
        }
        if self.only_closed && !ad.closed {
            return false;
        }
        if self.only_frozen && !ad.frozen {
            return false;
        }
        if let Some(user) = &self.with_participant {
            if !member::is_member_local(gov, &ad.participants, user) {
                return false;
            }
        }
        true
    }
}

/// Returns a ballot's advertisement and tally.
pub fn show(cx: &CancelToken, gov: &RepoAddress, id: &BallotId) -> Result<AdTally> {
    let cloned = ClonedRepo::clone(cx, gov)?;
    show_local(&cloned, id)
}

/// Reads a ballot's advertisement and tally from the local tree.
pub fn show_local(gov: &ClonedRepo, id: &BallotId) -> Result<AdTally> {
    let ad = load_ad_local(gov, id)?;
    let tally: Tally = gov.read_json(&ballot_ns(id).join(TALLY_FILE))?;
    Ok(AdTally { ad, tally })
}

/// Lists ballots matching `filter`.
pub fn list(cx: &CancelToken, gov: &RepoAddress, filter: &ListFilter) -> Result<Vec<Advertisement>> {
    let cloned = ClonedRepo::clone(cx, gov)?;
    list_local(&cloned, filter)
}

/// Scans the ballot namespace of the local tree.
pub fn list_local(gov: &ClonedRepo, filter: &ListFilter) -> Result<Vec<Advertisement>> {
    let mut ads = Vec::new();
    for rel in gov.find_dirs_with(&ballot_root_ns(), AD_FILE)? {
        let id = BallotId::parse(&rel.to_string())?;
        let ad = load_ad_local(gov, &id)?;
        if filter.admits(gov, &ad) {
            ads.push(ad);
        }
    }
    Ok(ads)
}
