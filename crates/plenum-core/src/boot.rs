//! Bootstrap of a fresh governance repository pair.

use crate::account;
use crate::cancel::CancelToken;
use crate::error::Result;
use crate::identity::{self, PublicCredentials};
use crate::journal::{Change, ClonedOwner, OwnerAddress};
use crate::member::{self, GroupName};

/// Initializes a governance repository pair: organizer identity, the
/// `everybody` group, and the standing treasury and burn accounts. One
/// commit per repository, both pushed.
pub fn boot(cx: &CancelToken, gov: &OwnerAddress) -> Result<PublicCredentials> {
    let owner = ClonedOwner::clone(cx, gov)?;
    let credentials = boot_staged(cx, &owner)?;
    let change = Change::new("boot", "Initialize governance repositories");
    owner.public.commit_if_changed(cx, &change)?;
    owner.private.commit_if_changed(cx, &change)?;
    owner.public.push(cx)?;
    owner.private.push(cx)?;
    Ok(credentials)
}

/// Stages the bootstrap into an already-cloned pair.
pub fn boot_staged(cx: &CancelToken, owner: &ClonedOwner) -> Result<PublicCredentials> {
    let credentials = identity::init_staged(owner)?;
    member::set_group_staged(cx, &owner.public, &GroupName::everybody())?;
    account::boot_staged(cx, &owner.public)?;
    Ok(credentials)
}
