//! Bureau: member-initiated service requests processed by the organizer.
//!
//! Members mail signed requests from their own repositories on the `bureau`
//! topic; each governance tick drains every member's request stream. The only
//! request kind is a credit transfer out of the requesting member's own
//! voting account — the stream's signature already authenticates the
//! spender, so no further authorization is needed.

use serde::{Deserialize, Serialize};

use crate::account::{self, AccountId, Holding};
use crate::cancel::CancelToken;
use crate::error::{GovError, Result};
use crate::journal::{Change, ClonedOwner, ClonedRepo, OwnerAddress, RepoAddress};
use crate::mail::{self, SeqNo};
use crate::member::{self, GroupName, UserHandle};

/// Mail topic carrying bureau requests.
pub const BUREAU_TOPIC: &str = "bureau";

/// A member's request to the organizer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BureauRequest {
    /// Move credits from the requesting member's voting account to another
    /// user's voting account.
    Transfer {
        /// Receiving user.
        to_user: UserHandle,
        /// Amount to move; must be non-negative.
        amount: Holding,
    },
}

/// Mails a transfer request from the member's repositories; one commit in
/// the member's public repo, pushed.
pub fn request_transfer(
    cx: &CancelToken,
    member: &OwnerAddress,
    gov: &RepoAddress,
    to_user: &UserHandle,
    amount: &Holding,
) -> Result<SeqNo> {
    let member_clone = ClonedOwner::clone(cx, member)?;
    let request = BureauRequest::Transfer {
        to_user: to_user.clone(),
        amount: amount.clone(),
    };
    let seq = mail::send_signed_staged(cx, &member_clone, gov, BUREAU_TOPIC, &request)?;
    let change = Change::new("bureau_request", format!("Request transfer to {to_user}"))
        .arg("to_user", to_user)
        .arg("amount", amount);
    member_clone.public.commit_if_changed(cx, &change)?;
    member_clone.public.push(cx)?;
    Ok(seq)
}

/// Drains the bureau stream of every member of `group`, staging the
/// resulting account movements. Returns one change record per executed
/// request.
pub fn process_staged(
    cx: &CancelToken,
    gov: &ClonedRepo,
    group: &GroupName,
) -> Result<Vec<Change>> {
    let mut changes = Vec::new();
    for user in member::list_group_users_local(gov, group)? {
        cx.check()?;
        let profile = member::get_user_local(gov, &user)?;
        let member_tree = match ClonedRepo::clone(cx, &profile.public_url) {
            Ok(tree) => tree,
            Err(GovError::Cancelled) => return Err(GovError::Cancelled),
            Err(err) => {
                tracing::warn!(user = %user, error = %err, "skipping unreachable member");
                continue;
            }
        };
        let executed = mail::receive_signed_staged(
            cx,
            gov,
            &profile.public_url,
            &member_tree,
            BUREAU_TOPIC,
            |_seq, request: BureauRequest| {
                execute(cx, gov, &user, &request)?;
                Ok(request)
            },
        )?;
        for (seq, request) in executed {
            let BureauRequest::Transfer { to_user, amount } = request;
            changes.push(
                Change::new("bureau_transfer", format!("Bureau transfer by {user}"))
                    .arg("from_user", &user)
                    .arg("to_user", &to_user)
                    .arg("amount", &amount)
                    .arg("seq", &seq),
            );
        }
    }
    Ok(changes)
}

fn execute(
    cx: &CancelToken,
    gov: &ClonedRepo,
    from_user: &UserHandle,
    request: &BureauRequest,
) -> Result<()> {
    match request {
        BureauRequest::Transfer { to_user, amount } => account::transfer_staged(
            cx,
            gov,
            &AccountId::user(from_user),
            &AccountId::user(to_user),
            amount,
            &format!("bureau transfer requested by {from_user}"),
        ),
    }
}
