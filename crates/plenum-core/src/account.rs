//! Accounts and asset holdings.
//!
//! An account holds signed quantities of named assets. Every mutation
//! re-checks the balance invariant before anything is staged: outside escrow
//! accounts, no asset balance may go negative, and a failing check aborts the
//! whole transaction with nothing staged.
//!
//! `transfer` decomposes into a muted withdraw plus a muted deposit plus
//! exactly one `account_transfer` history event; the inner calls do not emit
//! their own events, which would double-count the movement in the audit log.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ballot::BallotId;
use crate::cancel::CancelToken;
use crate::error::{GovError, Result};
use crate::history::{self, Event};
use crate::journal::{validate_segment, Change, ClonedRepo, Namespace, RepoAddress};
use crate::kv::{Key, Kv};
use crate::member::{GroupName, UserHandle};

/// A named asset kind.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Asset(String);

impl Asset {
    /// Wraps an asset name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The community voting-credit asset.
    pub fn credits() -> Self {
        Self("credits".to_string())
    }

    /// The asset name as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A signed quantity of one asset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    /// The asset kind.
    pub asset: Asset,
    /// Signed quantity.
    pub quantity: f64,
}

impl Holding {
    /// Creates a holding.
    pub fn new(asset: Asset, quantity: f64) -> Self {
        Self { asset, quantity }
    }

    /// Shorthand for a voting-credit holding.
    pub fn credits(quantity: f64) -> Self {
        Self::new(Asset::credits(), quantity)
    }

    /// The negated holding; withdrawing is depositing the negation.
    pub fn neg(&self) -> Self {
        Self::new(self.asset.clone(), -self.quantity)
    }
}

impl fmt::Display for Holding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.quantity, self.asset)
    }
}

/// The principal owning an account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerId {
    /// A single user.
    User(UserHandle),
    /// A named group.
    Group(GroupName),
}

/// Account identifier; one file per account under `account/`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Wraps a validated account id.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        validate_segment(&id)?;
        Ok(Self(id))
    }

    /// The voting account of `user`.
    pub fn user(user: &UserHandle) -> Self {
        Self(format!("user.{user}"))
    }

    /// The escrow account of a ballot, holding credits spent but not yet
    /// refunded or routed.
    pub fn escrow_for_ballot(ballot: &BallotId) -> Self {
        Self(format!("escrow.ballot.{}", ballot.mangled()))
    }

    /// The community treasury.
    pub fn treasury() -> Self {
        Self("treasury".to_string())
    }

    /// The burn account; credits sent here leave circulation.
    pub fn burn() -> Self {
        Self("burn".to_string())
    }

    /// Escrow accounts are the only ones permitted a negative interim
    /// balance; they are managed exclusively by ballot strategies.
    pub fn is_escrow(&self) -> bool {
        self.0.starts_with("escrow.")
    }

    /// The id as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Key for AccountId {
    fn to_segment(&self) -> String {
        self.0.clone()
    }

    fn from_segment(segment: &str) -> Result<Self> {
        Self::new(segment)
    }
}

/// One account record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Account identifier.
    pub id: AccountId,
    /// Owning principal.
    pub owner: OwnerId,
    /// Holdings by asset.
    pub assets: BTreeMap<Asset, Holding>,
}

impl Account {
    /// Creates an empty account.
    pub fn new(id: AccountId, owner: OwnerId) -> Self {
        Self {
            id,
            owner,
            assets: BTreeMap::new(),
        }
    }

    /// Current balance of `asset`; zero when the asset was never held.
    pub fn balance(&self, asset: &Asset) -> Holding {
        self.assets
            .get(asset)
            .cloned()
            .unwrap_or_else(|| Holding::new(asset.clone(), 0.0))
    }

    fn deposit(&mut self, amount: &Holding) -> Result<()> {
        let balance = self.balance(&amount.asset);
        let next = balance.quantity + amount.quantity;
        if next < 0.0 && !self.id.is_escrow() {
            return Err(GovError::invariant(format!(
                "insufficient funds in account {}: balance {} cannot absorb {}",
                self.id, balance.quantity, amount
            )));
        }
        self.assets
            .insert(amount.asset.clone(), Holding::new(amount.asset.clone(), next));
        Ok(())
    }
}

const ACCOUNT_KV: Kv<AccountId, Account> = Kv::new();

/// Root of the account namespace.
pub fn account_ns() -> Namespace {
    Namespace::new(["account"])
}

/// Creates an account; one commit, pushed.
pub fn create(
    cx: &CancelToken,
    gov: &RepoAddress,
    id: &AccountId,
    owner: &OwnerId,
    note: &str,
) -> Result<()> {
    let cloned = ClonedRepo::clone(cx, gov)?;
    create_staged(cx, &cloned, id, owner, note)?;
    let change = Change::new("account_create", format!("Create account {id}")).arg("id", id);
    cloned.commit_if_changed(cx, &change)?;
    cloned.push(cx)
}

/// Stages creation of an account.
pub fn create_staged(
    cx: &CancelToken,
    gov: &ClonedRepo,
    id: &AccountId,
    owner: &OwnerId,
    note: &str,
) -> Result<()> {
    if exists_local(gov, id) {
        return Err(GovError::already_exists(format!("account {id}")));
    }
    ACCOUNT_KV.set(
        &account_ns(),
        gov,
        id,
        &Account::new(id.clone(), owner.clone()),
    )?;
    history::log_staged(
        cx,
        gov,
        &Event::new("account_create")
            .note(note)
            .arg("id", id)
            .arg("owner", owner),
    )
}

/// True when the account exists in the local tree.
pub fn exists_local(gov: &ClonedRepo, id: &AccountId) -> bool {
    ACCOUNT_KV.exists(&account_ns(), gov, id)
}

/// Reads an account from the local tree.
pub fn get_local(gov: &ClonedRepo, id: &AccountId) -> Result<Account> {
    ACCOUNT_KV.get(&account_ns(), gov, id)
}

/// Lists every account id, sorted.
pub fn list_local(gov: &ClonedRepo) -> Result<Vec<AccountId>> {
    ACCOUNT_KV.list_keys(&account_ns(), gov)
}

/// Deposits `amount` into `to`; one commit, pushed.
pub fn deposit(
    cx: &CancelToken,
    gov: &RepoAddress,
    to: &AccountId,
    amount: &Holding,
    note: &str,
) -> Result<()> {
    let cloned = ClonedRepo::clone(cx, gov)?;
    deposit_staged(cx, &cloned, to, amount, note)?;
    let change = Change::new("account_deposit", format!("Deposit {amount} to {to}"))
        .arg("to", to)
        .arg("amount", amount);
    cloned.commit_if_changed(cx, &change)?;
    cloned.push(cx)
}

/// Stages a deposit and its history event.
pub fn deposit_staged(
    cx: &CancelToken,
    gov: &ClonedRepo,
    to: &AccountId,
    amount: &Holding,
    note: &str,
) -> Result<()> {
    apply_deposit(gov, to, amount)?;
    history::log_staged(
        cx,
        gov,
        &Event::new("account_deposit")
            .note(note)
            .arg("to", to)
            .arg("amount", amount),
    )
}

/// Stages a withdrawal (a deposit of the negation) and its history event.
pub fn withdraw_staged(
    cx: &CancelToken,
    gov: &ClonedRepo,
    from: &AccountId,
    amount: &Holding,
    note: &str,
) -> Result<()> {
    apply_deposit(gov, from, &amount.neg())?;
    history::log_staged(
        cx,
        gov,
        &Event::new("account_withdraw")
            .note(note)
            .arg("from", from)
            .arg("amount", amount),
    )
}

/// Transfers `amount` between accounts; one commit, pushed.
pub fn transfer(
    cx: &CancelToken,
    gov: &RepoAddress,
    from: &AccountId,
    to: &AccountId,
    amount: &Holding,
    note: &str,
) -> Result<()> {
    let cloned = ClonedRepo::clone(cx, gov)?;
    transfer_staged(cx, &cloned, from, to, amount, note)?;
    let change = Change::new(
        "account_transfer",
        format!("Transfer {amount} from {from} to {to}"),
    )
    .arg("from", from)
    .arg("to", to)
    .arg("amount", amount);
    cloned.commit_if_changed(cx, &change)?;
    cloned.push(cx)
}

/// Stages a transfer: muted withdraw, muted deposit, one history event.
///
/// The invariant check on the source account runs before anything is staged,
/// so a failing transfer leaves the tree untouched.
pub fn transfer_staged(
    cx: &CancelToken,
    gov: &ClonedRepo,
    from: &AccountId,
    to: &AccountId,
    amount: &Holding,
    note: &str,
) -> Result<()> {
    if amount.quantity < 0.0 {
        return Err(GovError::invariant(format!(
            "transfer amount must be non-negative, got {amount}"
        )));
    }
    apply_deposit(gov, from, &amount.neg())?;
    apply_deposit(gov, to, amount)?;
    history::log_staged(
        cx,
        gov,
        &Event::new("account_transfer")
            .note(note)
            .arg("from", from)
            .arg("to", to)
            .arg("amount", amount),
    )
}

/// Stages the standing community accounts: treasury and burn.
pub fn boot_staged(cx: &CancelToken, gov: &ClonedRepo) -> Result<()> {
    let owner = OwnerId::Group(GroupName::everybody());
    create_staged(cx, gov, &AccountId::treasury(), &owner, "community treasury")?;
    create_staged(cx, gov, &AccountId::burn(), &owner, "burned credits")
}

// In-memory check before any stage write; this is the single funnel through
// which every balance changes.
fn apply_deposit(gov: &ClonedRepo, id: &AccountId, amount: &Holding) -> Result<()> {
    let mut account = get_local(gov, id)?;
    account.deposit(amount)?;
    ACCOUNT_KV.set(&account_ns(), gov, id, &account)
}
