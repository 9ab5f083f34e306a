//! The policy trait and its process-wide registry.
//!
//! Policies are registered under a name at process start and looked up by
//! the name persisted on each motion. The registry is read-only after
//! initialization; concurrent lookups are safe.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use serde_json::Value;

use super::policies::{ConcernPolicy, ProposalPolicy};
use super::schema::{Motion, Ref};
use crate::account::AccountId;
use crate::cancel::CancelToken;
use crate::error::{GovError, Result};
use crate::journal::{ClonedRepo, Namespace};
use crate::notice::Notices;

/// A named bundle of handlers interpreting a motion's lifecycle.
///
/// Handlers receive the governance tree, the motion record as of dispatch,
/// and the motion's policy namespace. They stage their effects and return
/// notices; the dispatching operation stages the notices and the commit.
#[allow(unused_variables)]
pub trait Policy: Send + Sync {
    /// Registry name, persisted on each motion.
    fn name(&self) -> &'static str;

    /// The motion was just opened.
    fn open(
        &self,
        cx: &CancelToken,
        gov: &ClonedRepo,
        motion: &Motion,
        policy_ns: &Namespace,
    ) -> Result<Notices>;

    /// Recomputes the motion's score.
    fn score(
        &self,
        cx: &CancelToken,
        gov: &ClonedRepo,
        motion: &Motion,
        policy_ns: &Namespace,
    ) -> Result<(f64, Notices)>;

    /// Revalidates policy state against the rest of the tree.
    fn update(
        &self,
        cx: &CancelToken,
        gov: &ClonedRepo,
        motion: &Motion,
        policy_ns: &Namespace,
    ) -> Result<Notices>;

    /// The motion is closing; ballot escrow routes to `escrow_to`.
    fn close(
        &self,
        cx: &CancelToken,
        gov: &ClonedRepo,
        motion: &Motion,
        policy_ns: &Namespace,
        escrow_to: &AccountId,
    ) -> Result<Notices>;

    /// The motion is cancelled; charges return to voters.
    fn cancel(
        &self,
        cx: &CancelToken,
        gov: &ClonedRepo,
        motion: &Motion,
        policy_ns: &Namespace,
    ) -> Result<Notices>;

    /// The motion is being frozen.
    fn freeze(
        &self,
        cx: &CancelToken,
        gov: &ClonedRepo,
        motion: &Motion,
        policy_ns: &Namespace,
    ) -> Result<Notices>;

    /// The motion is being unfrozen.
    fn unfreeze(
        &self,
        cx: &CancelToken,
        gov: &ClonedRepo,
        motion: &Motion,
        policy_ns: &Namespace,
    ) -> Result<Notices>;

    /// Renders the policy's view of the motion.
    fn show(&self, gov: &ClonedRepo, motion: &Motion, policy_ns: &Namespace) -> Result<Value>;

    /// A reference from this motion to another was added.
    fn add_ref_to(
        &self,
        cx: &CancelToken,
        gov: &ClonedRepo,
        reference: &Ref,
        from: &Motion,
        to: &Motion,
        from_ns: &Namespace,
        to_ns: &Namespace,
    ) -> Result<Notices> {
        Ok(Notices::new())
    }

    /// A reference from another motion to this one was added.
    fn add_ref_from(
        &self,
        cx: &CancelToken,
        gov: &ClonedRepo,
        reference: &Ref,
        from: &Motion,
        to: &Motion,
        from_ns: &Namespace,
        to_ns: &Namespace,
    ) -> Result<Notices> {
        Ok(Notices::new())
    }

    /// A reference from this motion to another was removed.
    fn remove_ref_to(
        &self,
        cx: &CancelToken,
        gov: &ClonedRepo,
        reference: &Ref,
        from: &Motion,
        to: &Motion,
        from_ns: &Namespace,
        to_ns: &Namespace,
    ) -> Result<Notices> {
        Ok(Notices::new())
    }

    /// A reference from another motion to this one was removed.
    fn remove_ref_from(
        &self,
        cx: &CancelToken,
        gov: &ClonedRepo,
        reference: &Ref,
        from: &Motion,
        to: &Motion,
        from_ns: &Namespace,
        to_ns: &Namespace,
    ) -> Result<Notices> {
        Ok(Notices::new())
    }
}

type Registry = RwLock<HashMap<String, Arc<dyn Policy>>>;

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| {
        let mut map: HashMap<String, Arc<dyn Policy>> = HashMap::new();
        let concern: Arc<dyn Policy> = Arc::new(ConcernPolicy::new());
        let proposal: Arc<dyn Policy> = Arc::new(ProposalPolicy::new());
        map.insert(concern.name().to_string(), concern);
        map.insert(proposal.name().to_string(), proposal);
        RwLock::new(map)
    })
}

/// Registers `policy` under its name, replacing any previous registration.
pub fn install_policy(policy: Arc<dyn Policy>) -> Result<()> {
    let mut guard = registry()
        .write()
        .map_err(|_| GovError::invariant("policy registry poisoned"))?;
    guard.insert(policy.name().to_string(), policy);
    Ok(())
}

/// Looks a policy up by name.
pub fn lookup_policy(name: &str) -> Result<Arc<dyn Policy>> {
    let guard = registry()
        .read()
        .map_err(|_| GovError::invariant("policy registry poisoned"))?;
    guard
        .get(name)
        .cloned()
        .ok_or_else(|| GovError::not_exist(format!("policy {name}")))
}
