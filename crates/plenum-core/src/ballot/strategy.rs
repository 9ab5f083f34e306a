//! Voting strategies and their process-wide registry.
//!
//! A strategy interprets fetched vote envelopes into score and charge
//! changes. Strategies are registered under a name at process start and
//! looked up by the name persisted in each ballot's strategy descriptor;
//! there is no dynamic code loading.
//!
//! Every implementation must uphold the tally invariants:
//!
//! 1. rejected votes move no credits;
//! 2. accepted votes move exactly the strategy-computed charge from the
//!    voter's account to the ballot escrow;
//! 3. a user's score per choice equals the strategy's vote function applied
//!    to the strengths in force;
//! 4. re-tallying with no new votes changes nothing.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::qv::QvStrategy;
use super::schema::{Advertisement, Tally, VoteEnvelope};
use super::{ballot_ns, BallotId};
use crate::cancel::CancelToken;
use crate::error::{GovError, Result};
use crate::journal::ClonedRepo;
use crate::mail::SeqNo;
use crate::member::UserHandle;

/// One envelope fetched from a member's repository during tally.
#[derive(Clone, Debug)]
pub struct FetchedVote {
    /// The voting member.
    pub voter: UserHandle,
    /// Sequence number within the member's vote stream.
    pub seq: SeqNo,
    /// The verified envelope.
    pub envelope: VoteEnvelope,
}

/// A named vote-interpretation algorithm.
pub trait Strategy: Send + Sync + std::fmt::Debug {
    /// Registry name, persisted in each ballot's strategy descriptor.
    fn name(&self) -> &'static str;

    /// Strategy parameters, serialized into the descriptor.
    fn params(&self) -> Result<Value>;

    /// Folds `fetched` into `current`, staging any credit movements into the
    /// governance tree. Must uphold the module-level invariants.
    fn tally(
        &self,
        cx: &CancelToken,
        gov: &ClonedRepo,
        ad: &Advertisement,
        current: &Tally,
        fetched: &[FetchedVote],
    ) -> Result<Tally>;
}

/// The serialized form of a strategy, written at ballot open.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrategyDescriptor {
    /// Registry name of the strategy.
    pub name: String,
    /// Strategy parameters.
    pub params: Value,
}

impl StrategyDescriptor {
    /// Builds the descriptor of `strategy`.
    pub fn of(strategy: &dyn Strategy) -> Result<Self> {
        Ok(Self {
            name: strategy.name().to_string(),
            params: strategy.params()?,
        })
    }
}

type Registry = RwLock<HashMap<String, Arc<dyn Strategy>>>;

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| {
        let mut map: HashMap<String, Arc<dyn Strategy>> = HashMap::new();
        let qv: Arc<dyn Strategy> = Arc::new(QvStrategy::new());
        map.insert(qv.name().to_string(), qv);
        RwLock::new(map)
    })
}

/// Registers `strategy` under its name, replacing any previous registration.
pub fn install_strategy(strategy: Arc<dyn Strategy>) -> Result<()> {
    let mut guard = registry()
        .write()
        .map_err(|_| GovError::invariant("strategy registry poisoned"))?;
    guard.insert(strategy.name().to_string(), strategy);
    Ok(())
}

/// Looks a strategy up by name.
pub fn lookup_strategy(name: &str) -> Result<Arc<dyn Strategy>> {
    let guard = registry()
        .read()
        .map_err(|_| GovError::invariant("strategy registry poisoned"))?;
    guard
        .get(name)
        .cloned()
        .ok_or_else(|| GovError::not_exist(format!("strategy {name}")))
}

/// Loads the strategy named by a ballot's descriptor file.
pub fn load_strategy_local(gov: &ClonedRepo, id: &BallotId) -> Result<Arc<dyn Strategy>> {
    let descriptor: StrategyDescriptor =
        gov.read_json(&ballot_ns(id).join(super::schema::STRATEGY_FILE))?;
    lookup_strategy(&descriptor.name)
}
