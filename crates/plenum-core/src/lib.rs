//! # plenum-core
//!
//! Community governance kernel whose entire persistent state lives in
//! ordinary git repositories. There is no central server: the repository
//! history is the ledger, and anyone with read access can reconstruct and
//! audit the state.
//!
//! Members cast votes from their own repositories; an organizer process
//! periodically pulls votes from member repositories, tallies them under a
//! pluggable voting strategy, updates credit accounts, and commits the new
//! state back.
//!
//! ## Layers
//!
//! - **Journal** ([`journal`]): stage-then-commit-then-push transactions over
//!   a cloned repository tree.
//! - **KV** ([`kv`]): typed key→value files layered on the journal.
//! - **Identity** ([`identity`]): ed25519 keypairs and signed plaintexts.
//! - **Members & accounts** ([`member`], [`account`]): users, groups, and
//!   asset holdings with a non-negative balance invariant.
//! - **Mail** ([`mail`]): single-writer append-only signed message streams
//!   between two repositories.
//! - **Ballots** ([`ballot`]): open/freeze/close/cancel/tally/vote/track with
//!   credit escrow, driven by a strategy registry (quadratic voting built in).
//! - **Motions** ([`motion`]): concerns and proposals driven by pluggable
//!   policies that open and close ballots and cross-reference each other.
//! - **Sync** ([`sync`]): one governance tick — tally all open ballots, then
//!   drain member bureau requests.
//!
//! Every mutator exposes a `*_staged` variant so higher layers can compose
//! several mutations into one commit. Top-level entry points follow
//! clone → stage → commit → push; a rejected push surfaces as
//! [`GovError::Conflict`] and the caller re-clones and retries.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate
)]

pub mod account;
pub mod ballot;
pub mod boot;
pub mod bureau;
pub mod cancel;
pub mod canonical;
pub mod error;
pub mod history;
pub mod identity;
pub mod journal;
pub mod kv;
pub mod mail;
pub mod member;
pub mod motion;
pub mod notice;
pub mod sync;

pub use cancel::CancelToken;
pub use error::{GovError, Result};
pub use journal::{ClonedOwner, ClonedRepo, OwnerAddress, RepoAddress};
