//! Repo journal: stage-then-commit-then-push transactions over a cloned
//! repository tree.
//!
//! A [`ClonedRepo`] pairs a throwaway local working tree with its origin URL.
//! Mutators stage into the git index without committing;
//! [`ClonedRepo::commit_if_changed`] inspects the index and no-ops when it is
//! empty, so composed operations that changed nothing produce no commit. The
//! push is optimistic: if the remote advanced, it fails with
//! [`crate::GovError::Conflict`] and the caller re-clones and retries.
//!
//! Paths are built from typed [`Namespace`] values so components cannot
//! collide in the tree. Commit messages carry `op:` and `args:` trailers for
//! operators inspecting history (see [`Change`]).
//!
//! All git interaction shells out to the `git` binary with prompts disabled;
//! there is no in-process git implementation.

mod change;
mod ns;
mod repo;

#[cfg(test)]
mod tests;

pub use change::Change;
pub use ns::{validate_segment, Namespace};
pub use repo::{ClonedOwner, ClonedRepo, CommitId, OwnerAddress, RepoAddress};
