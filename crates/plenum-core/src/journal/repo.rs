//! Cloned repository handles and the git transport.
//!
//! Every git interaction runs `git` with explicit arguments, prompts
//! disabled, and the system configuration ignored. Errors surface the
//! trimmed stderr of the failing command.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use super::change::Change;
use super::ns::Namespace;
use crate::cancel::CancelToken;
use crate::canonical;
use crate::error::{GovError, Result};

/// Committer identity recorded on journal commits.
const COMMITTER_NAME: &str = "plenum";
const COMMITTER_EMAIL: &str = "plenum@invalid";

/// URL (or local path) of a remote repository.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RepoAddress(String);

impl RepoAddress {
    /// Wraps a git remote URL or local path.
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// The underlying URL string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepoAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one commit on the governance branch.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitId(String);

impl CommitId {
    /// The commit hash as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The public/private repository pair owned by one principal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerAddress {
    /// Community-readable repository.
    pub public: RepoAddress,
    /// Repository holding the owner's secrets.
    pub private: RepoAddress,
}

/// A local working tree paired with its origin.
///
/// The tree lives in an owned temporary directory and disappears with the
/// handle; abandoned transactions therefore leave no trace anywhere.
#[derive(Debug)]
pub struct ClonedRepo {
    address: RepoAddress,
    workdir: TempDir,
    branch: String,
}

impl ClonedRepo {
    /// Clones `address` into a fresh temporary working tree.
    ///
    /// Cloning an empty remote is permitted; the unborn branch is normalized
    /// to `main` so the first push creates it.
    pub fn clone(cx: &CancelToken, address: &RepoAddress) -> Result<Self> {
        cx.check()?;
        let workdir = TempDir::new()?;
        let dir = workdir.path().to_path_buf();
        let dir_str = path_str(&dir);
        git_expect(
            None,
            &["clone", "--quiet", "--", address.as_str(), dir_str.as_str()],
        )?;

        if !git_succeeds(&dir, &["rev-parse", "--verify", "--quiet", "HEAD"])? {
            // Unborn HEAD: the remote is empty.
            git_expect(Some(&dir), &["symbolic-ref", "HEAD", "refs/heads/main"])?;
        }
        let branch = git_expect(Some(&dir), &["symbolic-ref", "--short", "HEAD"])?
            .trim()
            .to_string();

        tracing::debug!(address = %address, branch = %branch, "cloned repository");
        Ok(Self {
            address: address.clone(),
            workdir,
            branch,
        })
    }

    /// Origin of this clone.
    pub fn address(&self) -> &RepoAddress {
        &self.address
    }

    /// Root of the local working tree.
    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    fn abs(&self, ns: &Namespace) -> PathBuf {
        self.workdir.path().join(ns.rel_path())
    }

    /// Reads the file at `ns` from the working tree.
    pub fn read(&self, ns: &Namespace) -> Result<Vec<u8>> {
        match fs::read(self.abs(ns)) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(GovError::not_exist(ns.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Reads and decodes the canonical-JSON file at `ns`.
    pub fn read_json<T: DeserializeOwned>(&self, ns: &Namespace) -> Result<T> {
        canonical::from_slice(&self.read(ns)?)
    }

    /// True when a file or directory exists at `ns`.
    pub fn exists(&self, ns: &Namespace) -> bool {
        self.abs(ns).exists()
    }

    /// Writes `bytes` at `ns` and stages the write. Does not commit.
    pub fn write_staged(&self, ns: &Namespace, bytes: &[u8]) -> Result<()> {
        let path = self.abs(ns);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        self.stage(ns)
    }

    /// Encodes `value` canonically, writes it at `ns`, and stages the write.
    pub fn write_json_staged<T: Serialize>(&self, ns: &Namespace, value: &T) -> Result<()> {
        self.write_staged(ns, &canonical::to_bytes(value)?)
    }

    /// Removes the file at `ns` and stages the removal.
    pub fn remove_staged(&self, ns: &Namespace) -> Result<()> {
        let path = self.abs(ns);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(GovError::not_exist(ns.to_string()))
            }
            Err(err) => return Err(err.into()),
        }
        self.stage(ns)
    }

    /// Removes the whole subtree at `ns` and stages the removal.
    pub fn remove_dir_staged(&self, ns: &Namespace) -> Result<()> {
        let path = self.abs(ns);
        match fs::remove_dir_all(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(GovError::not_exist(ns.to_string()))
            }
            Err(err) => return Err(err.into()),
        }
        self.stage(ns)
    }

    fn stage(&self, ns: &Namespace) -> Result<()> {
        let path = ns.to_string();
        git_expect(Some(self.workdir.path()), &["add", "-A", "--", path.as_str()])?;
        Ok(())
    }

    /// Lists the entry names directly under `ns`. A missing directory is an
    /// empty listing, not an error.
    pub fn list(&self, ns: &Namespace) -> Result<Vec<String>> {
        let path = self.abs(ns);
        let entries = match fs::read_dir(&path) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == ".git" {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    /// Walks the subtree under `ns` and returns, in sorted order, the
    /// namespaces (relative to `ns`) of every directory containing a file
    /// named `marker`.
    pub fn find_dirs_with(&self, ns: &Namespace, marker: &str) -> Result<Vec<Namespace>> {
        let mut found = Vec::new();
        self.walk_marker(ns, &Namespace::root(), marker, &mut found)?;
        found.sort();
        Ok(found)
    }

    fn walk_marker(
        &self,
        base: &Namespace,
        rel: &Namespace,
        marker: &str,
        found: &mut Vec<Namespace>,
    ) -> Result<()> {
        let here = base.extend(rel);
        if self.exists(&here.join(marker)) {
            found.push(rel.clone());
        }
        for name in self.list(&here)? {
            if self.abs(&here.join(&name)).is_dir() {
                self.walk_marker(base, &rel.join(&name), marker, found)?;
            }
        }
        Ok(())
    }

    /// Commit id of the current branch head.
    pub fn head(&self) -> Result<CommitId> {
        let out = git_expect(Some(self.workdir.path()), &["rev-parse", "HEAD"])?;
        Ok(CommitId(out.trim().to_string()))
    }

    /// Commits the staged index, if it is non-empty, under the change's
    /// message. Returns the new head, or `None` when nothing was staged.
    pub fn commit_if_changed(&self, cx: &CancelToken, change: &Change) -> Result<Option<CommitId>> {
        cx.check()?;
        let dir = self.workdir.path();
        let status = git_expect(Some(dir), &["status", "--porcelain"])?;
        let index_dirty = status
            .lines()
            .any(|line| matches!(line.chars().next(), Some(c) if c != ' ' && c != '?'));
        if !index_dirty {
            return Ok(None);
        }
        let name_config = format!("user.name={COMMITTER_NAME}");
        let email_config = format!("user.email={COMMITTER_EMAIL}");
        let message = change.commit_message();
        git_expect(
            Some(dir),
            &[
                "-c",
                name_config.as_str(),
                "-c",
                email_config.as_str(),
                "commit",
                "--quiet",
                "-m",
                message.as_str(),
            ],
        )?;
        let head = self.head()?;
        tracing::info!(op = %change.op, commit = %head, "committed");
        Ok(Some(head))
    }

    /// Pushes the local branch to origin.
    ///
    /// A rejection caused by the remote having advanced maps to
    /// [`GovError::Conflict`]; any other failure to [`GovError::Remote`].
    pub fn push(&self, cx: &CancelToken) -> Result<()> {
        cx.check()?;
        let dir = self.workdir.path();
        let output = git_raw(Some(dir), &["push", "origin", self.branch.as_str()])?;
        if output.status.success() {
            tracing::debug!(address = %self.address, branch = %self.branch, "pushed");
            return Ok(());
        }
        let reason = stderr_reason(&output);
        if reason.contains("non-fast-forward")
            || reason.contains("fetch first")
            || reason.contains("rejected")
        {
            return Err(GovError::Conflict { reason });
        }
        Err(GovError::Remote { reason })
    }
}

/// The cloned public/private pair of one principal.
#[derive(Debug)]
pub struct ClonedOwner {
    /// Clone of the community-readable repository.
    pub public: ClonedRepo,
    /// Clone of the secret-holding repository.
    pub private: ClonedRepo,
}

impl ClonedOwner {
    /// Clones both halves of an owner's repository pair.
    pub fn clone(cx: &CancelToken, address: &OwnerAddress) -> Result<Self> {
        Ok(Self {
            public: ClonedRepo::clone(cx, &address.public)?,
            private: ClonedRepo::clone(cx, &address.private)?,
        })
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn git_raw(cwd: Option<&Path>, args: &[&str]) -> Result<Output> {
    let mut cmd = Command::new("git");
    cmd.env("GIT_TERMINAL_PROMPT", "0");
    cmd.env("GIT_CONFIG_NOSYSTEM", "1");
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    cmd.args(args);
    cmd.output().map_err(|err| GovError::Remote {
        reason: format!("failed to spawn git: {err}"),
    })
}

fn git_expect(cwd: Option<&Path>, args: &[&str]) -> Result<String> {
    let output = git_raw(cwd, args)?;
    if !output.status.success() {
        return Err(remote_failure(&output));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn git_succeeds(cwd: &Path, args: &[&str]) -> Result<bool> {
    Ok(git_raw(Some(cwd), args)?.status.success())
}

fn remote_failure(output: &Output) -> GovError {
    GovError::Remote {
        reason: stderr_reason(output),
    }
}

fn stderr_reason(output: &Output) -> String {
    let mut reason = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if reason.is_empty() {
        reason = String::from_utf8_lossy(&output.stdout).trim().to_string();
    }
    if reason.is_empty() {
        reason = "git command failed with no output".to_string();
    }
    reason
}
