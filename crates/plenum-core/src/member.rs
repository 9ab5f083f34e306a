//! Users and groups.
//!
//! A user record points at the user's public repository and voting account;
//! group membership is one marker file per (group, user). Every user added to
//! the community is also added to the built-in `everybody` group, which is
//! the default ballot participant set and the bureau service population.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::account::{self, AccountId, OwnerId};
use crate::cancel::CancelToken;
use crate::error::{GovError, Result};
use crate::history::{self, Event};
use crate::journal::{validate_segment, Change, ClonedRepo, Namespace, RepoAddress};
use crate::kv::{Key, Kv};

/// A user's community handle.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserHandle(String);

impl UserHandle {
    /// Wraps a validated handle.
    pub fn new(handle: impl Into<String>) -> Result<Self> {
        let handle = handle.into();
        validate_segment(&handle)?;
        Ok(Self(handle))
    }

    /// The handle as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Key for UserHandle {
    fn to_segment(&self) -> String {
        self.0.clone()
    }

    fn from_segment(segment: &str) -> Result<Self> {
        Self::new(segment)
    }
}

/// A named group of users.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupName(String);

impl GroupName {
    /// Wraps a validated group name.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_segment(&name)?;
        Ok(Self(name))
    }

    /// The built-in group containing every community member.
    pub fn everybody() -> Self {
        Self("everybody".to_string())
    }

    /// The name as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A user record in the governance tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// The user's public repository, from which votes are fetched.
    pub public_url: RepoAddress,
    /// The user's voting-credit account.
    pub voting_account: AccountId,
}

/// Marker describing a group; its presence makes the group exist.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    /// The group's name, repeated for auditors reading the tree.
    pub name: GroupName,
}

const USER_KV: Kv<UserHandle, UserProfile> = Kv::new();
const MEMBER_KV: Kv<UserHandle, bool> = Kv::new();

fn user_ns() -> Namespace {
    Namespace::new(["member", "user"])
}

fn group_ns(group: &GroupName) -> Namespace {
    Namespace::new(["member", "group"]).join(group.as_str())
}

fn group_members_ns(group: &GroupName) -> Namespace {
    group_ns(group).join("members")
}

fn group_marker_ns(group: &GroupName) -> Namespace {
    group_ns(group).join("group.json")
}

/// Adds a user to the community; one commit, pushed.
pub fn set_user(
    cx: &CancelToken,
    gov: &RepoAddress,
    handle: &UserHandle,
    public_url: &RepoAddress,
) -> Result<()> {
    let cloned = ClonedRepo::clone(cx, gov)?;
    set_user_staged(cx, &cloned, handle, public_url)?;
    let change = Change::new("member_set_user", format!("Add user {handle}"))
        .arg("handle", handle)
        .arg("public_url", public_url);
    cloned.commit_if_changed(cx, &change)?;
    cloned.push(cx)
}

/// Stages a new user: profile, voting account, `everybody` membership.
pub fn set_user_staged(
    cx: &CancelToken,
    gov: &ClonedRepo,
    handle: &UserHandle,
    public_url: &RepoAddress,
) -> Result<()> {
    if USER_KV.exists(&user_ns(), gov, handle) {
        return Err(GovError::already_exists(format!("user {handle}")));
    }
    let profile = UserProfile {
        public_url: public_url.clone(),
        voting_account: AccountId::user(handle),
    };
    USER_KV.set(&user_ns(), gov, handle, &profile)?;
    account::create_staged(
        cx,
        gov,
        &profile.voting_account,
        &OwnerId::User(handle.clone()),
        "voting account",
    )?;
    add_member_staged(cx, gov, &GroupName::everybody(), handle)?;
    history::log_staged(
        cx,
        gov,
        &Event::new("member_set_user")
            .arg("handle", handle)
            .arg("public_url", public_url),
    )
}

/// Stages removal of a user: profile and `everybody` membership. The user's
/// account and its history survive for auditability.
pub fn remove_user_staged(cx: &CancelToken, gov: &ClonedRepo, handle: &UserHandle) -> Result<()> {
    if !is_user_local(gov, handle) {
        return Err(GovError::not_exist(format!("user {handle}")));
    }
    USER_KV.remove(&user_ns(), gov, handle)?;
    if is_member_local(gov, &GroupName::everybody(), handle) {
        remove_member_staged(cx, gov, &GroupName::everybody(), handle)?;
    }
    history::log_staged(
        cx,
        gov,
        &Event::new("member_remove_user").arg("handle", handle),
    )
}

/// Reads a user record.
pub fn get_user_local(gov: &ClonedRepo, handle: &UserHandle) -> Result<UserProfile> {
    USER_KV.get(&user_ns(), gov, handle)
}

/// True when the user exists.
pub fn is_user_local(gov: &ClonedRepo, handle: &UserHandle) -> bool {
    USER_KV.exists(&user_ns(), gov, handle)
}

/// Lists every community user, sorted by handle.
pub fn list_users_local(gov: &ClonedRepo) -> Result<Vec<UserHandle>> {
    USER_KV.list_keys(&user_ns(), gov)
}

/// Finds the user whose public repository is `url`.
pub fn find_user_by_url(gov: &ClonedRepo, url: &RepoAddress) -> Result<UserHandle> {
    for handle in list_users_local(gov)? {
        if get_user_local(gov, &handle)?.public_url == *url {
            return Ok(handle);
        }
    }
    Err(GovError::not_exist(format!("user with public repo {url}")))
}

/// Creates a group; one commit, pushed.
pub fn set_group(cx: &CancelToken, gov: &RepoAddress, group: &GroupName) -> Result<()> {
    let cloned = ClonedRepo::clone(cx, gov)?;
    set_group_staged(cx, &cloned, group)?;
    let change = Change::new("member_set_group", format!("Create group {group}")).arg("group", group);
    cloned.commit_if_changed(cx, &change)?;
    cloned.push(cx)
}

/// Stages creation of a group.
pub fn set_group_staged(cx: &CancelToken, gov: &ClonedRepo, group: &GroupName) -> Result<()> {
    cx.check()?;
    if is_group_local(gov, group) {
        return Err(GovError::already_exists(format!("group {group}")));
    }
    gov.write_json_staged(
        &group_marker_ns(group),
        &GroupSpec {
            name: group.clone(),
        },
    )?;
    history::log_staged(cx, gov, &Event::new("member_set_group").arg("group", group))
}

/// True when the group exists.
pub fn is_group_local(gov: &ClonedRepo, group: &GroupName) -> bool {
    gov.exists(&group_marker_ns(group))
}

/// Stages membership of `user` in `group`.
pub fn add_member_staged(
    cx: &CancelToken,
    gov: &ClonedRepo,
    group: &GroupName,
    user: &UserHandle,
) -> Result<()> {
    cx.check()?;
    if !is_group_local(gov, group) {
        return Err(GovError::not_exist(format!("group {group}")));
    }
    if !is_user_local(gov, user) {
        return Err(GovError::not_exist(format!("user {user}")));
    }
    MEMBER_KV.set(&group_members_ns(group), gov, user, &true)
}

/// Stages removal of `user` from `group`.
pub fn remove_member_staged(
    cx: &CancelToken,
    gov: &ClonedRepo,
    group: &GroupName,
    user: &UserHandle,
) -> Result<()> {
    cx.check()?;
    MEMBER_KV.remove(&group_members_ns(group), gov, user)
}

/// True when `user` belongs to `group`.
pub fn is_member_local(gov: &ClonedRepo, group: &GroupName, user: &UserHandle) -> bool {
    MEMBER_KV.exists(&group_members_ns(group), gov, user)
}

/// Lists the members of `group`, sorted by handle.
pub fn list_group_users_local(gov: &ClonedRepo, group: &GroupName) -> Result<Vec<UserHandle>> {
    if !is_group_local(gov, group) {
        return Err(GovError::not_exist(format!("group {group}")));
    }
    MEMBER_KV.list_keys(&group_members_ns(group), gov)
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::process::Command;

    use tempfile::TempDir;

    use super::{
        add_member_staged, find_user_by_url, is_member_local, list_group_users_local,
        set_group_staged, set_user_staged, GroupName, UserHandle,
    };
    use crate::account::{self, AccountId};
    use crate::cancel::CancelToken;
    use crate::journal::{ClonedRepo, RepoAddress};

    fn scratch_repo(root: &Path) -> ClonedRepo {
        let remote = root.join("remote.git");
        std::fs::create_dir_all(&remote).unwrap();
        let status = Command::new("git")
            .current_dir(&remote)
            .args(["init", "--bare", "--quiet", "-b", "main", "."])
            .status()
            .unwrap();
        assert!(status.success());
        ClonedRepo::clone(
            &CancelToken::new(),
            &RepoAddress::new(remote.to_string_lossy()),
        )
        .unwrap()
    }

    #[test]
    fn set_user_creates_account_and_everybody_membership() {
        let cx = CancelToken::new();
        let root = TempDir::new().unwrap();
        let gov = scratch_repo(root.path());
        set_group_staged(&cx, &gov, &GroupName::everybody()).unwrap();

        let alice = UserHandle::new("alice").unwrap();
        let url = RepoAddress::new("https://example.org/alice-public.git");
        set_user_staged(&cx, &gov, &alice, &url).unwrap();

        assert!(is_member_local(&gov, &GroupName::everybody(), &alice));
        assert!(account::exists_local(&gov, &AccountId::user(&alice)));
        assert_eq!(find_user_by_url(&gov, &url).unwrap(), alice);
    }

    #[test]
    fn duplicate_user_is_rejected() {
        let cx = CancelToken::new();
        let root = TempDir::new().unwrap();
        let gov = scratch_repo(root.path());
        set_group_staged(&cx, &gov, &GroupName::everybody()).unwrap();

        let alice = UserHandle::new("alice").unwrap();
        let url = RepoAddress::new("https://example.org/alice-public.git");
        set_user_staged(&cx, &gov, &alice, &url).unwrap();
        let err = set_user_staged(&cx, &gov, &alice, &url).unwrap_err();
        assert!(matches!(err, crate::GovError::AlreadyExists { .. }));
    }

    #[test]
    fn removed_user_leaves_everybody() {
        let cx = CancelToken::new();
        let root = TempDir::new().unwrap();
        let gov = scratch_repo(root.path());
        set_group_staged(&cx, &gov, &GroupName::everybody()).unwrap();

        let alice = UserHandle::new("alice").unwrap();
        set_user_staged(
            &cx,
            &gov,
            &alice,
            &RepoAddress::new("https://example.org/alice-public.git"),
        )
        .unwrap();
        super::remove_user_staged(&cx, &gov, &alice).unwrap();

        assert!(!super::is_user_local(&gov, &alice));
        assert!(!is_member_local(&gov, &GroupName::everybody(), &alice));
        // The account stays behind for the audit trail.
        assert!(account::exists_local(&gov, &AccountId::user(&alice)));
    }

    #[test]
    fn membership_requires_group_and_user() {
        let cx = CancelToken::new();
        let root = TempDir::new().unwrap();
        let gov = scratch_repo(root.path());
        set_group_staged(&cx, &gov, &GroupName::everybody()).unwrap();

        let team = GroupName::new("team").unwrap();
        let alice = UserHandle::new("alice").unwrap();
        assert!(add_member_staged(&cx, &gov, &team, &alice)
            .unwrap_err()
            .is_not_exist());

        set_group_staged(&cx, &gov, &team).unwrap();
        assert!(add_member_staged(&cx, &gov, &team, &alice)
            .unwrap_err()
            .is_not_exist());

        set_user_staged(
            &cx,
            &gov,
            &alice,
            &RepoAddress::new("https://example.org/alice-public.git"),
        )
        .unwrap();
        add_member_staged(&cx, &gov, &team, &alice).unwrap();
        assert_eq!(
            list_group_users_local(&gov, &team).unwrap(),
            vec![alice.clone()]
        );
        assert!(is_member_local(&gov, &team, &alice));
    }
}
