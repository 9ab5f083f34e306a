//! Shared fixture: a throwaway community of bare git remotes.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

use plenum_core::account::{self, AccountId, Asset, Holding};
use plenum_core::boot;
use plenum_core::identity;
use plenum_core::journal::{Change, ClonedOwner, ClonedRepo, OwnerAddress, RepoAddress};
use plenum_core::member::{self, UserHandle};
use plenum_core::CancelToken;

pub struct Community {
    #[allow(dead_code)]
    root: TempDir,
    pub cx: CancelToken,
    pub gov: OwnerAddress,
    pub members: BTreeMap<String, OwnerAddress>,
}

fn bare_remote(root: &Path, name: &str) -> RepoAddress {
    let path = root.join(name);
    std::fs::create_dir_all(&path).unwrap();
    let status = Command::new("git")
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .current_dir(&path)
        .args(["init", "--bare", "--quiet", "-b", "main", "."])
        .status()
        .unwrap();
    assert!(status.success(), "failed to init bare remote {name}");
    RepoAddress::new(path.to_string_lossy())
}

fn owner_pair(root: &Path, name: &str) -> OwnerAddress {
    OwnerAddress {
        public: bare_remote(root, &format!("{name}-public.git")),
        private: bare_remote(root, &format!("{name}-private.git")),
    }
}

/// Boots a governance pair and onboards `names` as members, each with an
/// initialized identity and 100 voting credits.
pub fn setup(names: &[&str]) -> Community {
    let cx = CancelToken::new();
    let root = TempDir::new().unwrap();

    let gov = owner_pair(root.path(), "gov");
    boot::boot(&cx, &gov).unwrap();

    let mut members = BTreeMap::new();
    for name in names {
        let address = owner_pair(root.path(), name);
        let cloned = ClonedOwner::clone(&cx, &address).unwrap();
        identity::init_staged(&cloned).unwrap();
        let change = Change::new("identity_init", "Initialize identity");
        cloned.public.commit_if_changed(&cx, &change).unwrap();
        cloned.private.commit_if_changed(&cx, &change).unwrap();
        cloned.public.push(&cx).unwrap();
        cloned.private.push(&cx).unwrap();

        let handle = UserHandle::new(*name).unwrap();
        member::set_user(&cx, &gov.public, &handle, &address.public).unwrap();
        account::deposit(
            &cx,
            &gov.public,
            &AccountId::user(&handle),
            &Holding::credits(100.0),
            "initial grant",
        )
        .unwrap();

        members.insert((*name).to_string(), address);
    }

    Community {
        root,
        cx,
        gov,
        members,
    }
}

impl Community {
    pub fn member(&self, name: &str) -> &OwnerAddress {
        &self.members[name]
    }

    pub fn handle(&self, name: &str) -> UserHandle {
        UserHandle::new(name).unwrap()
    }

    /// Reads an account's credit balance from a fresh clone of the
    /// governance repository.
    pub fn credit_balance(&self, id: &AccountId) -> f64 {
        let gov = ClonedRepo::clone(&self.cx, &self.gov.public).unwrap();
        account::get_local(&gov, id)
            .unwrap()
            .balance(&Asset::credits())
            .quantity
    }

    pub fn gov_clone(&self) -> ClonedRepo {
        ClonedRepo::clone(&self.cx, &self.gov.public).unwrap()
    }
}
