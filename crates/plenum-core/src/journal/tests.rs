use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

use super::{Change, ClonedRepo, Namespace, RepoAddress};
use crate::cancel::CancelToken;
use crate::error::GovError;

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .current_dir(dir)
        .args(args)
        .status()
        .unwrap();
    assert!(status.success(), "git {args:?} failed");
}

fn bare_remote(root: &Path, name: &str) -> RepoAddress {
    let path = root.join(name);
    std::fs::create_dir_all(&path).unwrap();
    git(&path, &["init", "--bare", "--quiet", "-b", "main", "."]);
    RepoAddress::new(path.to_string_lossy())
}

#[test]
fn stage_commit_push_round_trip() {
    let cx = CancelToken::new();
    let root = TempDir::new().unwrap();
    let remote = bare_remote(root.path(), "gov.git");

    let repo = ClonedRepo::clone(&cx, &remote).unwrap();
    let ns = Namespace::new(["greeting"]).join("hello.json");
    repo.write_json_staged(&ns, &"world").unwrap();

    let change = Change::new("test_write", "Write greeting");
    let head = repo.commit_if_changed(&cx, &change).unwrap();
    assert!(head.is_some());
    repo.push(&cx).unwrap();

    let again = ClonedRepo::clone(&cx, &remote).unwrap();
    let value: String = again.read_json(&ns).unwrap();
    assert_eq!(value, "world");
    assert_eq!(again.head().unwrap(), head.unwrap());
}

#[test]
fn empty_index_produces_no_commit() {
    let cx = CancelToken::new();
    let root = TempDir::new().unwrap();
    let remote = bare_remote(root.path(), "gov.git");

    let repo = ClonedRepo::clone(&cx, &remote).unwrap();
    let change = Change::new("noop", "Nothing staged");
    assert!(repo.commit_if_changed(&cx, &change).unwrap().is_none());
}

#[test]
fn missing_path_reads_as_not_exist() {
    let cx = CancelToken::new();
    let root = TempDir::new().unwrap();
    let remote = bare_remote(root.path(), "gov.git");

    let repo = ClonedRepo::clone(&cx, &remote).unwrap();
    let err = repo.read(&Namespace::new(["no", "such.json"])).unwrap_err();
    assert!(err.is_not_exist());
}

#[test]
fn concurrent_push_is_a_conflict() {
    let cx = CancelToken::new();
    let root = TempDir::new().unwrap();
    let remote = bare_remote(root.path(), "gov.git");

    let a = ClonedRepo::clone(&cx, &remote).unwrap();
    let b = ClonedRepo::clone(&cx, &remote).unwrap();

    let ns = Namespace::new(["value.json"]);
    a.write_json_staged(&ns, &1).unwrap();
    a.commit_if_changed(&cx, &Change::new("write_a", "A writes"))
        .unwrap();
    a.push(&cx).unwrap();

    b.write_json_staged(&ns, &2).unwrap();
    b.commit_if_changed(&cx, &Change::new("write_b", "B writes"))
        .unwrap();
    let err = b.push(&cx).unwrap_err();
    assert!(matches!(err, GovError::Conflict { .. }), "got {err:?}");
}

#[test]
fn cancelled_token_aborts_clone() {
    let cx = CancelToken::new();
    cx.cancel();
    let root = TempDir::new().unwrap();
    let remote = bare_remote(root.path(), "gov.git");
    let err = ClonedRepo::clone(&cx, &remote).unwrap_err();
    assert!(matches!(err, GovError::Cancelled));
}

#[test]
fn find_dirs_with_locates_markers() {
    let cx = CancelToken::new();
    let root = TempDir::new().unwrap();
    let remote = bare_remote(root.path(), "gov.git");
    let repo = ClonedRepo::clone(&cx, &remote).unwrap();

    let base = Namespace::new(["ballot"]);
    repo.write_json_staged(&base.join("p1").join("ad.json"), &"a")
        .unwrap();
    repo.write_json_staged(&base.join("pp").join("c1").join("ad.json"), &"b")
        .unwrap();
    repo.write_json_staged(&base.join("pp").join("c1").join("tally.json"), &"t")
        .unwrap();

    let dirs = repo.find_dirs_with(&base, "ad.json").unwrap();
    let rendered: Vec<String> = dirs.iter().map(ToString::to_string).collect();
    assert_eq!(rendered, vec!["p1".to_string(), "pp/c1".to_string()]);
}

#[test]
fn remove_dir_staged_deletes_subtree() {
    let cx = CancelToken::new();
    let root = TempDir::new().unwrap();
    let remote = bare_remote(root.path(), "gov.git");
    let repo = ClonedRepo::clone(&cx, &remote).unwrap();

    let base = Namespace::new(["ballot", "p1"]);
    repo.write_json_staged(&base.join("ad.json"), &"a").unwrap();
    repo.commit_if_changed(&cx, &Change::new("seed", "Seed"))
        .unwrap();

    repo.remove_dir_staged(&base).unwrap();
    assert!(!repo.exists(&base));
    let head = repo
        .commit_if_changed(&cx, &Change::new("erase", "Erase ballot"))
        .unwrap();
    assert!(head.is_some());
}
