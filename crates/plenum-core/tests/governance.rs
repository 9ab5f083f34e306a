//! End-to-end governance scenarios over throwaway git remotes.

mod common;

use plenum_core::account::AccountId;
use plenum_core::ballot::{self, BallotId, Election, ListFilter, OpenArgs, QvStrategy};
use plenum_core::member::GroupName;

fn yes(strength: f64) -> Vec<Election> {
    vec![Election {
        choice: "yes".to_string(),
        strength,
    }]
}

fn open_p1(community: &common::Community) -> BallotId {
    let id = BallotId::parse("p1").unwrap();
    ballot::open(
        &community.cx,
        &community.gov.public,
        &QvStrategy::new(),
        OpenArgs {
            id: id.clone(),
            escrow: AccountId::escrow_for_ballot(&id),
            purpose: "prioritization".to_string(),
            title: "Pilot poll".to_string(),
            description: "Should we do it?".to_string(),
            choices: vec!["yes".to_string()],
            participants: GroupName::everybody(),
        },
    )
    .unwrap();
    id
}

#[test]
fn open_vote_tally_and_replacement() {
    let community = common::setup(&["alice", "bob"]);
    let cx = &community.cx;
    let id = open_p1(&community);
    let alice = community.handle("alice");
    let bob = community.handle("bob");
    let escrow = AccountId::escrow_for_ballot(&id);

    ballot::vote(cx, community.member("alice"), &community.gov.public, &id, yes(2.0)).unwrap();
    ballot::vote(cx, community.member("bob"), &community.gov.public, &id, yes(1.0)).unwrap();

    let tally = ballot::tally(cx, &community.gov.public, &id, 2).unwrap();
    assert_eq!(tally.scores["yes"], 3.0);
    assert_eq!(tally.charges[&alice], 4.0);
    assert_eq!(tally.charges[&bob], 1.0);
    assert_eq!(community.credit_balance(&escrow), 5.0);
    assert_eq!(community.credit_balance(&AccountId::user(&alice)), 96.0);
    assert_eq!(community.credit_balance(&AccountId::user(&bob)), 99.0);

    // Scores decompose into per-user effective votes.
    for (choice, total) in &tally.scores {
        let sum: f64 = tally
            .scores_by_user
            .values()
            .filter_map(|choices| choices.get(choice))
            .map(|s| s.score)
            .sum();
        assert_eq!(*total, sum);
    }

    // Alice re-votes: replacement charges the quadratic delta.
    ballot::vote(cx, community.member("alice"), &community.gov.public, &id, yes(3.0)).unwrap();
    let tally = ballot::tally(cx, &community.gov.public, &id, 2).unwrap();
    assert_eq!(tally.scores["yes"], 4.0);
    assert_eq!(tally.charges[&alice], 9.0);
    assert_eq!(tally.charges[&bob], 1.0);
    assert_eq!(community.credit_balance(&escrow), 10.0);
    assert_eq!(community.credit_balance(&AccountId::user(&alice)), 91.0);
}

#[test]
fn tally_with_no_new_votes_is_a_no_op() {
    let community = common::setup(&["alice"]);
    let cx = &community.cx;
    let id = open_p1(&community);

    ballot::vote(cx, community.member("alice"), &community.gov.public, &id, yes(2.0)).unwrap();
    let first = ballot::tally(cx, &community.gov.public, &id, 1).unwrap();
    let head_after_first = community.gov_clone().head().unwrap();

    let second = ballot::tally(cx, &community.gov.public, &id, 1).unwrap();
    assert_eq!(first, second);
    // No new commit landed on the governance branch.
    assert_eq!(community.gov_clone().head().unwrap(), head_after_first);
}

#[test]
fn frozen_ballot_rejects_votes_without_charges() {
    let community = common::setup(&["alice"]);
    let cx = &community.cx;
    let id = open_p1(&community);
    let alice = community.handle("alice");

    ballot::vote(cx, community.member("alice"), &community.gov.public, &id, yes(2.0)).unwrap();
    ballot::tally(cx, &community.gov.public, &id, 1).unwrap();

    ballot::freeze(cx, &community.gov.public, &id).unwrap();
    ballot::vote(cx, community.member("alice"), &community.gov.public, &id, yes(1.0)).unwrap();
    let tally = ballot::tally(cx, &community.gov.public, &id, 1).unwrap();

    let rejected = &tally.rejected[&alice];
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].reason, "frozen");
    assert_eq!(tally.scores["yes"], 2.0);
    assert_eq!(tally.charges[&alice], 4.0);
    assert_eq!(community.credit_balance(&AccountId::user(&alice)), 96.0);

    // Unfreezing reopens the ballot for new envelopes.
    ballot::unfreeze(cx, &community.gov.public, &id).unwrap();
    ballot::vote(cx, community.member("alice"), &community.gov.public, &id, yes(1.0)).unwrap();
    let tally = ballot::tally(cx, &community.gov.public, &id, 1).unwrap();
    assert_eq!(tally.scores["yes"], 1.0);
    assert_eq!(tally.charges[&alice], 1.0);
}

#[test]
fn cancel_refunds_every_charge() {
    let community = common::setup(&["alice", "bob"]);
    let cx = &community.cx;
    let id = open_p1(&community);
    let alice = community.handle("alice");
    let bob = community.handle("bob");
    let escrow = AccountId::escrow_for_ballot(&id);

    ballot::vote(cx, community.member("alice"), &community.gov.public, &id, yes(3.0)).unwrap();
    ballot::vote(cx, community.member("bob"), &community.gov.public, &id, yes(1.0)).unwrap();
    ballot::tally(cx, &community.gov.public, &id, 2).unwrap();
    assert_eq!(community.credit_balance(&escrow), 10.0);

    ballot::cancel(cx, &community.gov.public, &id).unwrap();
    assert_eq!(community.credit_balance(&AccountId::user(&alice)), 100.0);
    assert_eq!(community.credit_balance(&AccountId::user(&bob)), 100.0);
    assert_eq!(community.credit_balance(&escrow), 0.0);

    let gov = community.gov_clone();
    let shown = ballot::show_local(&gov, &id).unwrap();
    assert!(shown.ad.cancelled);

    // Cancelled ballots cannot be tallied, but can be erased.
    assert!(ballot::tally(cx, &community.gov.public, &id, 1).is_err());
    ballot::erase(cx, &community.gov.public, &id).unwrap();
    let gov = community.gov_clone();
    assert!(ballot::show_local(&gov, &id).is_err());
}

#[test]
fn close_routes_escrow_and_finalizes() {
    let community = common::setup(&["alice"]);
    let cx = &community.cx;
    let id = open_p1(&community);

    ballot::vote(cx, community.member("alice"), &community.gov.public, &id, yes(2.0)).unwrap();
    ballot::tally(cx, &community.gov.public, &id, 1).unwrap();

    ballot::close(cx, &community.gov.public, &id, &AccountId::treasury()).unwrap();
    assert_eq!(community.credit_balance(&AccountId::treasury()), 4.0);
    assert_eq!(
        community.credit_balance(&AccountId::escrow_for_ballot(&id)),
        0.0
    );
    let gov = community.gov_clone();
    assert!(ballot::show_local(&gov, &id).unwrap().ad.closed);
}

#[test]
fn list_filters_by_state_and_participant() {
    let community = common::setup(&["alice"]);
    let cx = &community.cx;
    let id = open_p1(&community);
    ballot::freeze(cx, &community.gov.public, &id).unwrap();

    let gov = community.gov_clone();
    let frozen = ballot::list_local(
        &gov,
        &ListFilter {
            only_frozen: true,
            ..ListFilter::default()
        },
    )
    .unwrap();
    assert_eq!(frozen.len(), 1);
    assert_eq!(frozen[0].id, id);

    let with_alice = ballot::list_local(
        &gov,
        &ListFilter {
            with_participant: Some(community.handle("alice")),
            ..ListFilter::default()
        },
    )
    .unwrap();
    assert_eq!(with_alice.len(), 1);

    let closed = ballot::list_local(
        &gov,
        &ListFilter {
            only_closed: true,
            ..ListFilter::default()
        },
    )
    .unwrap();
    assert!(closed.is_empty());
}

#[test]
fn track_reports_pending_then_accepted() {
    let community = common::setup(&["alice"]);
    let cx = &community.cx;
    let id = open_p1(&community);

    ballot::vote(cx, community.member("alice"), &community.gov.public, &id, yes(2.0)).unwrap();
    let status = ballot::track(cx, community.member("alice"), &community.gov.public, &id).unwrap();
    assert!(status.accepted.is_empty());
    assert_eq!(status.pending.len(), 1);
    assert_eq!(status.pending[0].seq, 0);

    ballot::tally(cx, &community.gov.public, &id, 1).unwrap();
    let status = ballot::track(cx, community.member("alice"), &community.gov.public, &id).unwrap();
    assert_eq!(status.accepted.len(), 1);
    assert!(status.rejected.is_empty());
    assert!(status.pending.is_empty());
}

#[test]
fn member_push_after_tally_lands_in_next_tally() {
    let community = common::setup(&["alice"]);
    let cx = &community.cx;
    let id = open_p1(&community);

    let first = ballot::tally(cx, &community.gov.public, &id, 1).unwrap();
    assert!(first.scores.is_empty());

    // The vote pushed after the first tally's member fetch is observed by
    // the next tick: each tally sees whatever HEAD is at clone time.
    ballot::vote(cx, community.member("alice"), &community.gov.public, &id, yes(1.0)).unwrap();
    let second = ballot::tally(cx, &community.gov.public, &id, 1).unwrap();
    assert_eq!(second.scores["yes"], 1.0);
}
