//! Concern ⇄ proposal scenarios through the policy engine.

mod common;

use plenum_core::ballot::{self, BallotId, Election};
use plenum_core::motion::{self, MotionId, MotionType, OpenMotionArgs, RefType};
use plenum_core::notice;
use plenum_core::sync;

fn open_concern(community: &common::Community, id: &str) -> MotionId {
    let motion_id = MotionId::new(id).unwrap();
    motion::open_motion(
        &community.cx,
        &community.gov.public,
        OpenMotionArgs {
            id: motion_id.clone(),
            motion_type: MotionType::Concern,
            policy: "concern".to_string(),
            author: community.handle("alice"),
            title: format!("Concern {id}"),
            body: "Something needs fixing".to_string(),
            tracker_url: format!("https://tracker.example.org/issues/{id}"),
            labels: vec!["bug".to_string()],
        },
    )
    .unwrap();
    motion_id
}

fn open_proposal(community: &common::Community, id: &str) -> MotionId {
    let motion_id = MotionId::new(id).unwrap();
    motion::open_motion(
        &community.cx,
        &community.gov.public,
        OpenMotionArgs {
            id: motion_id.clone(),
            motion_type: MotionType::Proposal,
            policy: "proposal".to_string(),
            author: community.handle("bob"),
            title: format!("Proposal {id}"),
            body: "A change addressing the concern".to_string(),
            tracker_url: format!("https://tracker.example.org/pulls/{id}"),
            labels: Vec::new(),
        },
    )
    .unwrap();
    motion_id
}

#[test]
fn concern_freezes_while_an_eligible_proposal_addresses_it() {
    let community = common::setup(&["alice", "bob"]);
    let cx = &community.cx;
    let c1 = open_concern(&community, "c1");
    let r1 = open_proposal(&community, "r1");

    // Approve the proposal until its score is positive.
    let approval_poll = BallotId::parse("ap/r1").unwrap();
    ballot::vote(
        cx,
        community.member("alice"),
        &community.gov.public,
        &approval_poll,
        vec![Election {
            choice: "approve".to_string(),
            strength: 2.0,
        }],
    )
    .unwrap();
    sync::sync(cx, &community.gov.public, 2).unwrap();
    let scores = motion::score_all(cx, &community.gov.public).unwrap();
    let r1_score = scores.iter().find(|(id, _)| id == &r1).unwrap().1;
    assert_eq!(r1_score, 2.0);

    motion::add_ref(cx, &community.gov.public, &RefType::resolves(), &r1, &c1).unwrap();
    motion::update_motion(cx, &community.gov.public, &c1).unwrap();

    let gov = community.gov_clone();
    let concern = motion::get_motion_local(&gov, &c1).unwrap();
    assert!(concern.frozen);
    assert!(ballot::is_frozen_local(&gov, &BallotId::parse("pp/c1").unwrap()).unwrap());
    assert_eq!(concern.refs_by.len(), 1);

    // Removing the reference unfreezes on the next update.
    motion::remove_ref(cx, &community.gov.public, &RefType::resolves(), &r1, &c1).unwrap();
    motion::update_motion(cx, &community.gov.public, &c1).unwrap();

    let gov = community.gov_clone();
    let concern = motion::get_motion_local(&gov, &c1).unwrap();
    assert!(!concern.frozen);
    assert!(!ballot::is_frozen_local(&gov, &BallotId::parse("pp/c1").unwrap()).unwrap());
}

#[test]
fn unapproved_proposal_does_not_freeze_the_concern() {
    let community = common::setup(&["alice", "bob"]);
    let cx = &community.cx;
    let c1 = open_concern(&community, "c1");
    let r1 = open_proposal(&community, "r1");

    motion::add_ref(cx, &community.gov.public, &RefType::resolves(), &r1, &c1).unwrap();
    motion::update_motion(cx, &community.gov.public, &c1).unwrap();

    let gov = community.gov_clone();
    assert!(!motion::get_motion_local(&gov, &c1).unwrap().frozen);
}

#[test]
fn policy_views_and_notices_accumulate() {
    let community = common::setup(&["alice", "bob"]);
    let cx = &community.cx;
    let c1 = open_concern(&community, "c1");

    let view = motion::show_motion(cx, &community.gov.public, &c1).unwrap();
    assert_eq!(view.motion.id, c1);
    assert_eq!(view.policy["state"]["priority_poll"], "pp/c1");

    let gov = community.gov_clone();
    let notices = notice::list_local(&gov, &c1).unwrap();
    assert!(!notices.is_empty());
    assert!(notices[0].body.contains("concern c1"));
}

#[test]
fn concern_priority_votes_raise_its_score() {
    let community = common::setup(&["alice", "bob"]);
    let cx = &community.cx;
    let c1 = open_concern(&community, "c1");

    let priority_poll = BallotId::parse("pp/c1").unwrap();
    ballot::vote(
        cx,
        community.member("alice"),
        &community.gov.public,
        &priority_poll,
        vec![Election {
            choice: "rank".to_string(),
            strength: 3.0,
        }],
    )
    .unwrap();
    sync::sync(cx, &community.gov.public, 2).unwrap();
    let scores = motion::score_all(cx, &community.gov.public).unwrap();
    let c1_score = scores.iter().find(|(id, _)| id == &c1).unwrap().1;
    assert_eq!(c1_score, 3.0);

    let motions = motion::list_motions(cx, &community.gov.public).unwrap();
    let concern = motions.iter().find(|m| m.id == c1).unwrap();
    assert_eq!(concern.score, 3.0);
}
