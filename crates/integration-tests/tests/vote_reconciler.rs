//! Vote reconciliation: counter/record agreement under sequences, toggles,
//! switches, and concurrent voters.

mod common;

use std::sync::Arc;

use common::{forum, TestBed};
use domains::document::collections;
use domains::models::{NotificationKind, VoteValue};
use domains::ports::DocumentStore;
use services::VoteOutcome;

async fn counters(bed: &TestBed, post_id: &str) -> (i64, i64) {
    let doc = bed
        .store
        .get(&collections::post_key(post_id))
        .await
        .unwrap()
        .unwrap();
    (
        doc.fields["up_votes"].as_i64().unwrap(),
        doc.fields["down_votes"].as_i64().unwrap(),
    )
}

/// Counters must always agree with the vote record set, here for a single
/// voter: 1 on the recorded side, 0 elsewhere, or 0/0 with no record.
async fn assert_reconciled(bed: &TestBed, post_id: &str, uid: &str) {
    let state = bed.forum.vote_state(post_id, uid).await.unwrap();
    let expected = match state {
        Some(VoteValue::Up) => (1, 0),
        Some(VoteValue::Down) => (0, 1),
        None => (0, 0),
    };
    assert_eq!(counters(bed, post_id).await, expected);
}

async fn seeded_post(bed: &TestBed) -> String {
    bed.forum
        .create_post("owner", "Owner", "A post", "with some body", None)
        .await
        .unwrap()
}

#[tokio::test]
async fn first_vote_creates_record_and_counter() {
    let bed = forum().await;
    let post_id = seeded_post(&bed).await;

    let outcome = bed.forum.cast_vote(&post_id, "u1", VoteValue::Up).await.unwrap();
    assert_eq!(outcome, VoteOutcome::Created(VoteValue::Up));
    assert_eq!(counters(&bed, &post_id).await, (1, 0));
    assert_eq!(
        bed.forum.vote_state(&post_id, "u1").await.unwrap(),
        Some(VoteValue::Up)
    );
}

#[tokio::test]
async fn repeating_a_vote_toggles_it_off_and_back() {
    let bed = forum().await;
    let post_id = seeded_post(&bed).await;

    bed.forum.cast_vote(&post_id, "u1", VoteValue::Up).await.unwrap();
    let outcome = bed.forum.cast_vote(&post_id, "u1", VoteValue::Up).await.unwrap();
    assert_eq!(outcome, VoteOutcome::Removed(VoteValue::Up));
    assert_eq!(counters(&bed, &post_id).await, (0, 0));
    assert_eq!(bed.forum.vote_state(&post_id, "u1").await.unwrap(), None);

    // Vote/unvote pairs are idempotent: every pair lands back where it started.
    for _ in 0..3 {
        bed.forum.cast_vote(&post_id, "u1", VoteValue::Down).await.unwrap();
        bed.forum.cast_vote(&post_id, "u1", VoteValue::Down).await.unwrap();
        assert_eq!(counters(&bed, &post_id).await, (0, 0));
    }
}

#[tokio::test]
async fn opposite_vote_switches_and_moves_one_count() {
    let bed = forum().await;
    let post_id = seeded_post(&bed).await;

    bed.forum.cast_vote(&post_id, "u1", VoteValue::Up).await.unwrap();
    let outcome = bed.forum.cast_vote(&post_id, "u1", VoteValue::Down).await.unwrap();
    assert_eq!(
        outcome,
        VoteOutcome::Switched {
            from: VoteValue::Up,
            to: VoteValue::Down
        }
    );
    assert_eq!(counters(&bed, &post_id).await, (0, 1));
    assert_eq!(
        bed.forum.vote_state(&post_id, "u1").await.unwrap(),
        Some(VoteValue::Down)
    );
}

#[tokio::test]
async fn arbitrary_sequences_keep_the_invariant_after_every_call() {
    let bed = forum().await;
    let post_id = seeded_post(&bed).await;

    let sequence = [
        VoteValue::Up,
        VoteValue::Down,
        VoteValue::Down,
        VoteValue::Up,
        VoteValue::Up,
        VoteValue::Down,
    ];
    for value in sequence {
        bed.forum.cast_vote(&post_id, "u1", value).await.unwrap();
        assert_reconciled(&bed, &post_id, "u1").await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_distinct_voters_converge_to_the_submitted_net() {
    let bed = Arc::new(forum().await);
    let post_id = seeded_post(&bed).await;

    // 7 upvotes and 5 downvotes from 12 distinct users, arbitrary order.
    let mut handles = Vec::new();
    for i in 0..12 {
        let bed = bed.clone();
        let post_id = post_id.clone();
        let value = if i < 7 { VoteValue::Up } else { VoteValue::Down };
        handles.push(tokio::spawn(async move {
            bed.forum
                .cast_vote(&post_id, &format!("user-{i}"), value)
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let (up, down) = counters(&bed, &post_id).await;
    assert_eq!(up + down, 12);
    assert_eq!(up - down, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_toggles_on_one_key_serialize() {
    let bed = Arc::new(forum().await);
    let post_id = seeded_post(&bed).await;

    // Five toggles of the same value by the same user; odd count means the
    // record must exist afterwards, with counters agreeing.
    let mut handles = Vec::new();
    for _ in 0..5 {
        let bed = bed.clone();
        let post_id = post_id.clone();
        handles.push(tokio::spawn(async move {
            bed.forum.cast_vote(&post_id, "toggler", VoteValue::Up).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(
        bed.forum.vote_state(&post_id, "toggler").await.unwrap(),
        Some(VoteValue::Up)
    );
    assert_eq!(counters(&bed, &post_id).await, (1, 0));
}

#[tokio::test]
async fn notifications_follow_created_and_switched_votes_only() {
    let bed = forum().await;
    let post_id = seeded_post(&bed).await;

    // Create, then switch: two notifications, kinds from the resulting value.
    bed.forum.cast_vote(&post_id, "fan", VoteValue::Up).await.unwrap();
    bed.forum.cast_vote(&post_id, "fan", VoteValue::Down).await.unwrap();
    // Unvote: no notification.
    bed.forum.cast_vote(&post_id, "fan", VoteValue::Down).await.unwrap();
    // Self-vote: no notification.
    bed.forum.cast_vote(&post_id, "owner", VoteValue::Up).await.unwrap();

    let notifications = bed.forum.notifications("owner").await.unwrap();
    assert_eq!(notifications.len(), 2);
    // Newest first.
    assert_eq!(notifications[0].kind, NotificationKind::DownVote);
    assert_eq!(notifications[1].kind, NotificationKind::UpVote);
    assert!(notifications.iter().all(|n| n.from_uid == "fan" && !n.read));
}
