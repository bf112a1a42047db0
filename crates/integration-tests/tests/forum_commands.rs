//! Aggregate commands: creation round-trips, validation, authorization,
//! cascade deletion, notifications, and the detail view.

mod common;

use bytes::Bytes;
use common::{forum, WAIT};
use domains::document::collections;
use domains::error::ForumError;
use domains::fields::Fields;
use domains::models::VoteValue;
use domains::ports::{DocumentStore, Query};
use services::{MediaUpload, PostSort, SummaryStatus};

#[tokio::test]
async fn create_post_round_trips_through_the_feed_trimmed() {
    let bed = forum().await;
    bed.forum
        .create_post("alice", "Alice", "  Hello world  ", "  first post  ", None)
        .await
        .unwrap();

    let mut posts = bed.forum.subscribe_posts();
    let snapshot = tokio::time::timeout(WAIT, posts.wait_for(|posts| !posts.is_empty()))
        .await
        .unwrap()
        .unwrap()
        .clone();

    assert_eq!(snapshot.len(), 1);
    let post = &snapshot[0];
    assert_eq!(post.title, "Hello world");
    assert_eq!(post.content, "first post");
    assert_eq!((post.up_votes, post.down_votes), (0, 0));
    assert!(post.media_url.is_none());
}

#[tokio::test]
async fn blank_input_is_rejected_before_any_store_write() {
    let bed = forum().await;
    let err = bed
        .forum
        .create_post("alice", "Alice", "   ", "body", None)
        .await
        .unwrap_err();
    assert!(matches!(err, ForumError::ValidationError(_)));

    let docs = bed
        .store
        .query(Query::collection(collections::POSTS))
        .await
        .unwrap();
    assert!(docs.is_empty());
}

#[tokio::test]
async fn media_uploads_land_on_the_post() {
    let bed = forum().await;
    let post_id = bed
        .forum
        .create_post(
            "alice",
            "Alice",
            "With a picture",
            "look at this",
            Some(MediaUpload {
                filename: "pic.png".into(),
                content_type: mime::IMAGE_PNG,
                data: Bytes::from_static(b"pixels"),
            }),
        )
        .await
        .unwrap();

    let doc = bed
        .store
        .get(&collections::post_key(&post_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.fields["media_url"], serde_json::json!("/media/pic.png"));
}

#[tokio::test]
async fn only_the_owner_edits_or_deletes_a_post() {
    let bed = forum().await;
    let post_id = bed
        .forum
        .create_post("alice", "Alice", "Mine", "my body", None)
        .await
        .unwrap();

    assert!(matches!(
        bed.forum.edit_post(&post_id, "mallory", "Stolen", "rewritten").await,
        Err(ForumError::Unauthorized(_))
    ));
    assert!(matches!(
        bed.forum.delete_post(&post_id, "mallory").await,
        Err(ForumError::Unauthorized(_))
    ));

    bed.forum
        .edit_post(&post_id, "alice", "Mine, edited", "still my body")
        .await
        .unwrap();
    let detail = bed.forum.post_detail(&post_id, "alice").await.unwrap();
    assert_eq!(detail.post.title, "Mine, edited");
}

#[tokio::test]
async fn delete_post_cascades_to_all_dependents() {
    let bed = forum().await;
    let post_id = bed
        .forum
        .create_post("alice", "Alice", "Doomed", "to be removed", None)
        .await
        .unwrap();
    bed.forum
        .create_comment(&post_id, "bob", "Bob", "a comment")
        .await
        .unwrap();
    bed.forum.cast_vote(&post_id, "bob", VoteValue::Up).await.unwrap();
    // Summary caches written out of band.
    bed.store
        .set(
            &collections::thread_summary_key(&post_id),
            Fields::new()
                .set("post_id", &post_id)
                .set("summary", "cached")
                .set("comment_count", 1)
                .server_timestamp("created_at")
                .server_timestamp("updated_at"),
            false,
        )
        .await
        .unwrap();

    bed.forum.delete_post(&post_id, "alice").await.unwrap();

    let comments = bed
        .store
        .query(Query::collection(collections::COMMENTS).filter("post_id", post_id.as_str()))
        .await
        .unwrap();
    assert!(comments.is_empty());
    let votes = bed
        .store
        .query(Query::collection(collections::post_votes(&post_id)))
        .await
        .unwrap();
    assert!(votes.is_empty());
    assert!(bed
        .store
        .get(&collections::thread_summary_key(&post_id))
        .await
        .unwrap()
        .is_none());
    assert!(bed
        .store
        .get(&collections::post_key(&post_id))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn comments_are_deleted_by_owner_or_post_owner_only() {
    let bed = forum().await;
    let post_id = bed
        .forum
        .create_post("alice", "Alice", "Thread", "body", None)
        .await
        .unwrap();
    let comment_id = bed
        .forum
        .create_comment(&post_id, "bob", "Bob", "my take")
        .await
        .unwrap();

    assert!(matches!(
        bed.forum.delete_comment(&comment_id, "mallory").await,
        Err(ForumError::Unauthorized(_))
    ));

    // Post owner moderates their own thread.
    bed.forum.delete_comment(&comment_id, "alice").await.unwrap();
    assert!(bed
        .store
        .get(&collections::comment_key(&comment_id))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn notification_reads_are_scoped_to_the_recipient() {
    let bed = forum().await;
    let post_id = bed
        .forum
        .create_post("alice", "Alice", "Popular", "body", None)
        .await
        .unwrap();
    bed.forum.cast_vote(&post_id, "bob", VoteValue::Up).await.unwrap();

    assert_eq!(bed.forum.unread_notifications("alice").await.unwrap(), 1);
    let notifications = bed.forum.notifications("alice").await.unwrap();
    let id = notifications[0].id.clone();

    assert!(matches!(
        bed.forum.mark_notification_read(&id, "bob").await,
        Err(ForumError::Unauthorized(_))
    ));
    bed.forum.mark_notification_read(&id, "alice").await.unwrap();
    assert_eq!(bed.forum.unread_notifications("alice").await.unwrap(), 0);
}

#[tokio::test]
async fn post_detail_exposes_score_vote_state_and_summary_states() {
    let bed = forum().await;
    let post_id = bed
        .forum
        .create_post("alice", "Alice", "Detailed", "body", None)
        .await
        .unwrap();
    bed.forum.create_comment(&post_id, "bob", "Bob", "one").await.unwrap();
    bed.forum.create_comment(&post_id, "carol", "Carol", "two").await.unwrap();
    bed.forum.cast_vote(&post_id, "bob", VoteValue::Up).await.unwrap();
    bed.forum.cast_vote(&post_id, "carol", VoteValue::Down).await.unwrap();

    let detail = bed.forum.post_detail(&post_id, "bob").await.unwrap();
    assert_eq!(detail.score, 0);
    assert_eq!(detail.user_vote, Some(VoteValue::Up));
    assert_eq!(detail.comment_count, 2);
    assert_eq!(detail.post_summary, SummaryStatus::Absent);
    assert_eq!(detail.thread_summary, SummaryStatus::Absent);
}

#[tokio::test]
async fn post_views_filter_and_sort_over_the_live_snapshot() {
    let bed = forum().await;
    let first = bed
        .forum
        .create_post("a", "A", "Rust ownership", "borrow checker notes", None)
        .await
        .unwrap();
    let second = bed
        .forum
        .create_post("b", "B", "Sourdough", "rust-colored crust", None)
        .await
        .unwrap();
    bed.forum
        .create_post("c", "C", "Gardening", "tomatoes", None)
        .await
        .unwrap();
    bed.forum.cast_vote(&second, "z", VoteValue::Up).await.unwrap();

    let mut posts = bed.forum.subscribe_posts();
    tokio::time::timeout(WAIT, posts.wait_for(|posts| {
        posts.len() == 3 && posts.iter().any(|p| p.up_votes == 1)
    }))
    .await
    .unwrap()
    .unwrap();

    let hits = bed.forum.posts(Some("rust"), PostSort::TopScore);
    let ids: Vec<_> = hits.iter().map(|p| p.id.clone()).collect();
    assert_eq!(ids, vec![second, first]);
}
