//! # VoteReconciler
//!
//! Turns a raw "user cast vote V on post P" intent into a consistent
//! mutation of the post's counters and the user's vote record.
//!
//! The whole case dispatch is a conditional read-then-write: the decision
//! taken from the read is committed together with a guard on the vote
//! record, so a concurrent writer on the same `(post, user)` key surfaces
//! as `TxnConflict` and the loop re-reads and re-decides. A re-read after
//! a conflict observes the already-applied state, so retried calls never
//! double-apply a counter change.

use std::sync::Arc;

use tracing::{debug, warn};

use domains::document::collections;
use domains::error::{ForumError, StoreError};
use domains::fields::Fields;
use domains::models::{NotificationKind, Post, Vote, VoteValue};
use domains::ports::{DocumentStore, Txn, TxnGuard};

const MAX_COMMIT_ATTEMPTS: usize = 5;

/// What a `cast_vote` call did, from the caller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// No prior vote existed; one was created.
    Created(VoteValue),
    /// The prior vote equalled the request; it was removed (toggle-off).
    Removed(VoteValue),
    /// The prior vote was opposite; it was overwritten.
    Switched { from: VoteValue, to: VoteValue },
}

#[derive(Clone)]
pub struct VoteReconciler {
    store: Arc<dyn DocumentStore>,
}

impl VoteReconciler {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Casts, toggles off, or switches the user's vote on a post, keeping
    /// the post's denormalized counters in agreement with the vote record.
    pub async fn cast_vote(
        &self,
        post_id: &str,
        uid: &str,
        value: VoteValue,
    ) -> Result<VoteOutcome, ForumError> {
        let post_key = collections::post_key(post_id);
        let vote_key = collections::vote_key(post_id, uid);

        for attempt in 0..MAX_COMMIT_ATTEMPTS {
            let post_doc = self
                .store
                .get(&post_key)
                .await?
                .ok_or_else(|| ForumError::NotFound("Post".into(), post_id.into()))?;
            let post: Post = post_doc.decode()?;
            let existing = self.store.get(&vote_key).await?;

            let (txn, outcome) = match existing {
                None => {
                    let vote_fields = Fields::new()
                        .set("uid", uid)
                        .set("post_id", post_id)
                        .set("value", value)
                        .server_timestamp("created_at")
                        .server_timestamp("updated_at");
                    let txn = Txn::new()
                        .guard(TxnGuard::Exists(post_key.clone()))
                        .guard(TxnGuard::NotExists(vote_key.clone()))
                        .set(vote_key.clone(), vote_fields, false)
                        .update(
                            post_key.clone(),
                            Fields::new().increment(value.counter_field(), 1),
                        );
                    (txn, VoteOutcome::Created(value))
                }
                Some(vote_doc) => {
                    let vote: Vote = vote_doc.decode()?;
                    if vote.value == value {
                        // Toggle-off: drop the record, take back the counter.
                        let txn = Txn::new()
                            .guard(TxnGuard::Exists(post_key.clone()))
                            .guard(TxnGuard::RevMatches(vote_key.clone(), vote_doc.rev))
                            .delete(vote_key.clone())
                            .update(
                                post_key.clone(),
                                Fields::new().increment(value.counter_field(), -1),
                            );
                        (txn, VoteOutcome::Removed(value))
                    } else {
                        // Switch: overwrite the record (created_at survives the
                        // merge) and move one count across in a single update.
                        let txn = Txn::new()
                            .guard(TxnGuard::Exists(post_key.clone()))
                            .guard(TxnGuard::RevMatches(vote_key.clone(), vote_doc.rev))
                            .set(
                                vote_key.clone(),
                                Fields::new().set("value", value).server_timestamp("updated_at"),
                                true,
                            )
                            .update(
                                post_key.clone(),
                                Fields::new()
                                    .increment(value.counter_field(), 1)
                                    .increment(vote.value.counter_field(), -1),
                            );
                        (
                            txn,
                            VoteOutcome::Switched {
                                from: vote.value,
                                to: value,
                            },
                        )
                    }
                }
            };

            match self.store.commit(txn).await {
                Ok(()) => {
                    if !matches!(outcome, VoteOutcome::Removed(_)) {
                        self.notify_owner(&post, post_id, uid, value).await;
                    }
                    return Ok(outcome);
                }
                Err(StoreError::TxnConflict(reason)) if attempt + 1 < MAX_COMMIT_ATTEMPTS => {
                    debug!(%post_id, %uid, attempt, %reason, "vote commit contended, re-reading");
                    continue;
                }
                Err(error) => return Err(error.into()),
            }
        }

        Err(StoreError::TxnConflict(format!(
            "vote on {post_id} by {uid} kept contending after {MAX_COMMIT_ATTEMPTS} attempts"
        ))
        .into())
    }

    /// Tells the post owner about a created or switched vote. The kind
    /// reflects the resulting direction, not the delta. Never emitted for
    /// self-votes or unvotes; a write failure is logged and does not fail
    /// the vote itself.
    async fn notify_owner(&self, post: &Post, post_id: &str, from_uid: &str, value: VoteValue) {
        if post.uid == from_uid {
            return;
        }
        let fields = Fields::new()
            .set("kind", NotificationKind::from(value))
            .set("to_uid", &post.uid)
            .set("from_uid", from_uid)
            .set("post_id", post_id)
            .set("read", false)
            .server_timestamp("created_at");
        if let Err(error) = self.store.add(collections::NOTIFICATIONS, fields).await {
            warn!(%post_id, %from_uid, %error, "failed to record vote notification");
        }
    }
}
