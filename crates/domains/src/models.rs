//! # Domain Models
//!
//! These structs represent the core entities of Rusty-Forum.
//! Timestamps serialize as epoch microseconds so the store can order and
//! compare them as plain integers; ids are store-assigned UUID v7 strings
//! (time-ordered) except where a natural key applies (votes, summaries).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A top-level forum post with denormalized vote counters.
///
/// `up_votes`/`down_votes` are a derived cache of the post's vote records,
/// kept in agreement by the vote reconciler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    #[serde(default)]
    pub id: String,
    /// Owner uid; the only identity allowed to edit title/content.
    pub uid: String,
    pub author: String,
    pub title: String,
    pub content: String,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub up_votes: i64,
    #[serde(default)]
    pub down_votes: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
}

impl Post {
    /// `up_votes − down_votes`, the feed's score sort key.
    pub fn net_score(&self) -> i64 {
        self.up_votes - self.down_votes
    }
}

/// A comment on a post. `post_id` is an immutable foreign key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(default)]
    pub id: String,
    pub post_id: String,
    pub uid: String,
    pub author: String,
    pub content: String,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub created_at: DateTime<Utc>,
}

/// Direction of a vote, stored as ±1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum VoteValue {
    Up,
    Down,
}

impl VoteValue {
    pub fn delta(self) -> i64 {
        match self {
            VoteValue::Up => 1,
            VoteValue::Down => -1,
        }
    }

    /// The post counter field this direction contributes to.
    pub fn counter_field(self) -> &'static str {
        match self {
            VoteValue::Up => "up_votes",
            VoteValue::Down => "down_votes",
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            VoteValue::Up => VoteValue::Down,
            VoteValue::Down => VoteValue::Up,
        }
    }
}

impl From<VoteValue> for i64 {
    fn from(value: VoteValue) -> Self {
        value.delta()
    }
}

impl TryFrom<i64> for VoteValue {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(VoteValue::Up),
            -1 => Ok(VoteValue::Down),
            other => Err(format!("vote value must be +1 or -1, got {other}")),
        }
    }
}

/// One user's live vote on one post, keyed by `(post_id, uid)`.
/// Record existence is the source of truth for "has this user voted".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub uid: String,
    pub post_id: String,
    pub value: VoteValue,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    UpVote,
    DownVote,
}

impl From<VoteValue> for NotificationKind {
    fn from(value: VoteValue) -> Self {
        match value {
            VoteValue::Up => NotificationKind::UpVote,
            VoteValue::Down => NotificationKind::DownVote,
        }
    }
}

/// Written to a post owner when another user votes on their post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default)]
    pub id: String,
    pub kind: NotificationKind,
    pub to_uid: String,
    pub from_uid: String,
    pub post_id: String,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

/// Cached natural-language summary of a post body. Written only by the
/// summary orchestrator, never user-edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostSummary {
    pub post_id: String,
    pub summary: String,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub updated_at: DateTime<Utc>,
}

/// Cached summary of a post's comment thread. Valid only while the stored
/// `comment_count` equals the live comment count; otherwise stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub post_id: String,
    pub summary: String,
    pub comment_count: i64,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub updated_at: DateTime<Utc>,
}
