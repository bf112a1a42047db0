//! # Documents & Keys
//!
//! The store addresses flat JSON documents by `collection/id`. Collections
//! may themselves be nested paths (per-post vote sub-records live under
//! `posts/{post_id}/votes`).

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::StoreError;

/// Logical collection names and key builders for the persisted layout.
pub mod collections {
    use super::DocKey;

    pub const POSTS: &str = "posts";
    pub const COMMENTS: &str = "comments";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const POST_SUMMARIES: &str = "post_summaries";
    pub const THREAD_SUMMARIES: &str = "thread_summaries";

    /// Sub-collection holding one vote record per voter for a post.
    pub fn post_votes(post_id: &str) -> String {
        format!("{POSTS}/{post_id}/votes")
    }

    pub fn post_key(post_id: &str) -> DocKey {
        DocKey::new(POSTS, post_id)
    }

    pub fn comment_key(comment_id: &str) -> DocKey {
        DocKey::new(COMMENTS, comment_id)
    }

    /// Votes use the voter's uid as a natural key, which is what makes
    /// "at most one vote per (post, user)" a keying fact rather than a
    /// query invariant.
    pub fn vote_key(post_id: &str, uid: &str) -> DocKey {
        DocKey::new(post_votes(post_id), uid)
    }

    pub fn post_summary_key(post_id: &str) -> DocKey {
        DocKey::new(POST_SUMMARIES, post_id)
    }

    pub fn thread_summary_key(post_id: &str) -> DocKey {
        DocKey::new(THREAD_SUMMARIES, post_id)
    }
}

/// Address of a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocKey {
    pub collection: String,
    pub id: String,
}

impl DocKey {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Full path, e.g. `posts/0192d.../votes/user-7`.
    pub fn path(&self) -> String {
        format!("{}/{}", self.collection, self.id)
    }
}

/// A document as read back from the store: its key, the store's commit
/// revision at last write, and the raw field map.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub key: DocKey,
    /// Store-wide commit sequence at the document's last write; used for
    /// conditional (`RevMatches`) transaction guards.
    pub rev: u64,
    pub fields: Map<String, Value>,
}

impl Document {
    /// Decodes the field map into a model type, injecting the key's id into
    /// the `id` field when the stored document omits it.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        let mut fields = self.fields.clone();
        fields
            .entry("id".to_string())
            .or_insert_with(|| Value::String(self.key.id.clone()));
        serde_json::from_value(Value::Object(fields)).map_err(|source| StoreError::Decode {
            key: self.key.path(),
            source,
        })
    }
}
