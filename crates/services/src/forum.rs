//! # ForumAggregate
//!
//! Composes the live post feed, per-open-post comment feeds, vote casting,
//! and both summary orchestrators into the surface the presentation layer
//! consumes. Holds no persistent state of its own beyond the latest feed
//! snapshots.

use std::sync::Arc;

use bytes::Bytes;
use mime::Mime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use domains::document::collections;
use domains::error::{ForumError, Result};
use domains::fields::Fields;
use domains::models::{Comment, Notification, Post, Vote, VoteValue};
use domains::ports::{Direction, DocumentStore, Query, SummaryProvider};

use crate::feed::TypedFeed;
use crate::summary::{
    RequestOutcome, SubjectSnapshot, SummaryOrchestrator, SummaryPolicy, SummaryStatus,
};
use crate::votes::{VoteOutcome, VoteReconciler};

/// Sort key for the post view. Ties break by feed order (stable sort).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostSort {
    /// Creation time, newest first.
    Newest,
    /// Net score (`up_votes − down_votes`), highest first.
    TopScore,
}

/// Client-side filter + sort over a post snapshot. The filter is a
/// case-insensitive substring match on title and content.
pub fn filter_and_sort(posts: &[Post], filter: Option<&str>, sort: PostSort) -> Vec<Post> {
    let needle = filter
        .map(|text| text.trim().to_lowercase())
        .filter(|text| !text.is_empty());
    let mut out: Vec<Post> = posts
        .iter()
        .filter(|post| match &needle {
            Some(needle) => {
                post.title.to_lowercase().contains(needle)
                    || post.content.to_lowercase().contains(needle)
            }
            None => true,
        })
        .cloned()
        .collect();
    match sort {
        PostSort::Newest => out.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        PostSort::TopScore => out.sort_by(|a, b| b.net_score().cmp(&a.net_score())),
    }
    out
}

/// A pending media attachment for `create_post`.
pub struct MediaUpload {
    pub filename: String,
    pub content_type: Mime,
    pub data: Bytes,
}

/// Per-post detail view for the presentation layer.
#[derive(Debug, Clone)]
pub struct PostDetail {
    pub post: Post,
    pub score: i64,
    pub user_vote: Option<VoteValue>,
    pub comment_count: i64,
    pub post_summary: SummaryStatus,
    pub thread_summary: SummaryStatus,
}

/// Live view over one post's comments. Owns its feed task; dropping the
/// view tears the feed down.
pub struct ThreadView {
    post_id: String,
    comments: watch::Receiver<Vec<Comment>>,
    task: JoinHandle<()>,
}

impl ThreadView {
    pub fn post_id(&self) -> &str {
        &self.post_id
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Comment>> {
        self.comments.clone()
    }

    /// Latest delivered comment set, oldest first.
    pub fn comments(&self) -> Vec<Comment> {
        self.comments.borrow().clone()
    }

    pub fn comment_count(&self) -> i64 {
        self.comments.borrow().len() as i64
    }
}

impl Drop for ThreadView {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct ForumAggregate {
    store: Arc<dyn DocumentStore>,
    blobs: Arc<dyn domains::ports::BlobStore>,
    votes: VoteReconciler,
    post_summaries: SummaryOrchestrator,
    thread_summaries: SummaryOrchestrator,
    posts: watch::Receiver<Vec<Post>>,
    tasks: Vec<JoinHandle<()>>,
}

impl ForumAggregate {
    /// Wires the aggregate: starts both orchestrators' cache feeds and the
    /// live post feed, which also drives post-summary auto evaluation.
    pub async fn new(
        store: Arc<dyn DocumentStore>,
        blobs: Arc<dyn domains::ports::BlobStore>,
        provider: Arc<dyn SummaryProvider>,
        policy: SummaryPolicy,
    ) -> Result<Self> {
        let votes = VoteReconciler::new(store.clone());
        let post_summaries =
            SummaryOrchestrator::for_posts(store.clone(), provider.clone(), policy);
        let thread_summaries = SummaryOrchestrator::for_threads(store.clone(), provider, policy);

        let mut tasks = Vec::new();
        tasks.push(post_summaries.start().await?);
        tasks.push(thread_summaries.start().await?);

        let feed = store
            .watch(
                Query::collection(collections::POSTS)
                    .order_by("created_at", Direction::Descending),
            )
            .await?;
        let mut feed = TypedFeed::<Post>::new(feed);
        let (tx, posts) = watch::channel(Vec::new());
        let orchestrator = post_summaries.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(posts) = feed.next().await {
                for post in &posts {
                    orchestrator.evaluate(SubjectSnapshot::post(post)).await;
                }
                tx.send_replace(posts);
            }
        }));

        Ok(Self {
            store,
            blobs,
            votes,
            post_summaries,
            thread_summaries,
            posts,
            tasks,
        })
    }

    // ── Post feed views ─────────────────────────────────────────────────

    /// Watch the live post snapshot (feed order: newest first).
    pub fn subscribe_posts(&self) -> watch::Receiver<Vec<Post>> {
        self.posts.clone()
    }

    /// Filtered/sorted view over the latest post snapshot.
    pub fn posts(&self, filter: Option<&str>, sort: PostSort) -> Vec<Post> {
        filter_and_sort(&self.posts.borrow(), filter, sort)
    }

    /// Opens a live comment feed for one post. The returned view drives
    /// thread-summary auto evaluation as comment snapshots arrive.
    pub async fn open_thread(&self, post_id: &str) -> Result<ThreadView> {
        let feed = self
            .store
            .watch(
                Query::collection(collections::COMMENTS)
                    .filter("post_id", post_id)
                    .order_by("created_at", Direction::Ascending),
            )
            .await?;
        let mut feed = TypedFeed::<Comment>::new(feed);
        let (tx, rx) = watch::channel(Vec::new());
        let orchestrator = self.thread_summaries.clone();
        let subject_id = post_id.to_string();
        let task = tokio::spawn(async move {
            while let Some(comments) = feed.next().await {
                orchestrator
                    .evaluate(SubjectSnapshot::thread(&subject_id, &comments))
                    .await;
                tx.send_replace(comments);
            }
        });
        Ok(ThreadView {
            post_id: post_id.to_string(),
            comments: rx,
            task,
        })
    }

    // ── Post commands ───────────────────────────────────────────────────

    /// Creates a post. Validation happens before any store or blob call;
    /// title and content are stored trimmed, counters start at zero.
    pub async fn create_post(
        &self,
        uid: &str,
        author: &str,
        title: &str,
        content: &str,
        media: Option<MediaUpload>,
    ) -> Result<String> {
        let title = non_empty("title", title)?;
        let content = non_empty("content", content)?;

        let media_url = match media {
            Some(upload) => Some(
                self.blobs
                    .upload(&upload.filename, &upload.content_type, upload.data)
                    .await?,
            ),
            None => None,
        };

        let mut fields = Fields::new()
            .set("uid", uid)
            .set("author", author)
            .set("title", title)
            .set("content", content)
            .set("up_votes", 0)
            .set("down_votes", 0)
            .server_timestamp("created_at");
        if let Some(url) = media_url {
            fields = fields.set("media_url", url);
        }
        let key = self.store.add(collections::POSTS, fields).await?;
        debug!(post_id = %key.id, %uid, "created post");
        Ok(key.id)
    }

    /// Owner-only title/content edit. Vote counters are never touched here.
    pub async fn edit_post(
        &self,
        post_id: &str,
        uid: &str,
        title: &str,
        content: &str,
    ) -> Result<()> {
        let title = non_empty("title", title)?;
        let content = non_empty("content", content)?;
        let post = self.load_post(post_id).await?;
        if post.uid != uid {
            return Err(ForumError::Unauthorized(
                "only the post owner may edit it".into(),
            ));
        }
        self.store
            .update(
                &collections::post_key(post_id),
                Fields::new().set("title", title).set("content", content),
            )
            .await?;
        Ok(())
    }

    /// Owner-only deletion. Cascades to comments, vote sub-records, and
    /// both summary caches; dependents go first so no feed ever observes a
    /// comment set without its post resurrecting.
    pub async fn delete_post(&self, post_id: &str, uid: &str) -> Result<()> {
        let post = self.load_post(post_id).await?;
        if post.uid != uid {
            return Err(ForumError::Unauthorized(
                "only the post owner may delete it".into(),
            ));
        }

        let comments = self
            .store
            .query(Query::collection(collections::COMMENTS).filter("post_id", post_id))
            .await?;
        for doc in comments {
            self.store.delete(&doc.key).await?;
        }
        let votes = self
            .store
            .query(Query::collection(collections::post_votes(post_id)))
            .await?;
        for doc in votes {
            self.store.delete(&doc.key).await?;
        }
        self.store
            .delete(&collections::post_summary_key(post_id))
            .await?;
        self.store
            .delete(&collections::thread_summary_key(post_id))
            .await?;
        self.store.delete(&collections::post_key(post_id)).await?;
        debug!(%post_id, %uid, "deleted post and its dependents");
        Ok(())
    }

    // ── Comment commands ────────────────────────────────────────────────

    pub async fn create_comment(
        &self,
        post_id: &str,
        uid: &str,
        author: &str,
        content: &str,
    ) -> Result<String> {
        let content = non_empty("content", content)?;
        // The parent must exist; comments never outlive their post.
        self.load_post(post_id).await?;
        let fields = Fields::new()
            .set("post_id", post_id)
            .set("uid", uid)
            .set("author", author)
            .set("content", content)
            .server_timestamp("created_at");
        let key = self.store.add(collections::COMMENTS, fields).await?;
        Ok(key.id)
    }

    pub async fn edit_comment(&self, comment_id: &str, uid: &str, content: &str) -> Result<()> {
        let content = non_empty("content", content)?;
        let comment = self.load_comment(comment_id).await?;
        if comment.uid != uid {
            return Err(ForumError::Unauthorized(
                "only the comment owner may edit it".into(),
            ));
        }
        self.store
            .update(
                &collections::comment_key(comment_id),
                Fields::new().set("content", content),
            )
            .await?;
        Ok(())
    }

    /// Deleted by the comment owner, or by the post owner moderating their
    /// own thread.
    pub async fn delete_comment(&self, comment_id: &str, uid: &str) -> Result<()> {
        let comment = self.load_comment(comment_id).await?;
        if comment.uid != uid {
            let post = self.load_post(&comment.post_id).await?;
            if post.uid != uid {
                return Err(ForumError::Unauthorized(
                    "only the comment owner or the post owner may delete it".into(),
                ));
            }
        }
        self.store
            .delete(&collections::comment_key(comment_id))
            .await?;
        Ok(())
    }

    // ── Votes ───────────────────────────────────────────────────────────

    pub async fn cast_vote(
        &self,
        post_id: &str,
        uid: &str,
        value: VoteValue,
    ) -> Result<VoteOutcome> {
        self.votes.cast_vote(post_id, uid, value).await
    }

    /// The user's live vote on a post, if any.
    pub async fn vote_state(&self, post_id: &str, uid: &str) -> Result<Option<VoteValue>> {
        let doc = self.store.get(&collections::vote_key(post_id, uid)).await?;
        match doc {
            Some(doc) => {
                let vote: Vote = doc.decode()?;
                Ok(Some(vote.value))
            }
            None => Ok(None),
        }
    }

    // ── Summaries ───────────────────────────────────────────────────────

    pub async fn request_post_summary(&self, post_id: &str) -> Result<RequestOutcome> {
        let post = self.load_post(post_id).await?;
        Ok(self.post_summaries.request(SubjectSnapshot::post(&post)).await)
    }

    pub async fn request_thread_summary(&self, post_id: &str) -> Result<RequestOutcome> {
        self.load_post(post_id).await?;
        let comments = self.comments_of(post_id).await?;
        Ok(self
            .thread_summaries
            .request(SubjectSnapshot::thread(post_id, &comments))
            .await)
    }

    pub async fn post_summary_status(&self, post_id: &str) -> watch::Receiver<SummaryStatus> {
        self.post_summaries.status(post_id).await
    }

    pub async fn thread_summary_status(&self, post_id: &str) -> watch::Receiver<SummaryStatus> {
        self.thread_summaries.status(post_id).await
    }

    // ── Notifications ───────────────────────────────────────────────────

    /// The user's notifications, newest first.
    pub async fn notifications(&self, uid: &str) -> Result<Vec<Notification>> {
        let docs = self
            .store
            .query(
                Query::collection(collections::NOTIFICATIONS)
                    .filter("to_uid", uid)
                    .order_by("created_at", Direction::Descending),
            )
            .await?;
        docs.iter()
            .map(|doc| doc.decode::<Notification>().map_err(ForumError::from))
            .collect()
    }

    pub async fn watch_notifications(&self, uid: &str) -> Result<TypedFeed<Notification>> {
        let feed = self
            .store
            .watch(
                Query::collection(collections::NOTIFICATIONS)
                    .filter("to_uid", uid)
                    .order_by("created_at", Direction::Descending),
            )
            .await?;
        Ok(TypedFeed::new(feed))
    }

    pub async fn unread_notifications(&self, uid: &str) -> Result<usize> {
        let docs = self
            .store
            .query(
                Query::collection(collections::NOTIFICATIONS)
                    .filter("to_uid", uid)
                    .filter("read", false),
            )
            .await?;
        Ok(docs.len())
    }

    pub async fn mark_notification_read(&self, notification_id: &str, uid: &str) -> Result<()> {
        let key = domains::document::DocKey::new(collections::NOTIFICATIONS, notification_id);
        let doc = self.store.get(&key).await?.ok_or_else(|| {
            ForumError::NotFound("Notification".into(), notification_id.into())
        })?;
        let notification: Notification = doc.decode()?;
        if notification.to_uid != uid {
            return Err(ForumError::Unauthorized(
                "notification belongs to another user".into(),
            ));
        }
        self.store
            .update(&key, Fields::new().set("read", true))
            .await?;
        Ok(())
    }

    // ── Detail view ─────────────────────────────────────────────────────

    pub async fn post_detail(&self, post_id: &str, uid: &str) -> Result<PostDetail> {
        let post = self.load_post(post_id).await?;
        let user_vote = self.vote_state(post_id, uid).await?;
        let comment_count = self.comments_of(post_id).await?.len() as i64;
        let post_summary = self.post_summaries.status(post_id).await.borrow().clone();
        let thread_summary = self.thread_summaries.status(post_id).await.borrow().clone();
        Ok(PostDetail {
            score: post.net_score(),
            post,
            user_vote,
            comment_count,
            post_summary,
            thread_summary,
        })
    }

    // ── Internals ───────────────────────────────────────────────────────

    async fn load_post(&self, post_id: &str) -> Result<Post> {
        let doc = self
            .store
            .get(&collections::post_key(post_id))
            .await?
            .ok_or_else(|| ForumError::NotFound("Post".into(), post_id.into()))?;
        Ok(doc.decode()?)
    }

    async fn load_comment(&self, comment_id: &str) -> Result<Comment> {
        let doc = self
            .store
            .get(&collections::comment_key(comment_id))
            .await?
            .ok_or_else(|| ForumError::NotFound("Comment".into(), comment_id.into()))?;
        Ok(doc.decode()?)
    }

    async fn comments_of(&self, post_id: &str) -> Result<Vec<Comment>> {
        let docs = self
            .store
            .query(
                Query::collection(collections::COMMENTS)
                    .filter("post_id", post_id)
                    .order_by("created_at", Direction::Ascending),
            )
            .await?;
        docs.iter()
            .map(|doc| doc.decode::<Comment>().map_err(ForumError::from))
            .collect()
    }
}

impl Drop for ForumAggregate {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Rejects blank user input before any store call.
fn non_empty(field: &'static str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ForumError::ValidationError(format!(
            "{field} must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn post(id: &str, title: &str, content: &str, created: i64, up: i64, down: i64) -> Post {
        Post {
            id: id.into(),
            uid: "u".into(),
            author: "A".into(),
            title: title.into(),
            content: content.into(),
            created_at: Utc.timestamp_micros(created).unwrap(),
            up_votes: up,
            down_votes: down,
            media_url: None,
        }
    }

    #[test]
    fn filter_matches_title_and_content_case_insensitively() {
        let posts = vec![
            post("a", "Rust tips", "ownership", 3, 0, 0),
            post("b", "Gardening", "grow RUST-resistant wheat", 2, 0, 0),
            post("c", "Cooking", "pasta", 1, 0, 0),
        ];
        let hits = filter_and_sort(&posts, Some("rust"), PostSort::Newest);
        let ids: Vec<_> = hits.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn blank_filter_matches_everything() {
        let posts = vec![post("a", "t", "c", 2, 0, 0), post("b", "t", "c", 1, 0, 0)];
        assert_eq!(filter_and_sort(&posts, Some("   "), PostSort::Newest).len(), 2);
    }

    #[test]
    fn top_score_sorts_by_net_score_with_stable_ties() {
        let posts = vec![
            post("a", "t", "c", 4, 1, 0), // net 1
            post("b", "t", "c", 3, 5, 1), // net 4
            post("c", "t", "c", 2, 2, 1), // net 1, ties with a, keeps feed order
        ];
        let sorted = filter_and_sort(&posts, None, PostSort::TopScore);
        let ids: Vec<_> = sorted.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["b", "a", "c"]);
    }

    #[test]
    fn non_empty_trims_and_rejects_blank() {
        assert_eq!(non_empty("title", "  hi  ").unwrap(), "hi");
        assert!(matches!(
            non_empty("title", "   "),
            Err(ForumError::ValidationError(_))
        ));
    }
}
