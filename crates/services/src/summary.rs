//! # SummaryOrchestrator
//!
//! Decides, from mutable content and a cached artifact, whether to invoke
//! an expensive external generation call. One engine, two instances: post
//! bodies and comment threads.
//!
//! Per-subject lifecycle: `Absent → Generating → Ready`, back to
//! `Generating` on manual refresh or detected staleness, and to
//! `Failed` (cache untouched) when the provider errors. Failures are
//! surfaced, never auto-retried: a failed attempt latches the trigger
//! fingerprint (content hash for posts, comment count for threads) and
//! auto-generation stays suppressed until the fingerprint changes or a
//! manual request intervenes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use domains::document::{collections, DocKey, Document};
use domains::error::{ProviderError, SummaryError};
use domains::fields::Fields;
use domains::models::{Comment, Post, PostSummary, ThreadSummary};
use domains::ports::{
    Direction, DocumentStore, Query, SummaryProvider, SummaryRequest, SummaryResponse,
    SummarySubject,
};

/// Thresholds governing auto-generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryPolicy {
    /// Body length (chars) a post must exceed before a summary auto-fires.
    pub post_min_chars: usize,
    /// Minimum live comment count before a thread summary auto-fires.
    pub thread_min_comments: i64,
    /// Length cap passed through to the provider.
    pub max_summary_chars: usize,
}

impl Default for SummaryPolicy {
    fn default() -> Self {
        Self {
            post_min_chars: 200,
            thread_min_comments: 3,
            max_summary_chars: 480,
        }
    }
}

/// The cached artifact as the orchestrator knows it.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryArtifact {
    pub summary: String,
    /// Comment-count snapshot for thread summaries; `None` for posts.
    pub comment_count: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

/// Observable per-subject state, delivered over a watch channel.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SummaryStatus {
    #[default]
    Absent,
    Generating,
    Ready(SummaryArtifact),
    /// Generation failed; no cache was written. Carries the surfaced error.
    Failed(String),
}

/// Result of a manual generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Started,
    /// A generation was already in flight; no second provider call is made.
    AlreadyGenerating,
}

/// Everything the orchestrator needs to know about one subject at one
/// moment: the text to summarize and, for threads, the live comment count.
#[derive(Debug, Clone)]
pub struct SubjectSnapshot {
    pub post_id: String,
    pub content: String,
    pub comment_count: Option<i64>,
}

impl SubjectSnapshot {
    pub fn post(post: &Post) -> Self {
        Self {
            post_id: post.id.clone(),
            content: post.content.clone(),
            comment_count: None,
        }
    }

    pub fn thread(post_id: &str, comments: &[Comment]) -> Self {
        let content = comments
            .iter()
            .map(|comment| format!("{}: {}", comment.author, comment.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        Self {
            post_id: post_id.to_string(),
            content,
            comment_count: Some(comments.len() as i64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SummaryKind {
    Post,
    Thread,
}

struct Subject {
    status: watch::Sender<SummaryStatus>,
    generating: bool,
    cached: Option<SummaryArtifact>,
    /// Trigger fingerprint of the last failed attempt; auto-generation is
    /// suppressed while the subject still fingerprints the same.
    failed_fingerprint: Option<String>,
}

impl Subject {
    fn new() -> Self {
        let (status, _) = watch::channel(SummaryStatus::Absent);
        Self {
            status,
            generating: false,
            cached: None,
            failed_fingerprint: None,
        }
    }
}

#[derive(Default)]
struct Engine {
    subjects: HashMap<String, Subject>,
}

impl Engine {
    fn subject_mut(&mut self, post_id: &str) -> &mut Subject {
        self.subjects
            .entry(post_id.to_string())
            .or_insert_with(Subject::new)
    }
}

#[derive(Clone)]
pub struct SummaryOrchestrator {
    store: Arc<dyn DocumentStore>,
    provider: Arc<dyn SummaryProvider>,
    policy: SummaryPolicy,
    kind: SummaryKind,
    inner: Arc<Mutex<Engine>>,
}

impl SummaryOrchestrator {
    pub fn for_posts(
        store: Arc<dyn DocumentStore>,
        provider: Arc<dyn SummaryProvider>,
        policy: SummaryPolicy,
    ) -> Self {
        Self::new(store, provider, policy, SummaryKind::Post)
    }

    pub fn for_threads(
        store: Arc<dyn DocumentStore>,
        provider: Arc<dyn SummaryProvider>,
        policy: SummaryPolicy,
    ) -> Self {
        Self::new(store, provider, policy, SummaryKind::Thread)
    }

    fn new(
        store: Arc<dyn DocumentStore>,
        provider: Arc<dyn SummaryProvider>,
        policy: SummaryPolicy,
        kind: SummaryKind,
    ) -> Self {
        Self {
            store,
            provider,
            policy,
            kind,
            inner: Arc::new(Mutex::new(Engine::default())),
        }
    }

    fn collection(&self) -> &'static str {
        match self.kind {
            SummaryKind::Post => collections::POST_SUMMARIES,
            SummaryKind::Thread => collections::THREAD_SUMMARIES,
        }
    }

    fn subject_type(&self) -> SummarySubject {
        match self.kind {
            SummaryKind::Post => SummarySubject::Post,
            SummaryKind::Thread => SummarySubject::Thread,
        }
    }

    /// Primes the cache from a live feed over the summary collection and
    /// keeps folding it, so summaries written by other clients are observed
    /// and suppress auto-generation here.
    pub async fn start(&self) -> Result<JoinHandle<()>, SummaryError> {
        let query =
            Query::collection(self.collection()).order_by("updated_at", Direction::Ascending);
        let mut feed = self.store.watch(query).await?;
        let this = self.clone();
        Ok(tokio::spawn(async move {
            while let Some(snapshot) = feed.next().await {
                this.fold_cache(&snapshot.docs).await;
            }
        }))
    }

    /// Watchable status for one subject.
    pub async fn status(&self, post_id: &str) -> watch::Receiver<SummaryStatus> {
        let mut engine = self.inner.lock().await;
        engine.subject_mut(post_id).status.subscribe()
    }

    /// Auto-generation trigger, evaluated on every subject snapshot.
    /// Fires at most once per state transition; re-entrant evaluation while
    /// `Generating` is suppressed by the in-flight flag.
    pub async fn evaluate(&self, subject: SubjectSnapshot) {
        if !self.provider.is_configured() {
            return;
        }
        let fingerprint = self.fingerprint(&subject);
        let mut engine = self.inner.lock().await;
        let entry = engine.subject_mut(&subject.post_id);
        if entry.generating {
            return;
        }
        if self.cache_is_valid(entry.cached.as_ref(), &subject) {
            return;
        }
        if !self.auto_trigger(&subject) {
            return;
        }
        if entry.failed_fingerprint.as_deref() == Some(fingerprint.as_str()) {
            return;
        }
        debug!(post_id = %subject.post_id, kind = ?self.kind, "auto-triggering summary generation");
        self.launch(entry, subject, fingerprint, self.provider.clone());
    }

    /// Manual trigger: always permitted regardless of thresholds and cache
    /// state, subject only to "not already generating". Runs through the
    /// fallback chain, so an unconfigured provider degrades to the local
    /// extractive summarizer instead of failing outright.
    pub async fn request(&self, subject: SubjectSnapshot) -> RequestOutcome {
        let fingerprint = self.fingerprint(&subject);
        let provider: Arc<dyn SummaryProvider> =
            Arc::new(FallbackChain::new(self.provider.clone()));
        let mut engine = self.inner.lock().await;
        let entry = engine.subject_mut(&subject.post_id);
        if entry.generating {
            return RequestOutcome::AlreadyGenerating;
        }
        entry.failed_fingerprint = None;
        self.launch(entry, subject, fingerprint, provider);
        RequestOutcome::Started
    }

    /// Dispatches generation on a detached task. Not cancellable once
    /// dispatched; `finish` always clears the in-flight flag so a lost
    /// caller can never wedge future trigger evaluation.
    fn launch(
        &self,
        entry: &mut Subject,
        subject: SubjectSnapshot,
        fingerprint: String,
        provider: Arc<dyn SummaryProvider>,
    ) {
        entry.generating = true;
        entry.status.send_replace(SummaryStatus::Generating);

        let this = self.clone();
        tokio::spawn(async move {
            let request = SummaryRequest {
                subject: this.subject_type(),
                content: subject.content.clone(),
                max_chars: this.policy.max_summary_chars,
            };
            let result = provider.summarize(request).await;
            this.finish(subject, fingerprint, result).await;
        });
    }

    async fn finish(
        &self,
        subject: SubjectSnapshot,
        fingerprint: String,
        result: Result<SummaryResponse, ProviderError>,
    ) {
        let outcome = match result {
            Ok(response) => self.persist(&subject, response).await,
            Err(error) => Err(SummaryError::Provider(error)),
        };

        let mut engine = self.inner.lock().await;
        let entry = engine.subject_mut(&subject.post_id);
        entry.generating = false;
        match outcome {
            Ok(artifact) => {
                entry.cached = Some(artifact.clone());
                entry.failed_fingerprint = None;
                entry.status.send_replace(SummaryStatus::Ready(artifact));
            }
            Err(error) => {
                warn!(post_id = %subject.post_id, %error, "summary generation failed");
                entry.failed_fingerprint = Some(fingerprint);
                entry.status.send_replace(SummaryStatus::Failed(error.to_string()));
            }
        }
    }

    /// Persists a successful generation. `created_at` is written once and
    /// survives regenerations; thread summaries snapshot the comment count
    /// they were generated from for staleness detection.
    async fn persist(
        &self,
        subject: &SubjectSnapshot,
        response: SummaryResponse,
    ) -> Result<SummaryArtifact, SummaryError> {
        let key = DocKey::new(self.collection(), &subject.post_id);
        let existing = self.store.get(&key).await?;

        let mut fields = Fields::new()
            .set("post_id", &subject.post_id)
            .set("summary", &response.summary)
            .server_timestamp("updated_at");
        if let Some(count) = subject.comment_count {
            fields = fields.set("comment_count", count);
        }
        if existing.is_none() {
            fields = fields.server_timestamp("created_at");
        }
        self.store.set(&key, fields, true).await?;

        Ok(SummaryArtifact {
            summary: response.summary,
            comment_count: subject.comment_count,
            updated_at: Utc::now(),
        })
    }

    /// Folds a summary-collection snapshot into the per-subject cache.
    async fn fold_cache(&self, docs: &[Document]) {
        let mut live: HashMap<String, SummaryArtifact> = HashMap::new();
        for doc in docs {
            match self.kind {
                SummaryKind::Post => match doc.decode::<PostSummary>() {
                    Ok(cached) => {
                        live.insert(
                            cached.post_id.clone(),
                            SummaryArtifact {
                                summary: cached.summary,
                                comment_count: None,
                                updated_at: cached.updated_at,
                            },
                        );
                    }
                    Err(error) => warn!(key = %doc.key.path(), %error, "skipping malformed summary"),
                },
                SummaryKind::Thread => match doc.decode::<ThreadSummary>() {
                    Ok(cached) => {
                        live.insert(
                            cached.post_id.clone(),
                            SummaryArtifact {
                                summary: cached.summary,
                                comment_count: Some(cached.comment_count),
                                updated_at: cached.updated_at,
                            },
                        );
                    }
                    Err(error) => warn!(key = %doc.key.path(), %error, "skipping malformed summary"),
                },
            }
        }

        let mut engine = self.inner.lock().await;
        for (post_id, artifact) in &live {
            let entry = engine.subject_mut(post_id);
            entry.cached = Some(artifact.clone());
            if !entry.generating {
                entry.status.send_replace(SummaryStatus::Ready(artifact.clone()));
            }
        }
        // Subjects with no cache left are flipped back to Absent, and the
        // entry itself is dropped once nothing observes it: no in-flight
        // generation, no failure latch, no status subscribers.
        engine.subjects.retain(|post_id, entry| {
            if live.contains_key(post_id) || entry.generating {
                return true;
            }
            if entry.cached.take().is_some() {
                entry.status.send_replace(SummaryStatus::Absent);
            }
            entry.failed_fingerprint.is_some() || entry.status.receiver_count() > 0
        });
    }

    fn cache_is_valid(&self, cached: Option<&SummaryArtifact>, subject: &SubjectSnapshot) -> bool {
        match (self.kind, cached) {
            (_, None) => false,
            (SummaryKind::Post, Some(_)) => true,
            // A thread summary is trusted only while its snapshot still
            // matches the live comment count.
            (SummaryKind::Thread, Some(cached)) => cached.comment_count == subject.comment_count,
        }
    }

    fn auto_trigger(&self, subject: &SubjectSnapshot) -> bool {
        match self.kind {
            SummaryKind::Post => subject.content.chars().count() > self.policy.post_min_chars,
            SummaryKind::Thread => {
                subject.comment_count.unwrap_or(0) >= self.policy.thread_min_comments
            }
        }
    }

    fn fingerprint(&self, subject: &SubjectSnapshot) -> String {
        match self.kind {
            SummaryKind::Post => {
                let mut hasher = Sha256::new();
                hasher.update(subject.content.as_bytes());
                hex::encode(hasher.finalize())
            }
            SummaryKind::Thread => subject.comment_count.unwrap_or(0).to_string(),
        }
    }
}

/// Local extractive fallback: truncation for posts, a count-based blurb for
/// threads. Always configured, never fails.
pub struct ExtractiveSummarizer;

fn truncate_at_word(text: &str, max_chars: usize) -> SummaryResponse {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return SummaryResponse {
            summary: text.to_string(),
            truncated: false,
        };
    }
    let head: String = text.chars().take(max_chars).collect();
    let cut = head.rfind(char::is_whitespace).unwrap_or(head.len());
    SummaryResponse {
        summary: format!("{}…", head[..cut].trim_end()),
        truncated: true,
    }
}

#[async_trait]
impl SummaryProvider for ExtractiveSummarizer {
    fn is_configured(&self) -> bool {
        true
    }

    async fn summarize(&self, request: SummaryRequest) -> Result<SummaryResponse, ProviderError> {
        Ok(match request.subject {
            SummarySubject::Post => truncate_at_word(&request.content, request.max_chars),
            SummarySubject::Thread => {
                let entries: Vec<&str> = request
                    .content
                    .split("\n\n")
                    .filter(|entry| !entry.trim().is_empty())
                    .collect();
                let opening = entries.first().copied().unwrap_or("");
                let opening = truncate_at_word(opening, request.max_chars.saturating_sub(48));
                SummaryResponse {
                    summary: format!(
                        "{} comments so far. The thread opens: {}",
                        entries.len(),
                        opening.summary
                    ),
                    truncated: opening.truncated,
                }
            }
        })
    }
}

/// Explicit two-step provider composition: try the primary; when it is
/// unavailable (no credential), degrade to the extractive summarizer. A
/// primary that is configured but *fails* still surfaces its error.
pub struct FallbackChain {
    primary: Arc<dyn SummaryProvider>,
    fallback: ExtractiveSummarizer,
}

impl FallbackChain {
    pub fn new(primary: Arc<dyn SummaryProvider>) -> Self {
        Self {
            primary,
            fallback: ExtractiveSummarizer,
        }
    }
}

#[async_trait]
impl SummaryProvider for FallbackChain {
    fn is_configured(&self) -> bool {
        true
    }

    async fn summarize(&self, request: SummaryRequest) -> Result<SummaryResponse, ProviderError> {
        if !self.primary.is_configured() {
            debug!("primary summarizer unconfigured, using extractive fallback");
            return self.fallback.summarize(request).await;
        }
        match self.primary.summarize(request.clone()).await {
            Err(ProviderError::Unavailable) => self.fallback.summarize(request).await,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::error::StoreError;
    use domains::feed::{ChangeFeed, Snapshot};
    use domains::ports::{MockSummaryProvider, Txn};

    struct NullStore;

    #[async_trait]
    impl DocumentStore for NullStore {
        async fn get(&self, _key: &DocKey) -> Result<Option<Document>, StoreError> {
            Ok(None)
        }
        async fn set(&self, _key: &DocKey, _fields: Fields, _merge: bool) -> Result<(), StoreError> {
            Ok(())
        }
        async fn update(&self, _key: &DocKey, _fields: Fields) -> Result<(), StoreError> {
            Ok(())
        }
        async fn delete(&self, _key: &DocKey) -> Result<(), StoreError> {
            Ok(())
        }
        async fn add(&self, collection: &str, _fields: Fields) -> Result<DocKey, StoreError> {
            Ok(DocKey::new(collection, "unused"))
        }
        async fn commit(&self, _txn: Txn) -> Result<(), StoreError> {
            Ok(())
        }
        async fn query(&self, _query: Query) -> Result<Vec<Document>, StoreError> {
            Ok(Vec::new())
        }
        async fn watch(&self, _query: Query) -> Result<ChangeFeed, StoreError> {
            let (tx, rx) = watch::channel(Snapshot::default());
            std::mem::forget(tx);
            Ok(ChangeFeed::new(rx, || {}))
        }
    }

    fn summary_doc(post_id: &str) -> Document {
        Document {
            key: DocKey::new(collections::POST_SUMMARIES, post_id),
            rev: 1,
            fields: serde_json::json!({
                "post_id": post_id,
                "summary": "cached",
                "created_at": 1_700_000_000_000_000i64,
                "updated_at": 1_700_000_000_000_000i64,
            })
            .as_object()
            .unwrap()
            .clone(),
        }
    }

    #[tokio::test]
    async fn stale_subjects_without_observers_are_evicted() {
        let orchestrator = SummaryOrchestrator::for_posts(
            Arc::new(NullStore),
            Arc::new(MockSummaryProvider::new()),
            SummaryPolicy::default(),
        );

        orchestrator
            .fold_cache(&[summary_doc("gone"), summary_doc("watched")])
            .await;
        // A live receiver keeps "watched" tracked after its cache disappears.
        let status = orchestrator.status("watched").await;

        orchestrator.fold_cache(&[]).await;

        let engine = orchestrator.inner.lock().await;
        assert!(!engine.subjects.contains_key("gone"));
        assert!(engine.subjects.contains_key("watched"));
        assert_eq!(*status.borrow(), SummaryStatus::Absent);
    }

    fn post_request(content: &str, max_chars: usize) -> SummaryRequest {
        SummaryRequest {
            subject: SummarySubject::Post,
            content: content.to_string(),
            max_chars,
        }
    }

    #[tokio::test]
    async fn extractive_returns_short_posts_verbatim() {
        let response = ExtractiveSummarizer
            .summarize(post_request("short body", 100))
            .await
            .unwrap();
        assert_eq!(response.summary, "short body");
        assert!(!response.truncated);
    }

    #[tokio::test]
    async fn extractive_truncates_long_posts_at_word_boundary() {
        let content = "alpha beta gamma delta epsilon zeta".repeat(4);
        let response = ExtractiveSummarizer
            .summarize(post_request(&content, 40))
            .await
            .unwrap();
        assert!(response.truncated);
        assert!(response.summary.chars().count() <= 41); // cap plus ellipsis
        assert!(response.summary.ends_with('…'));
    }

    #[tokio::test]
    async fn extractive_thread_blurb_counts_entries() {
        let request = SummaryRequest {
            subject: SummarySubject::Thread,
            content: "ann: first\n\nbob: second\n\ncara: third".to_string(),
            max_chars: 200,
        };
        let response = ExtractiveSummarizer.summarize(request).await.unwrap();
        assert!(response.summary.starts_with("3 comments so far."));
        assert!(response.summary.contains("ann: first"));
    }

    #[tokio::test]
    async fn fallback_chain_degrades_only_on_unavailable() {
        let mut unconfigured = MockSummaryProvider::new();
        unconfigured.expect_is_configured().return_const(false);
        unconfigured.expect_summarize().never();
        let chain = FallbackChain::new(Arc::new(unconfigured));
        let response = chain.summarize(post_request("body text", 100)).await.unwrap();
        assert_eq!(response.summary, "body text");

        let mut failing = MockSummaryProvider::new();
        failing.expect_is_configured().return_const(true);
        failing
            .expect_summarize()
            .returning(|_| Err(ProviderError::QuotaExceeded));
        let chain = FallbackChain::new(Arc::new(failing));
        assert!(matches!(
            chain.summarize(post_request("body", 100)).await.unwrap_err(),
            ProviderError::QuotaExceeded
        ));
    }
}
