//! # Rusty-Forum Binary
//!
//! Composition root: loads settings, wires adapters into the forum
//! aggregate, and runs a short live scenario against the in-process store.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use configs::{Settings, SummaryBackend};
use domains::models::VoteValue;
use domains::ports::{BlobStore, DocumentStore, SummaryProvider};
use services::{ForumAggregate, PostSort, SummaryPolicy, SummaryStatus};
use storage_adapters::{LocalBlobStore, MemoryStore};
use summary_adapters::{GeminiSummarizer, OpenAiSummarizer};

fn select_provider(settings: &Settings) -> Arc<dyn SummaryProvider> {
    let summary = &settings.summary;
    match summary.backend {
        SummaryBackend::Openai => Arc::new(OpenAiSummarizer::new(
            summary.base_url(),
            summary.model(),
            summary.api_key.clone(),
        )),
        SummaryBackend::Gemini => Arc::new(GeminiSummarizer::new(
            summary.base_url(),
            summary.model(),
            summary.api_key.clone(),
        )),
        // Unconfigured provider: auto-generation stays off, manual requests
        // fall back to the local extractive summarizer.
        SummaryBackend::Disabled => {
            Arc::new(OpenAiSummarizer::new(summary.base_url(), summary.model(), None))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::load()?;
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let blobs: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(
        settings.media.root.clone().into(),
        settings.media.url_prefix.clone(),
    ));
    let provider = select_provider(&settings);
    let policy = SummaryPolicy {
        post_min_chars: settings.summary.post_min_chars,
        thread_min_comments: settings.summary.thread_min_comments,
        max_summary_chars: settings.summary.max_summary_chars,
    };

    let forum = ForumAggregate::new(store, blobs, provider, policy).await?;
    info!("rusty-forum core wired, running demo scenario");

    // Two users, one conversation.
    let post_id = forum
        .create_post(
            "alice",
            "Alice",
            "Getting started with sourdough",
            "After three failed starters I finally got a loaf with real oven spring. \
             Keeping the starter warm and feeding it twice a day made the difference.",
            None,
        )
        .await?;

    forum
        .create_comment(&post_id, "bob", "Bob", "What hydration are you using?")
        .await?;
    forum
        .create_comment(&post_id, "alice", "Alice", "Around 75%, rye for the starter.")
        .await?;
    forum
        .create_comment(&post_id, "carol", "Carol", "Trying this tonight, thanks!")
        .await?;

    // Votes: bob upvotes, carol downvotes then switches.
    forum.cast_vote(&post_id, "bob", VoteValue::Up).await?;
    forum.cast_vote(&post_id, "carol", VoteValue::Down).await?;
    forum.cast_vote(&post_id, "carol", VoteValue::Up).await?;

    let mut posts = forum.subscribe_posts();
    posts.wait_for(|posts| !posts.is_empty()).await?;
    for post in forum.posts(None, PostSort::TopScore) {
        info!(
            title = %post.title,
            score = post.net_score(),
            up = post.up_votes,
            down = post.down_votes,
            "live post"
        );
    }

    let detail = forum.post_detail(&post_id, "bob").await?;
    info!(
        score = detail.score,
        comments = detail.comment_count,
        vote = ?detail.user_vote,
        "detail view for bob"
    );

    for notification in forum.notifications("alice").await? {
        info!(kind = ?notification.kind, from = %notification.from_uid, "alice was notified");
    }

    // Manual thread summary; with summaries disabled this exercises the
    // extractive fallback.
    let thread = forum.open_thread(&post_id).await?;
    forum.request_thread_summary(&post_id).await?;
    let mut status = forum.thread_summary_status(&post_id).await;
    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        status.wait_for(|status| {
            matches!(status, SummaryStatus::Ready(_) | SummaryStatus::Failed(_))
        }),
    )
    .await;
    match outcome {
        Ok(Ok(status)) => match &*status {
            SummaryStatus::Ready(artifact) => {
                info!(summary = %artifact.summary, "thread summary ready")
            }
            SummaryStatus::Failed(error) => info!(%error, "thread summary failed"),
            _ => {}
        },
        _ => info!("thread summary did not settle in time"),
    }
    drop(thread);

    info!("demo scenario complete");
    Ok(())
}
