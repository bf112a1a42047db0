//! Shared fixtures for the scenario tests: a wired forum over the
//! in-process store, and scripted summary providers.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use mime::Mime;
use tokio::sync::Semaphore;

use domains::error::{BlobError, ProviderError};
use domains::models::Comment;
use domains::ports::{BlobStore, SummaryProvider, SummaryRequest, SummaryResponse};
use services::{ForumAggregate, SummaryPolicy};
use storage_adapters::MemoryStore;

/// Generous upper bound for waiting on spawned generation/feed tasks.
pub const WAIT: Duration = Duration::from_secs(5);

/// Blob stub: records nothing, answers with a deterministic URL.
pub struct StubBlobStore;

#[async_trait]
impl BlobStore for StubBlobStore {
    async fn upload(
        &self,
        filename: &str,
        _content_type: &Mime,
        _data: Bytes,
    ) -> Result<String, BlobError> {
        Ok(format!("/media/{filename}"))
    }
}

/// Scripted `SummaryProvider`: counts calls and can be unconfigured,
/// failing, or gated on a semaphore to hold generation in flight.
pub struct ScriptedProvider {
    calls: AtomicUsize,
    configured: bool,
    fail: bool,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedProvider {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            configured: true,
            fail: false,
            gate: None,
        })
    }

    pub fn unconfigured() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            configured: false,
            fail: false,
            gate: None,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            configured: true,
            fail: true,
            gate: None,
        })
    }

    /// Each summarize call consumes one permit; tests release the gate with
    /// `gate.add_permits(1)`.
    pub fn gated(gate: Arc<Semaphore>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            configured: true,
            fail: false,
            gate: Some(gate),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SummaryProvider for ScriptedProvider {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn summarize(&self, request: SummaryRequest) -> Result<SummaryResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| ProviderError::Request("gate closed".into()))?;
            permit.forget();
        }
        if self.fail {
            return Err(ProviderError::QuotaExceeded);
        }
        Ok(SummaryResponse {
            summary: format!("scripted summary of {} chars", request.content.chars().count()),
            truncated: false,
        })
    }
}

/// A forum wired over a shared in-process store, with the store kept
/// around for direct document assertions.
pub struct TestBed {
    pub store: MemoryStore,
    pub forum: ForumAggregate,
}

pub async fn forum_with(provider: Arc<dyn SummaryProvider>, policy: SummaryPolicy) -> TestBed {
    let store = MemoryStore::new();
    let forum = ForumAggregate::new(
        Arc::new(store.clone()),
        Arc::new(StubBlobStore),
        provider,
        policy,
    )
    .await
    .expect("forum wiring");
    TestBed { store, forum }
}

pub async fn forum() -> TestBed {
    forum_with(ScriptedProvider::ok(), SummaryPolicy::default()).await
}

/// Synthetic comments for driving trigger evaluation directly.
pub fn make_comments(post_id: &str, n: usize) -> Vec<Comment> {
    (0..n)
        .map(|i| Comment {
            id: format!("c{i}"),
            post_id: post_id.to_string(),
            uid: format!("user-{i}"),
            author: format!("User {i}"),
            content: format!("comment number {i} with a little substance"),
            created_at: Utc::now(),
        })
        .collect()
}
