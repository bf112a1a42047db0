//! # Core Traits (Ports)
//!
//! Any adapter must implement these traits to be used by the services layer.

use async_trait::async_trait;
use bytes::Bytes;
use mime::Mime;
use serde_json::Value;

use crate::document::{DocKey, Document};
use crate::error::{BlobError, ProviderError, StoreError};
use crate::feed::ChangeFeed;
use crate::fields::Fields;

/// Equality filter on a single field.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub equals: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Single-field ordering; defaults to creation time ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl Default for OrderBy {
    fn default() -> Self {
        Self {
            field: "created_at".to_string(),
            direction: Direction::Ascending,
        }
    }
}

/// A collection query: optional equality filters plus one ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: OrderBy,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            order_by: OrderBy::default(),
        }
    }

    pub fn filter(mut self, field: impl Into<String>, equals: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            equals: equals.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = OrderBy {
            field: field.into(),
            direction,
        };
        self
    }
}

/// Precondition checked atomically at commit time. Any failed guard aborts
/// the whole transaction with `StoreError::TxnConflict` and applies nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum TxnGuard {
    Exists(DocKey),
    NotExists(DocKey),
    /// Document exists and was last written at exactly this revision.
    RevMatches(DocKey, u64),
}

/// One write inside a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum TxnOp {
    Set {
        key: DocKey,
        fields: Fields,
        /// `true` upserts field-wise; `false` replaces the whole document.
        merge: bool,
    },
    Update {
        key: DocKey,
        fields: Fields,
    },
    Delete {
        key: DocKey,
    },
}

/// An atomic multi-document conditional write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Txn {
    pub guards: Vec<TxnGuard>,
    pub ops: Vec<TxnOp>,
}

impl Txn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn guard(mut self, guard: TxnGuard) -> Self {
        self.guards.push(guard);
        self
    }

    pub fn set(mut self, key: DocKey, fields: Fields, merge: bool) -> Self {
        self.ops.push(TxnOp::Set { key, fields, merge });
        self
    }

    pub fn update(mut self, key: DocKey, fields: Fields) -> Self {
        self.ops.push(TxnOp::Update { key, fields });
        self
    }

    pub fn delete(mut self, key: DocKey) -> Self {
        self.ops.push(TxnOp::Delete { key });
        self
    }
}

/// Data persistence contract: atomic document operations, server-assigned
/// timestamps/increments via `Fields` sentinels, and live queries.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, key: &DocKey) -> Result<Option<Document>, StoreError>;

    /// Writes a document. `merge = true` upserts field-wise; `merge = false`
    /// replaces any existing content.
    async fn set(&self, key: &DocKey, fields: Fields, merge: bool) -> Result<(), StoreError>;

    /// Mutates an existing document; `NotFound` when the key is absent.
    async fn update(&self, key: &DocKey, fields: Fields) -> Result<(), StoreError>;

    /// Idempotent; deleting a missing document succeeds.
    async fn delete(&self, key: &DocKey) -> Result<(), StoreError>;

    /// Creates a document under a store-assigned time-ordered id.
    async fn add(&self, collection: &str, fields: Fields) -> Result<DocKey, StoreError>;

    /// Commits a guarded multi-document transaction atomically against
    /// concurrent writers.
    async fn commit(&self, txn: Txn) -> Result<(), StoreError>;

    /// One-shot query.
    async fn query(&self, query: Query) -> Result<Vec<Document>, StoreError>;

    /// Live query; see `ChangeFeed` for delivery and teardown semantics.
    async fn watch(&self, query: Query) -> Result<ChangeFeed, StoreError>;
}

/// Content-addressable media storage contract.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores the payload and returns a durable retrieval URL. Identical
    /// payloads deduplicate to the same URL.
    async fn upload(
        &self,
        filename: &str,
        content_type: &Mime,
        data: Bytes,
    ) -> Result<String, BlobError>;
}

/// What is being summarized; providers may prompt differently per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummarySubject {
    Post,
    Thread,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRequest {
    pub subject: SummarySubject,
    pub content: String,
    pub max_chars: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryResponse {
    pub summary: String,
    pub truncated: bool,
}

/// External summary generation contract. Two wire-incompatible providers
/// adapt to this one shape; an unconfigured provider reports `Unavailable`
/// without attempting a call.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SummaryProvider: Send + Sync {
    /// Whether a usable credential is present. Auto-generation is gated on
    /// this; it must never require a network round trip.
    fn is_configured(&self) -> bool;

    async fn summarize(&self, request: SummaryRequest) -> Result<SummaryResponse, ProviderError>;
}
