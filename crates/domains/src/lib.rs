//! rusty-forum/crates/domains/src/lib.rs
//!
//! The central domain logic and interface definitions for Rusty-Forum:
//! document models, store/provider ports, and the ChangeFeed primitive.

pub mod document;
pub mod error;
pub mod feed;
pub mod fields;
pub mod models;
pub mod ports;

// Re-exporting for easier access in other crates
pub use document::{collections, DocKey, Document};
pub use error::{BlobError, ForumError, ProviderError, StoreError, SummaryError};
pub use feed::{ChangeFeed, Snapshot};
pub use fields::{FieldValue, Fields};
pub use models::*;
pub use ports::*;
