//! rusty-forum/crates/storage-adapters/src/lib.rs
//!
//! Driven adapters for the persistence ports: an in-process document store
//! and a local content-addressed blob store.

pub mod media_local;
pub mod memory;

pub use media_local::LocalBlobStore;
pub use memory::MemoryStore;
