//! # TypedFeed
//!
//! Decoding layer over `ChangeFeed`: snapshots arrive as raw documents and
//! leave as model values. A malformed document is skipped with a warning
//! instead of failing the whole snapshot.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use tracing::warn;

use domains::feed::{ChangeFeed, Snapshot};

pub struct TypedFeed<T> {
    feed: ChangeFeed,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> TypedFeed<T> {
    pub fn new(feed: ChangeFeed) -> Self {
        Self {
            feed,
            _marker: PhantomData,
        }
    }

    /// Latest known result set, decoded.
    pub fn current(&self) -> Vec<T> {
        Self::decode(&self.feed.current())
    }

    /// Next snapshot, or `None` once the feed is torn down.
    pub async fn next(&mut self) -> Option<Vec<T>> {
        self.feed.next().await.map(|snapshot| Self::decode(&snapshot))
    }

    pub fn unsubscribe(&mut self) {
        self.feed.unsubscribe();
    }

    fn decode(snapshot: &Snapshot) -> Vec<T> {
        snapshot
            .docs
            .iter()
            .filter_map(|doc| match doc.decode::<T>() {
                Ok(value) => Some(value),
                Err(error) => {
                    warn!(key = %doc.key.path(), %error, "skipping malformed document in feed");
                    None
                }
            })
            .collect()
    }
}
