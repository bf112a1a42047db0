//! # LocalBlobStore
//!
//! Local filesystem implementation of `BlobStore`.
//! Content-addressable storage with two-level directory sharding, so
//! identical payloads deduplicate to one file and one URL.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use mime::Mime;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::debug;

use domains::error::BlobError;
use domains::ports::BlobStore;

pub struct LocalBlobStore {
    /// Root directory for all uploads (e.g., "./data/media")
    root: PathBuf,
    /// Public URL prefix (e.g., "/media")
    url_prefix: String,
}

impl LocalBlobStore {
    pub fn new(root: PathBuf, url_prefix: String) -> Self {
        Self { root, url_prefix }
    }

    /// Sharded relative path: "ab/cd/abcdef....ext"
    fn sharded_rel_path(hash: &str, extension: &str) -> String {
        format!("{}/{}/{}.{}", &hash[0..2], &hash[2..4], hash, extension)
    }
}

fn extension_for(content_type: &Mime) -> Result<&'static str, BlobError> {
    if content_type.type_() != mime::IMAGE {
        return Err(BlobError::UnsupportedType(content_type.to_string()));
    }
    let subtype = content_type.subtype();
    if subtype == mime::JPEG {
        Ok("jpg")
    } else if subtype == mime::PNG {
        Ok("png")
    } else if subtype == mime::GIF {
        Ok("gif")
    } else if subtype == "webp" {
        Ok("webp")
    } else {
        Err(BlobError::UnsupportedType(content_type.to_string()))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    /// Saves an upload under its SHA-256 hash and returns the public URL.
    async fn upload(
        &self,
        filename: &str,
        content_type: &Mime,
        data: Bytes,
    ) -> Result<String, BlobError> {
        let extension = extension_for(content_type)?;

        let mut hasher = Sha256::new();
        hasher.update(&data);
        let hash = hex::encode(hasher.finalize());

        let rel_path = Self::sharded_rel_path(&hash, extension);
        let target = self.root.join(&rel_path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        if fs::try_exists(&target).await? {
            debug!(%filename, %hash, "duplicate upload, reusing stored blob");
        } else {
            fs::write(&target, &data).await?;
        }

        Ok(format!("{}/{}", self.url_prefix.trim_end_matches('/'), rel_path))
    }
}
