//! Image storage collaborator
//!
//! Posts reference images by an opaque blob reference. The core only uploads on
//! post creation and releases the blob when a post is deleted; resolving a
//! download URL is left to whatever renders the image.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{StoreError, StoreResult};

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key` and return the reference to persist
    async fn upload(&self, key: &str, bytes: Vec<u8>) -> StoreResult<String>;

    /// Release a blob; deleting an unknown reference succeeds
    async fn delete(&self, reference: &str) -> StoreResult<()>;

    async fn download_url(&self, reference: &str) -> StoreResult<String>;
}

const REFERENCE_SCHEME: &str = "blob://";

/// In-process [`BlobStore`] for the smoke runner and tests
pub struct MemoryBlobStore {
    base_url: String,
    blobs: DashMap<String, Vec<u8>>,
    fail_deletes: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            blobs: DashMap::new(),
            fail_deletes: AtomicBool::new(false),
        }
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.blobs.contains_key(reference)
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Make every subsequent delete fail
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new("memory://blobs")
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, key: &str, bytes: Vec<u8>) -> StoreResult<String> {
        let reference = format!("{}{}", REFERENCE_SCHEME, key);
        self.blobs.insert(reference.clone(), bytes);
        Ok(reference)
    }

    async fn delete(&self, reference: &str) -> StoreResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!(
                "injected delete fault for {}",
                reference
            )));
        }
        self.blobs.remove(reference);
        Ok(())
    }

    async fn download_url(&self, reference: &str) -> StoreResult<String> {
        if !self.blobs.contains_key(reference) {
            return Err(StoreError::BlobNotFound(reference.to_string()));
        }
        let key = reference.trim_start_matches(REFERENCE_SCHEME);
        Ok(format!("{}/{}", self.base_url.trim_end_matches('/'), key))
    }
}
