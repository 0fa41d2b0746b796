//! ObjectStore trait and the value types it exchanges
//!
//! The core never talks to a network client directly. Everything it needs
//! from a storage backend goes through [`ObjectStore`], which keeps the
//! engine testable against an in-memory store.

use async_trait::async_trait;
use jiff::Timestamp;
use serde::Serialize;

use crate::error::Result;

/// Hard protocol limit for keys in one batch-delete request
pub const MAX_DELETE_BATCH: usize = 1000;

/// An object entry as returned by a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Full object key
    pub key: String,

    /// Size in bytes
    pub size_bytes: Option<i64>,

    /// ETag with surrounding quotes removed
    pub etag: Option<String>,

    pub last_modified: Option<Timestamp>,
}

impl ObjectInfo {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            size_bytes: None,
            etag: None,
            last_modified: None,
        }
    }
}

/// One page of a paginated listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub items: Vec<ObjectInfo>,

    /// Token for the next page; `None` once the listing is exhausted
    pub next_token: Option<String>,
}

/// Metadata returned by a HEAD request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectMetadata {
    pub etag: Option<String>,
    pub size_bytes: Option<i64>,
    pub last_modified: Option<Timestamp>,
}

/// Per-key failure inside a batch delete, kept verbatim from the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteFailure {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
}

impl std::fmt::Display for DeleteFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{}: {} {}", self.key, code, self.message),
            None => write!(f, "{}: {}", self.key, self.message),
        }
    }
}

/// Outcome of one batch-delete call
#[derive(Debug, Clone, Default)]
pub struct BatchDeleteResult {
    pub deleted: Vec<String>,
    pub errors: Vec<DeleteFailure>,
}

/// Storage backend operations consumed by the engine
///
/// Implementations must be safe for concurrent use; the transfer executor
/// shares one handle across all in-flight items.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch one listing page of keys under `prefix`
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage>;

    /// Server-side copy of a single object
    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        destination_bucket: &str,
        destination_key: &str,
    ) -> Result<()>;

    /// HEAD an object; `Error::NotFound` when it does not exist
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata>;

    /// Delete up to [`MAX_DELETE_BATCH`] keys in one request
    async fn delete_objects(&self, bucket: &str, keys: Vec<String>) -> Result<BatchDeleteResult>;

    /// Download an object's content
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;
}
