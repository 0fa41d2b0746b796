//! In-memory [`ObjectStore`]
//!
//! Backs the engine's tests and offline demos. Supports pagination, injected
//! failures, call counters and peak-concurrency tracking for copies.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use jiff::Timestamp;

use crate::error::{Error, Result};
use crate::traits::{BatchDeleteResult, DeleteFailure, ListPage, ObjectInfo, ObjectMetadata, ObjectStore};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    etag: String,
    last_modified: Timestamp,
}

#[derive(Debug, Default)]
struct Faults {
    list: Vec<(String, String)>,
    copy: HashSet<String>,
    head: HashSet<String>,
    get: HashSet<String>,
    delete: HashMap<String, (String, String)>,
    delete_requests: HashSet<String>,
}

/// Thread-safe in-memory object store
#[derive(Debug)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<(String, String), StoredObject>>,
    faults: Mutex<Faults>,
    page_size: usize,
    list_calls: AtomicUsize,
    copy_calls: AtomicUsize,
    head_calls: AtomicUsize,
    get_calls: AtomicUsize,
    delete_batches: Mutex<Vec<usize>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_page_size(1000)
    }

    /// Store that returns at most `page_size` keys per listing page
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            faults: Mutex::new(Faults::default()),
            page_size: page_size.max(1),
            list_calls: AtomicUsize::new(0),
            copy_calls: AtomicUsize::new(0),
            head_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            delete_batches: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Insert or replace an object
    pub fn put(&self, bucket: &str, key: &str, data: &[u8]) {
        let object = StoredObject {
            data: data.to_vec(),
            etag: etag_of(data),
            last_modified: Timestamp::now(),
        };
        self.lock_objects()
            .insert((bucket.to_string(), key.to_string()), object);
    }

    pub fn set_last_modified(&self, bucket: &str, key: &str, at: Timestamp) {
        if let Some(object) = self
            .lock_objects()
            .get_mut(&(bucket.to_string(), key.to_string()))
        {
            object.last_modified = at;
        }
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.lock_objects()
            .contains_key(&(bucket.to_string(), key.to_string()))
    }

    pub fn data(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.lock_objects()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.data.clone())
    }

    /// All keys in a bucket, sorted
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock_objects()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    /// Listing requests whose prefix starts with `prefix` fail
    pub fn fail_list(&self, bucket: &str, prefix: &str) {
        self.lock_faults()
            .list
            .push((bucket.to_string(), prefix.to_string()));
    }

    /// Copies whose source key is `key` fail
    pub fn fail_copy(&self, key: &str) {
        self.lock_faults().copy.insert(key.to_string());
    }

    /// HEAD requests for `key` fail with a network error
    pub fn fail_head(&self, key: &str) {
        self.lock_faults().head.insert(key.to_string());
    }

    pub fn fail_get(&self, key: &str) {
        self.lock_faults().get.insert(key.to_string());
    }

    /// Batch deletes report `key` as failed with the given code and message
    pub fn fail_delete(&self, key: &str, code: &str, message: &str) {
        self.lock_faults()
            .delete
            .insert(key.to_string(), (code.to_string(), message.to_string()));
    }

    /// Whole batch-delete requests against `bucket` fail
    pub fn fail_delete_requests(&self, bucket: &str) {
        self.lock_faults().delete_requests.insert(bucket.to_string());
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn copy_calls(&self) -> usize {
        self.copy_calls.load(Ordering::SeqCst)
    }

    pub fn head_calls(&self) -> usize {
        self.head_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// Sizes of every batch-delete request, in issue order
    pub fn delete_batch_sizes(&self) -> Vec<usize> {
        self.delete_batches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of mutating requests (copies and batch deletes)
    pub fn mutation_count(&self) -> usize {
        self.copy_calls() + self.delete_batch_sizes().len()
    }

    /// Highest number of copies observed running at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn lock_objects(&self) -> std::sync::MutexGuard<'_, BTreeMap<(String, String), StoredObject>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn etag_of(data: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    data.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .lock_faults()
            .list
            .iter()
            .any(|(b, p)| b == bucket && prefix.starts_with(p.as_str()));
        if failing {
            return Err(Error::Network(format!("listing s3://{bucket}/{prefix} failed")));
        }

        let objects = self.lock_objects();
        let mut matching = objects
            .iter()
            .filter(|((b, k), _)| b == bucket && k.starts_with(prefix))
            .filter(|((_, k), _)| continuation_token.as_ref().is_none_or(|t| k > t));

        let items: Vec<ObjectInfo> = matching
            .by_ref()
            .take(self.page_size)
            .map(|((_, key), object)| ObjectInfo {
                key: key.clone(),
                size_bytes: Some(object.data.len() as i64),
                etag: Some(object.etag.clone()),
                last_modified: Some(object.last_modified),
            })
            .collect();

        let next_token = match matching.next() {
            Some(_) => items.last().map(|info| info.key.clone()),
            None => None,
        };

        Ok(ListPage { items, next_token })
    }

    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        destination_bucket: &str,
        destination_key: &str,
    ) -> Result<()> {
        self.copy_calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);

        // let sibling copies start before this one completes
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        let result = if self.lock_faults().copy.contains(source_key) {
            Err(Error::Service {
                code: "InternalError".to_string(),
                message: format!("injected copy failure for {source_key}"),
            })
        } else {
            let mut objects = self.lock_objects();
            match objects
                .get(&(source_bucket.to_string(), source_key.to_string()))
                .cloned()
            {
                Some(mut object) => {
                    object.last_modified = Timestamp::now();
                    objects.insert(
                        (destination_bucket.to_string(), destination_key.to_string()),
                        object,
                    );
                    Ok(())
                }
                None => Err(Error::NotFound(format!("s3://{source_bucket}/{source_key}"))),
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        if self.lock_faults().head.contains(key) {
            return Err(Error::Network(format!("HEAD s3://{bucket}/{key} timed out")));
        }
        self.lock_objects()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|object| ObjectMetadata {
                etag: Some(object.etag.clone()),
                size_bytes: Some(object.data.len() as i64),
                last_modified: Some(object.last_modified),
            })
            .ok_or_else(|| Error::NotFound(format!("s3://{bucket}/{key}")))
    }

    async fn delete_objects(&self, bucket: &str, keys: Vec<String>) -> Result<BatchDeleteResult> {
        self.delete_batches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(keys.len());

        let faults = self.lock_faults();
        if faults.delete_requests.contains(bucket) {
            return Err(Error::Network(format!("batch delete on {bucket} failed")));
        }

        let mut result = BatchDeleteResult::default();
        let mut objects = self.lock_objects();
        for key in keys {
            if let Some((code, message)) = faults.delete.get(&key) {
                result.errors.push(DeleteFailure {
                    key,
                    code: Some(code.clone()),
                    message: message.clone(),
                });
            } else {
                objects.remove(&(bucket.to_string(), key.clone()));
                result.deleted.push(key);
            }
        }
        Ok(result)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.lock_faults().get.contains(key) {
            return Err(Error::Network(format!("GET s3://{bucket}/{key} failed")));
        }
        self.data(bucket, key)
            .ok_or_else(|| Error::NotFound(format!("s3://{bucket}/{key}")))
    }
}
