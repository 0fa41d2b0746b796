//! Bounded-parallel copy and batch-delete execution
//!
//! Every submitted item runs to completion or failure on its own; one failure
//! never cancels its siblings. Results are drained in completion order and
//! sorted afterwards so reports are reproducible.

use std::fmt;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::path::BucketPath;
use crate::progress::{self, Phase, Progress};
use crate::traits::{DeleteFailure, MAX_DELETE_BATCH, ObjectStore};

/// Default size of the per-operation worker pool
pub const DEFAULT_MAX_WORKERS: usize = 8;

/// One unit of copy work
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TransferPair {
    pub source_key: String,
    pub destination_key: String,
}

impl TransferPair {
    pub fn new(source_key: impl Into<String>, destination_key: impl Into<String>) -> Self {
        Self {
            source_key: source_key.into(),
            destination_key: destination_key.into(),
        }
    }

    /// Re-prefix a relative key on both sides
    pub fn for_relative(source: &BucketPath, destination: &BucketPath, relative: &str) -> Self {
        Self::new(source.join(relative), destination.join(relative))
    }
}

/// A copy that did not complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyFailure {
    pub source_key: String,
    pub destination_key: String,
    pub message: String,
}

impl fmt::Display for CopyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}: {}",
            self.source_key, self.destination_key, self.message
        )
    }
}

/// Result of [`Executor::copy_many`]
#[derive(Debug, Clone, Default)]
pub struct CopyOutcome {
    /// Completed pairs, sorted by source key
    pub succeeded: Vec<TransferPair>,
    pub errors: Vec<CopyFailure>,
}

/// Result of [`Executor::delete_many`]
#[derive(Debug, Clone, Default)]
pub struct DeleteOutcome {
    /// Deleted keys, sorted
    pub deleted: Vec<String>,
    pub errors: Vec<DeleteFailure>,
    /// Number of batch-delete requests issued
    pub batches: usize,
}

/// Runs copy and delete work over a bounded pool
///
/// Each executor is created for one operation and dropped with it.
#[derive(Clone, Copy)]
pub struct Executor<'a> {
    store: &'a dyn ObjectStore,
    max_workers: usize,
    dry_run: bool,
    progress: Progress<'a>,
}

impl<'a> Executor<'a> {
    pub fn new(store: &'a dyn ObjectStore, max_workers: usize) -> Self {
        Self {
            store,
            max_workers: max_workers.max(1),
            dry_run: false,
            progress: None,
        }
    }

    /// Plan only: report every item as done without touching the store
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_progress(mut self, progress: Progress<'a>) -> Self {
        self.progress = progress;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Server-side copy every pair from `source_bucket` to `destination_bucket`
    pub async fn copy_many(
        &self,
        source_bucket: &str,
        destination_bucket: &str,
        pairs: Vec<TransferPair>,
    ) -> CopyOutcome {
        progress::started(self.progress, Phase::Copy, pairs.len());
        let mut outcome = CopyOutcome::default();

        if self.dry_run {
            for pair in &pairs {
                progress::finished_item(self.progress, Phase::Copy, &pair.source_key, true);
            }
            outcome.succeeded = pairs;
        } else {
            let store = self.store;
            let mut results = stream::iter(pairs)
                .map(|pair| async move {
                    let result = store
                        .copy_object(
                            source_bucket,
                            &pair.source_key,
                            destination_bucket,
                            &pair.destination_key,
                        )
                        .await;
                    (pair, result)
                })
                .buffer_unordered(self.max_workers);

            while let Some((pair, result)) = results.next().await {
                match result {
                    Ok(()) => {
                        tracing::debug!(
                            source = %pair.source_key,
                            destination = %pair.destination_key,
                            "Copied"
                        );
                        progress::finished_item(self.progress, Phase::Copy, &pair.source_key, true);
                        outcome.succeeded.push(pair);
                    }
                    Err(e) => {
                        tracing::warn!(
                            source = %pair.source_key,
                            destination = %pair.destination_key,
                            error = %e,
                            "Copy failed"
                        );
                        progress::finished_item(self.progress, Phase::Copy, &pair.source_key, false);
                        outcome.errors.push(CopyFailure {
                            source_key: pair.source_key,
                            destination_key: pair.destination_key,
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        outcome.succeeded.sort();
        outcome.errors.sort_by(|a, b| a.source_key.cmp(&b.source_key));
        progress::finished(self.progress, Phase::Copy);
        outcome
    }

    /// Delete keys in batches of at most `batch_size` (clamped to 1..=1000)
    pub async fn delete_many(&self, bucket: &str, keys: Vec<String>, batch_size: usize) -> DeleteOutcome {
        progress::started(self.progress, Phase::Delete, keys.len());
        let mut outcome = DeleteOutcome::default();

        if self.dry_run {
            for key in &keys {
                progress::finished_item(self.progress, Phase::Delete, key, true);
            }
            outcome.deleted = keys;
        } else {
            let batch_size = batch_size.clamp(1, MAX_DELETE_BATCH);
            let batches: Vec<Vec<String>> = keys.chunks(batch_size).map(<[String]>::to_vec).collect();
            outcome.batches = batches.len();

            let store = self.store;
            let mut results = stream::iter(batches)
                .map(|batch| async move {
                    let result = store.delete_objects(bucket, batch.clone()).await;
                    (batch, result)
                })
                .buffer_unordered(self.max_workers);

            while let Some((batch, result)) = results.next().await {
                match result {
                    Ok(response) => {
                        tracing::debug!(
                            bucket,
                            deleted = response.deleted.len(),
                            failed = response.errors.len(),
                            "Batch delete finished"
                        );
                        for key in &response.deleted {
                            progress::finished_item(self.progress, Phase::Delete, key, true);
                        }
                        for failure in &response.errors {
                            tracing::warn!(key = %failure.key, code = ?failure.code, "Delete failed");
                            progress::finished_item(self.progress, Phase::Delete, &failure.key, false);
                        }
                        outcome.deleted.extend(response.deleted);
                        outcome.errors.extend(response.errors);
                    }
                    Err(e) => {
                        tracing::warn!(bucket, keys = batch.len(), error = %e, "Batch delete request failed");
                        let code = e.code().map(str::to_string);
                        let message = e.to_string();
                        for key in batch {
                            progress::finished_item(self.progress, Phase::Delete, &key, false);
                            outcome.errors.push(DeleteFailure {
                                key,
                                code: code.clone(),
                                message: message.clone(),
                            });
                        }
                    }
                }
            }
        }

        outcome.deleted.sort();
        outcome.errors.sort_by(|a, b| a.key.cmp(&b.key));
        progress::finished(self.progress, Phase::Delete);
        outcome
    }
}
