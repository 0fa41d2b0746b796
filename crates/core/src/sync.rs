//! Mirror-sync between two locations
//!
//! Lists both sides, reconciles them, copies what is missing or changed and,
//! when asked, deletes destination objects that no longer exist at the
//! source. The copy phase is fully drained before the delete phase starts.

use serde::{Deserialize, Serialize};

use crate::compare::{Comparator, ComparisonMode};
use crate::error::{Error, Result};
use crate::listing::collect_keys;
use crate::matcher::{Matcher, relativize};
use crate::path::{BucketPath, ensure_disjoint};
use crate::progress::Progress;
use crate::traits::{DeleteFailure, MAX_DELETE_BATCH, ObjectStore};
use crate::transfer::{CopyFailure, DEFAULT_MAX_WORKERS, Executor, TransferPair};

/// Options for [`sync`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    pub compare_mode: ComparisonMode,
    /// Delete destination objects missing at the source
    pub delete_extra: bool,
    pub dry_run: bool,
    pub max_workers: usize,
    pub delete_batch_size: usize,
    /// Globs on the relative key; empty means everything
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            compare_mode: ComparisonMode::Name,
            delete_extra: false,
            dry_run: false,
            max_workers: DEFAULT_MAX_WORKERS,
            delete_batch_size: MAX_DELETE_BATCH,
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

impl SyncOptions {
    pub fn validate(&self) -> Result<()> {
        validate_workers(self.max_workers)?;
        validate_batch_size(self.delete_batch_size)
    }
}

pub(crate) fn validate_workers(max_workers: usize) -> Result<()> {
    if max_workers == 0 {
        return Err(Error::Config("max_workers must be at least 1".to_string()));
    }
    Ok(())
}

pub(crate) fn validate_batch_size(batch_size: usize) -> Result<()> {
    if !(1..=MAX_DELETE_BATCH).contains(&batch_size) {
        return Err(Error::Config(format!(
            "delete_batch_size must be between 1 and {MAX_DELETE_BATCH}, got {batch_size}"
        )));
    }
    Ok(())
}

/// Counters and settings of one sync run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub source_bucket: String,
    pub target_bucket: String,
    pub prefix_src: String,
    pub prefix_dst: String,
    pub compare_mode: ComparisonMode,
    pub delete_extra: bool,
    pub dry_run: bool,
    pub total_src: usize,
    pub total_dst: usize,
    pub to_copy: usize,
    pub to_delete: usize,
    pub unchanged: usize,
}

/// Result of [`sync`]
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub copied: Vec<TransferPair>,
    /// Deleted destination keys
    pub deleted: Vec<String>,
    pub errors_copy: Vec<CopyFailure>,
    pub errors_delete: Vec<DeleteFailure>,
    pub stats: SyncStats,
}

impl SyncReport {
    pub fn has_errors(&self) -> bool {
        !self.errors_copy.is_empty() || !self.errors_delete.is_empty()
    }
}

/// Make `destination` mirror `source`
///
/// Fails before any request when the options are invalid or the two
/// locations overlap, and before any mutation when a listing fails.
/// Per-object failures are reported, never raised.
pub async fn sync(
    store: &dyn ObjectStore,
    source: &BucketPath,
    destination: &BucketPath,
    options: &SyncOptions,
    progress: Progress<'_>,
) -> Result<SyncReport> {
    options.validate()?;
    ensure_disjoint(source, destination)?;
    let matcher = Matcher::new(&options.include, &options.exclude)?;

    let source_keys = collect_keys(store, source, "").await?;
    let destination_keys = collect_keys(store, destination, "").await?;

    let mut source_rel = relativize(&source_keys, &source.prefix);
    let mut destination_rel = relativize(&destination_keys, &destination.prefix);
    source_rel.retain(|key| matcher.is_match(key));
    destination_rel.retain(|key| matcher.is_match(key));

    let plan = Comparator::new(store, source, destination)
        .max_workers(options.max_workers)
        .with_progress(progress)
        .reconcile(
            &source_rel,
            &destination_rel,
            options.compare_mode,
            options.delete_extra,
        )
        .await;

    tracing::info!(
        source = %source,
        destination = %destination,
        mode = %options.compare_mode,
        to_copy = plan.to_copy.len(),
        to_delete = plan.to_delete.len(),
        unchanged = plan.unchanged.len(),
        dry_run = options.dry_run,
        "Sync plan ready"
    );

    let executor = Executor::new(store, options.max_workers)
        .dry_run(options.dry_run)
        .with_progress(progress);

    let pairs = plan
        .to_copy
        .iter()
        .map(|relative| TransferPair::for_relative(source, destination, relative))
        .collect();
    let copy = executor
        .copy_many(&source.bucket, &destination.bucket, pairs)
        .await;

    let delete_keys: Vec<String> = plan
        .to_delete
        .iter()
        .map(|relative| destination.join(relative))
        .collect();
    let delete = if delete_keys.is_empty() {
        Default::default()
    } else {
        executor
            .delete_many(&destination.bucket, delete_keys, options.delete_batch_size)
            .await
    };

    Ok(SyncReport {
        copied: copy.succeeded,
        deleted: delete.deleted,
        errors_copy: copy.errors,
        errors_delete: delete.errors,
        stats: SyncStats {
            source_bucket: source.bucket.clone(),
            target_bucket: destination.bucket.clone(),
            prefix_src: source.prefix.clone(),
            prefix_dst: destination.prefix.clone(),
            compare_mode: options.compare_mode,
            delete_extra: options.delete_extra,
            dry_run: options.dry_run,
            total_src: source_keys.len(),
            total_dst: destination_keys.len(),
            to_copy: plan.to_copy.len(),
            to_delete: plan.to_delete.len(),
            unchanged: plan.unchanged.len(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[test]
    fn test_options_validation() {
        assert!(SyncOptions::default().validate().is_ok());

        let no_workers = SyncOptions {
            max_workers: 0,
            ..Default::default()
        };
        assert!(matches!(no_workers.validate(), Err(Error::Config(_))));

        let huge_batch = SyncOptions {
            delete_batch_size: 1001,
            ..Default::default()
        };
        assert!(huge_batch.validate().is_err());
    }

    #[tokio::test]
    async fn test_overlap_rejected_before_listing() {
        let store = MemoryStore::new();
        let result = sync(
            &store,
            &BucketPath::new("x", "data/"),
            &BucketPath::new("x", "data/sub/"),
            &SyncOptions::default(),
            None,
        )
        .await;

        assert!(matches!(result, Err(Error::Config(_))));
        assert_eq!(store.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_listing_failure_aborts_before_mutation() {
        let store = MemoryStore::new();
        store.put("src", "a", b"1");
        store.fail_list("dst", "");

        let result = sync(
            &store,
            &BucketPath::new("src", ""),
            &BucketPath::new("dst", ""),
            &SyncOptions::default(),
            None,
        )
        .await;

        assert!(matches!(result, Err(Error::Network(_))));
        assert_eq!(store.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_excluded_destination_objects_survive() {
        let store = MemoryStore::new();
        store.put("src", "a.txt", b"1");
        store.put("dst", "keep/local.txt", b"2");
        store.put("dst", "stale.txt", b"3");

        let options = SyncOptions {
            delete_extra: true,
            exclude: vec!["keep/*".to_string()],
            ..Default::default()
        };
        let report = sync(
            &store,
            &BucketPath::new("src", ""),
            &BucketPath::new("dst", ""),
            &options,
            None,
        )
        .await
        .unwrap();

        assert_eq!(report.deleted, vec!["stale.txt"]);
        assert!(store.contains("dst", "keep/local.txt"));
        assert!(store.contains("dst", "a.txt"));
    }
}
