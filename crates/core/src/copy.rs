//! Full copies without reconciliation
//!
//! [`copy_by_mask`] copies every key under a prefix with a given suffix.
//! [`copy_prefixes`] and [`copy_common_and_addon`] copy whole folder
//! subtrees, one independent summary per folder: a folder whose listing or
//! copies fail never stops the others.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::listing::{collect_keys, list_child_names};
use crate::matcher::relativize;
use crate::path::{BucketPath, ensure_disjoint};
use crate::progress::Progress;
use crate::sync::validate_workers;
use crate::traits::ObjectStore;
use crate::transfer::{CopyFailure, DEFAULT_MAX_WORKERS, Executor, TransferPair};

/// Options for [`copy_by_mask`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskCopyOptions {
    pub suffix: String,
    pub max_workers: usize,
    pub dry_run: bool,
}

impl Default for MaskCopyOptions {
    fn default() -> Self {
        Self {
            suffix: String::new(),
            max_workers: DEFAULT_MAX_WORKERS,
            dry_run: false,
        }
    }
}

impl MaskCopyOptions {
    pub fn validate(&self) -> Result<()> {
        validate_workers(self.max_workers)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaskCopyStats {
    pub source_bucket: String,
    pub target_bucket: String,
    pub prefix: String,
    pub prefix_dst: String,
    pub suffix: String,
    pub total: usize,
    pub dry_run: bool,
}

/// Result of [`copy_by_mask`]
#[derive(Debug, Clone, Serialize)]
pub struct MaskCopyReport {
    /// Source keys that were copied
    pub copied: Vec<String>,
    pub errors: Vec<CopyFailure>,
    pub stats: MaskCopyStats,
}

impl MaskCopyReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Copy every key under `source` ending with `suffix` to `destination`
///
/// Destination state is not consulted; existing objects are overwritten.
pub async fn copy_by_mask(
    store: &dyn ObjectStore,
    source: &BucketPath,
    destination: &BucketPath,
    options: &MaskCopyOptions,
    progress: Progress<'_>,
) -> Result<MaskCopyReport> {
    options.validate()?;
    ensure_disjoint(source, destination)?;

    let keys = collect_keys(store, source, &options.suffix).await?;
    let pairs: Vec<TransferPair> = relativize(&keys, &source.prefix)
        .iter()
        .map(|relative| TransferPair::for_relative(source, destination, relative))
        .collect();
    let total = pairs.len();

    let outcome = Executor::new(store, options.max_workers)
        .dry_run(options.dry_run)
        .with_progress(progress)
        .copy_many(&source.bucket, &destination.bucket, pairs)
        .await;

    tracing::info!(
        source = %source,
        destination = %destination,
        copied = outcome.succeeded.len(),
        errors = outcome.errors.len(),
        "Copy by mask finished"
    );

    Ok(MaskCopyReport {
        copied: outcome
            .succeeded
            .into_iter()
            .map(|pair| pair.source_key)
            .collect(),
        errors: outcome.errors,
        stats: MaskCopyStats {
            source_bucket: source.bucket.clone(),
            target_bucket: destination.bucket.clone(),
            prefix: source.prefix.clone(),
            prefix_dst: destination.prefix.clone(),
            suffix: options.suffix.clone(),
            total,
            dry_run: options.dry_run,
        },
    })
}

/// Options for folder-level copies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitOptions {
    pub max_workers: usize,
    pub dry_run: bool,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            dry_run: false,
        }
    }
}

impl SplitOptions {
    pub fn validate(&self) -> Result<()> {
        validate_workers(self.max_workers)
    }
}

/// Summary for one copied folder
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrefixCopyReport {
    pub copied: Vec<TransferPair>,
    /// Listing failure or per-object copy failures
    pub errors: Vec<String>,
}

impl PrefixCopyReport {
    pub fn copied_count(&self) -> usize {
        self.copied.len()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}

/// Copy the subtree under `source` to `destination`, capturing every failure
async fn copy_prefix(
    store: &dyn ObjectStore,
    executor: &Executor<'_>,
    source: &BucketPath,
    destination: &BucketPath,
) -> PrefixCopyReport {
    let keys = match collect_keys(store, source, "").await {
        Ok(keys) => keys,
        Err(e) => {
            tracing::warn!(source = %source, error = %e, "Listing folder failed");
            return PrefixCopyReport {
                copied: Vec::new(),
                errors: vec![format!("listing {source} failed: {e}")],
            };
        }
    };

    let pairs = relativize(&keys, &source.prefix)
        .iter()
        .map(|relative| TransferPair::for_relative(source, destination, relative))
        .collect();
    let outcome = executor
        .copy_many(&source.bucket, &destination.bucket, pairs)
        .await;

    PrefixCopyReport {
        copied: outcome.succeeded,
        errors: outcome.errors.iter().map(ToString::to_string).collect(),
    }
}

/// Copy `source_root/<folder>/` to `destination_root/<folder>/` for each folder
pub async fn copy_prefixes(
    store: &dyn ObjectStore,
    source_root: &BucketPath,
    destination_root: &BucketPath,
    folders: &[String],
    options: &SplitOptions,
    progress: Progress<'_>,
) -> Result<BTreeMap<String, PrefixCopyReport>> {
    options.validate()?;
    let source_root = &source_root.as_folder();
    let destination_root = &destination_root.as_folder();
    ensure_disjoint(source_root, destination_root)?;

    let executor = Executor::new(store, options.max_workers)
        .dry_run(options.dry_run)
        .with_progress(progress);

    let mut summary = BTreeMap::new();
    for folder in folders {
        let report = copy_prefix(
            store,
            &executor,
            &source_root.child(folder),
            &destination_root.child(folder),
        )
        .await;
        summary.insert(folder.clone(), report);
    }
    Ok(summary)
}

/// Result of [`copy_common_and_addon`]
#[derive(Debug, Clone, Serialize)]
pub struct SplitReport {
    /// Folders present under both roots
    pub common: BTreeMap<String, PrefixCopyReport>,
    /// Folders present only under the source root
    pub addon: BTreeMap<String, PrefixCopyReport>,
    pub common_count: usize,
    pub addon_count: usize,
    pub dry_run: bool,
}

impl SplitReport {
    pub fn has_errors(&self) -> bool {
        self.common
            .values()
            .chain(self.addon.values())
            .any(|report| !report.errors.is_empty())
    }
}

/// Roots for [`copy_common_and_addon`], all within one bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitRoots {
    pub bucket: String,
    pub src_root: String,
    pub ref_root: String,
    pub common_dst_root: String,
    pub addon_dst_root: String,
}

/// Split the folders under `src_root` by whether `ref_root` has them too
///
/// Folders found under both roots are copied below `common_dst_root`, the
/// rest below `addon_dst_root`.
pub async fn copy_common_and_addon(
    store: &dyn ObjectStore,
    roots: &SplitRoots,
    options: &SplitOptions,
    progress: Progress<'_>,
) -> Result<SplitReport> {
    options.validate()?;
    let folder = |root: &str| BucketPath::new(&roots.bucket, root).as_folder();
    let src_root = folder(&roots.src_root);
    let ref_root = folder(&roots.ref_root);
    let common_root = folder(&roots.common_dst_root);
    let addon_root = folder(&roots.addon_dst_root);
    ensure_disjoint(&src_root, &common_root)?;
    ensure_disjoint(&src_root, &addon_root)?;

    let src_names = list_child_names(store, &src_root).await?;
    let ref_names = list_child_names(store, &ref_root).await?;

    let common: BTreeSet<&String> = src_names.intersection(&ref_names).collect();
    let addon: BTreeSet<&String> = src_names.difference(&ref_names).collect();
    tracing::info!(common = common.len(), addon = addon.len(), "Folder split computed");

    let executor = Executor::new(store, options.max_workers)
        .dry_run(options.dry_run)
        .with_progress(progress);

    let mut report = SplitReport {
        common: BTreeMap::new(),
        addon: BTreeMap::new(),
        common_count: common.len(),
        addon_count: addon.len(),
        dry_run: options.dry_run,
    };

    for name in common {
        let summary = copy_prefix(store, &executor, &src_root.child(name), &common_root.child(name)).await;
        report.common.insert(name.clone(), summary);
    }
    for name in addon {
        let summary = copy_prefix(store, &executor, &src_root.child(name), &addon_root.child(name)).await;
        report.addon.insert(name.clone(), summary);
    }

    Ok(report)
}
