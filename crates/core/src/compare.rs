//! Three-way reconciliation of two relative key sets
//!
//! `to_copy` holds keys missing at the destination, plus (for metadata
//! modes) keys present on both sides whose metadata differs. `to_delete`
//! holds destination-only keys and is only filled when extra-object deletion
//! was requested.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use crate::path::BucketPath;
use crate::progress::{self, Phase, Progress};
use crate::traits::{ObjectMetadata, ObjectStore};

/// How objects present on both sides are judged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonMode {
    /// Presence only: a key on both sides is never re-copied
    #[default]
    Name,
    /// Re-copy when ETags differ
    ETag,
    /// Re-copy when sizes differ
    Size,
}

impl ComparisonMode {
    /// Whether this mode needs HEAD metadata for keys on both sides
    pub fn needs_metadata(self) -> bool {
        !matches!(self, ComparisonMode::Name)
    }
}

impl fmt::Display for ComparisonMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonMode::Name => write!(f, "name"),
            ComparisonMode::ETag => write!(f, "etag"),
            ComparisonMode::Size => write!(f, "size"),
        }
    }
}

impl FromStr for ComparisonMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "name" | "key" => Ok(ComparisonMode::Name),
            "etag" => Ok(ComparisonMode::ETag),
            "size" => Ok(ComparisonMode::Size),
            _ => Err(format!("Invalid comparison mode: {s} (expected name, etag or size)")),
        }
    }
}

/// Outcome of a reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub to_copy: BTreeSet<String>,
    pub to_delete: BTreeSet<String>,
    pub unchanged: BTreeSet<String>,
}

/// Presence-only diff
pub fn diff_by_name(source: &BTreeSet<String>, destination: &BTreeSet<String>, delete_extra: bool) -> Plan {
    Plan {
        to_copy: source.difference(destination).cloned().collect(),
        to_delete: if delete_extra {
            destination.difference(source).cloned().collect()
        } else {
            BTreeSet::new()
        },
        unchanged: source.intersection(destination).cloned().collect(),
    }
}

/// Whether two metadata lookups disagree under `mode`
///
/// Lookups that failed on both sides compare equal and the key is left
/// alone; a failure on only one side counts as a difference.
pub fn metadata_differs(
    mode: ComparisonMode,
    source: Option<&ObjectMetadata>,
    destination: Option<&ObjectMetadata>,
) -> bool {
    match (source, destination) {
        (None, None) => false,
        (Some(_), None) | (None, Some(_)) => true,
        (Some(src), Some(dst)) => match mode {
            ComparisonMode::Name => false,
            ComparisonMode::ETag => src.etag != dst.etag,
            ComparisonMode::Size => src.size_bytes != dst.size_bytes,
        },
    }
}

/// HEAD an object, downgrading any failure to `None`
pub async fn fetch_metadata(store: &dyn ObjectStore, bucket: &str, key: &str) -> Option<ObjectMetadata> {
    match store.head_object(bucket, key).await {
        Ok(meta) => Some(meta),
        Err(e) => {
            tracing::debug!(bucket, key, error = %e, "Metadata unavailable");
            None
        }
    }
}

/// Reconciles two locations of the same store
pub struct Comparator<'a> {
    store: &'a dyn ObjectStore,
    source: &'a BucketPath,
    destination: &'a BucketPath,
    max_workers: usize,
    progress: Progress<'a>,
}

impl<'a> Comparator<'a> {
    pub fn new(store: &'a dyn ObjectStore, source: &'a BucketPath, destination: &'a BucketPath) -> Self {
        Self {
            store,
            source,
            destination,
            max_workers: crate::transfer::DEFAULT_MAX_WORKERS,
            progress: None,
        }
    }

    /// Bound for concurrent HEAD requests
    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_progress(mut self, progress: Progress<'a>) -> Self {
        self.progress = progress;
        self
    }

    /// Compute the plan for the given relative key sets
    pub async fn reconcile(
        &self,
        source_keys: &BTreeSet<String>,
        destination_keys: &BTreeSet<String>,
        mode: ComparisonMode,
        delete_extra: bool,
    ) -> Plan {
        let mut plan = diff_by_name(source_keys, destination_keys, delete_extra);
        if !mode.needs_metadata() {
            return plan;
        }

        let common = std::mem::take(&mut plan.unchanged);
        progress::started(self.progress, Phase::Compare, common.len());

        let mut checks = stream::iter(common)
            .map(|relative| async move {
                let source_key = self.source.join(&relative);
                let destination_key = self.destination.join(&relative);
                let (src, dst) = futures::join!(
                    fetch_metadata(self.store, &self.source.bucket, &source_key),
                    fetch_metadata(self.store, &self.destination.bucket, &destination_key),
                );
                let changed = metadata_differs(mode, src.as_ref(), dst.as_ref());
                (relative, changed)
            })
            .buffer_unordered(self.max_workers);

        while let Some((relative, changed)) = checks.next().await {
            progress::finished_item(self.progress, Phase::Compare, &relative, true);
            if changed {
                tracing::debug!(key = %relative, mode = %mode, "Changed since last copy");
                plan.to_copy.insert(relative);
            } else {
                plan.unchanged.insert(relative);
            }
        }

        progress::finished(self.progress, Phase::Compare);
        plan
    }
}
