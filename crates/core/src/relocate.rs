//! Move: copy everything, then delete only what was copied
//!
//! A source object is deleted only after its own copy succeeded, and only
//! once the whole copy phase has drained. Each source key walks the
//! [`MoveState`] machine; copy failures are terminal.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::listing::collect_keys;
use crate::matcher::relativize;
use crate::path::{BucketPath, ensure_disjoint};
use crate::progress::Progress;
use crate::sync::{validate_batch_size, validate_workers};
use crate::traits::{DeleteFailure, MAX_DELETE_BATCH, ObjectStore};
use crate::transfer::{CopyFailure, DEFAULT_MAX_WORKERS, Executor, TransferPair};

/// Options for [`move_objects`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoveOptions {
    /// Only keys ending with this suffix are moved
    pub suffix: String,
    pub max_workers: usize,
    pub delete_batch_size: usize,
    pub dry_run: bool,
}

impl Default for MoveOptions {
    fn default() -> Self {
        Self {
            suffix: String::new(),
            max_workers: DEFAULT_MAX_WORKERS,
            delete_batch_size: MAX_DELETE_BATCH,
            dry_run: false,
        }
    }
}

impl MoveOptions {
    pub fn validate(&self) -> Result<()> {
        validate_workers(self.max_workers)?;
        validate_batch_size(self.delete_batch_size)
    }
}

/// Lifecycle of one source key during a move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveState {
    Pending,
    Copying,
    CopyFailed,
    /// Copied; waiting for the delete phase
    PendingDelete,
    Deleted,
    DeleteFailed,
}

impl MoveState {
    pub fn can_advance_to(self, next: MoveState) -> bool {
        use MoveState::*;
        matches!(
            (self, next),
            (Pending, Copying)
                | (Copying, CopyFailed)
                | (Copying, PendingDelete)
                | (PendingDelete, Deleted)
                | (PendingDelete, DeleteFailed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MoveState::CopyFailed | MoveState::Deleted | MoveState::DeleteFailed
        )
    }
}

/// Per-key state tracking for one move
#[derive(Debug, Clone, Default)]
struct Ledger {
    states: BTreeMap<String, MoveState>,
}

impl Ledger {
    fn new<'k>(keys: impl IntoIterator<Item = &'k String>) -> Self {
        Self {
            states: keys
                .into_iter()
                .map(|key| (key.clone(), MoveState::Pending))
                .collect(),
        }
    }

    fn advance(&mut self, key: &str, next: MoveState) {
        match self.states.get_mut(key) {
            Some(state) if state.can_advance_to(next) => *state = next,
            Some(state) => {
                tracing::warn!(key, from = ?*state, to = ?next, "Ignoring invalid move transition");
            }
            None => tracing::warn!(key, "Move transition for unknown key"),
        }
    }

    fn advance_all(&mut self, next: MoveState) {
        let keys: Vec<String> = self.states.keys().cloned().collect();
        for key in keys {
            self.advance(&key, next);
        }
    }
}

/// Counters and settings of one move
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveStats {
    pub source_bucket: String,
    pub target_bucket: String,
    pub prefix: String,
    pub prefix_dst: String,
    pub suffix: String,
    pub total: usize,
    pub dry_run: bool,
}

/// Result of [`move_objects`]
#[derive(Debug, Clone, Serialize)]
pub struct MoveReport {
    pub moved: Vec<TransferPair>,
    pub deleted_source: Vec<String>,
    pub errors_copy: Vec<CopyFailure>,
    pub errors_delete: Vec<DeleteFailure>,
    pub stats: MoveStats,
    #[serde(skip)]
    states: BTreeMap<String, MoveState>,
}

impl MoveReport {
    pub fn has_errors(&self) -> bool {
        !self.errors_copy.is_empty() || !self.errors_delete.is_empty()
    }

    /// Final state of a source key
    pub fn state(&self, source_key: &str) -> Option<MoveState> {
        self.states.get(source_key).copied()
    }

    pub fn states(&self) -> &BTreeMap<String, MoveState> {
        &self.states
    }
}

/// Move objects under `source` (ending with `options.suffix`) to `destination`
pub async fn move_objects(
    store: &dyn ObjectStore,
    source: &BucketPath,
    destination: &BucketPath,
    options: &MoveOptions,
    progress: Progress<'_>,
) -> Result<MoveReport> {
    options.validate()?;
    ensure_disjoint(source, destination)?;

    let source_keys = collect_keys(store, source, &options.suffix).await?;
    let pairs: Vec<TransferPair> = relativize(&source_keys, &source.prefix)
        .iter()
        .map(|relative| TransferPair::for_relative(source, destination, relative))
        .collect();

    let mut ledger = Ledger::new(pairs.iter().map(|p| &p.source_key));
    let total = pairs.len();
    tracing::info!(source = %source, destination = %destination, total, dry_run = options.dry_run, "Moving objects");

    let executor = Executor::new(store, options.max_workers)
        .dry_run(options.dry_run)
        .with_progress(progress);

    ledger.advance_all(MoveState::Copying);
    let copy = executor
        .copy_many(&source.bucket, &destination.bucket, pairs)
        .await;
    for pair in &copy.succeeded {
        ledger.advance(&pair.source_key, MoveState::PendingDelete);
    }
    for failure in &copy.errors {
        ledger.advance(&failure.source_key, MoveState::CopyFailed);
    }

    // Only sources whose copy completed are eligible for deletion.
    let eligible: Vec<String> = copy
        .succeeded
        .iter()
        .map(|pair| pair.source_key.clone())
        .collect();
    let delete = if eligible.is_empty() {
        Default::default()
    } else {
        executor
            .delete_many(&source.bucket, eligible, options.delete_batch_size)
            .await
    };
    for key in &delete.deleted {
        ledger.advance(key, MoveState::Deleted);
    }
    for failure in &delete.errors {
        ledger.advance(&failure.key, MoveState::DeleteFailed);
    }

    tracing::info!(
        moved = copy.succeeded.len(),
        deleted = delete.deleted.len(),
        copy_errors = copy.errors.len(),
        delete_errors = delete.errors.len(),
        "Move finished"
    );

    Ok(MoveReport {
        moved: copy.succeeded,
        deleted_source: delete.deleted,
        errors_copy: copy.errors,
        errors_delete: delete.errors,
        stats: MoveStats {
            source_bucket: source.bucket.clone(),
            target_bucket: destination.bucket.clone(),
            prefix: source.prefix.clone(),
            prefix_dst: destination.prefix.clone(),
            suffix: options.suffix.clone(),
            total,
            dry_run: options.dry_run,
        },
        states: ledger.states,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[test]
    fn test_state_machine_transitions() {
        use MoveState::*;
        assert!(Pending.can_advance_to(Copying));
        assert!(Copying.can_advance_to(PendingDelete));
        assert!(Copying.can_advance_to(CopyFailed));
        assert!(PendingDelete.can_advance_to(Deleted));
        assert!(PendingDelete.can_advance_to(DeleteFailed));

        assert!(!CopyFailed.can_advance_to(PendingDelete));
        assert!(!Pending.can_advance_to(Deleted));
        assert!(!Copying.can_advance_to(Deleted));
        assert!(CopyFailed.is_terminal());
        assert!(!PendingDelete.is_terminal());
    }

    #[test]
    fn test_ledger_ignores_invalid_transition() {
        let keys = vec!["a".to_string()];
        let mut ledger = Ledger::new(&keys);
        ledger.advance("a", MoveState::Copying);
        ledger.advance("a", MoveState::CopyFailed);
        ledger.advance("a", MoveState::Deleted);
        assert_eq!(ledger.states["a"], MoveState::CopyFailed);
    }

    #[tokio::test]
    async fn test_failed_copy_keeps_source() {
        let store = MemoryStore::new();
        for key in ["in/a", "in/b", "in/c"] {
            store.put("src", key, key.as_bytes());
        }
        store.fail_copy("in/b");

        let report = move_objects(
            &store,
            &BucketPath::new("src", "in/"),
            &BucketPath::new("dst", "out/"),
            &MoveOptions::default(),
            None,
        )
        .await
        .unwrap();

        assert_eq!(report.deleted_source, vec!["in/a", "in/c"]);
        assert_eq!(report.errors_copy.len(), 1);
        assert!(store.contains("src", "in/b"));
        assert!(!store.contains("src", "in/a"));
        assert!(store.contains("dst", "out/a"));
        assert_eq!(report.state("in/b"), Some(MoveState::CopyFailed));
        assert_eq!(report.state("in/a"), Some(MoveState::Deleted));
        assert!(report.states().values().all(|s| s.is_terminal()));
    }

    #[tokio::test]
    async fn test_delete_failure_recorded_per_key() {
        let store = MemoryStore::new();
        store.put("src", "a", b"1");
        store.put("src", "b", b"2");
        store.fail_delete("a", "AccessDenied", "Access Denied");

        let report = move_objects(
            &store,
            &BucketPath::new("src", ""),
            &BucketPath::new("dst", ""),
            &MoveOptions::default(),
            None,
        )
        .await
        .unwrap();

        assert_eq!(report.moved.len(), 2);
        assert_eq!(report.deleted_source, vec!["b"]);
        assert_eq!(report.errors_delete[0].code.as_deref(), Some("AccessDenied"));
        assert_eq!(report.state("a"), Some(MoveState::DeleteFailed));
    }

    #[tokio::test]
    async fn test_suffix_filter_and_dry_run() {
        let store = MemoryStore::new();
        store.put("src", "p/a.jpg", b"1");
        store.put("src", "p/b.png", b"2");

        let options = MoveOptions {
            suffix: ".jpg".to_string(),
            dry_run: true,
            ..Default::default()
        };
        let report = move_objects(
            &store,
            &BucketPath::new("src", "p/"),
            &BucketPath::new("dst", "q/"),
            &options,
            None,
        )
        .await
        .unwrap();

        assert_eq!(report.moved, vec![TransferPair::new("p/a.jpg", "q/a.jpg")]);
        assert_eq!(report.deleted_source, vec!["p/a.jpg"]);
        assert!(report.stats.dry_run);
        assert_eq!(store.mutation_count(), 0);
        assert!(store.contains("src", "p/a.jpg"));
    }
}
