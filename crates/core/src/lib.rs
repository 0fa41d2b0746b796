//! s3tk-core: reconciliation and bulk-transfer engine for S3-compatible stores
//!
//! This crate provides:
//! - Lazy paginated listing and relative-key matching
//! - Name / ETag / size comparison of two locations
//! - A bounded-parallel transfer executor with batched deletes
//! - The sync, move, copy and download orchestrators
//! - Configuration, error and retry types shared by the adapter and CLI
//!
//! Everything runs against the [`ObjectStore`] trait, so the engine is
//! independent of any specific S3 SDK. With the `test-util` feature,
//! `memory::MemoryStore` implements it in memory for tests.

pub mod compare;
pub mod config;
pub mod copy;
pub mod download;
pub mod error;
pub mod listing;
pub mod matcher;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod path;
pub mod progress;
pub mod relocate;
pub mod retry;
pub mod sync;
pub mod traits;
pub mod transfer;

pub use compare::{Comparator, ComparisonMode, Plan};
pub use config::{ClientConfig, Config, ConfigManager, RetryConfig};
pub use copy::{
    MaskCopyOptions, MaskCopyReport, PrefixCopyReport, SplitOptions, SplitReport, SplitRoots,
    copy_by_mask, copy_common_and_addon, copy_prefixes,
};
pub use download::{DownloadOptions, DownloadReport, DownloadedFile, SkipIf, download_by_mask};
pub use error::{Error, Result};
pub use listing::{collect_keys, collect_objects, list_child_names, list_objects};
pub use matcher::{Matcher, relativize};
pub use path::{BucketPath, ensure_disjoint, parse_s3_uri};
pub use progress::{Phase, Progress, ProgressObserver};
pub use relocate::{MoveOptions, MoveReport, MoveState, move_objects};
pub use retry::{is_retryable_error, retry_with_backoff};
pub use sync::{SyncOptions, SyncReport, sync};
pub use traits::{
    BatchDeleteResult, DeleteFailure, ListPage, MAX_DELETE_BATCH, ObjectInfo, ObjectMetadata,
    ObjectStore,
};
pub use transfer::{CopyFailure, CopyOutcome, DeleteOutcome, Executor, TransferPair};
