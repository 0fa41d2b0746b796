//! Bulk download of objects to a local directory

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;

use futures::stream::{self, StreamExt};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::listing::collect_objects;
use crate::matcher::Matcher;
use crate::path::BucketPath;
use crate::progress::{self, Phase, Progress};
use crate::sync::validate_workers;
use crate::traits::{ObjectInfo, ObjectStore};
use crate::transfer::DEFAULT_MAX_WORKERS;

/// When an existing local file may be left alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipIf {
    #[default]
    None,
    /// Local size equals the object size
    Size,
}

impl fmt::Display for SkipIf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipIf::None => write!(f, "none"),
            SkipIf::Size => write!(f, "size"),
        }
    }
}

impl FromStr for SkipIf {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(SkipIf::None),
            "size" => Ok(SkipIf::Size),
            _ => Err(format!("Invalid skip condition: {s} (expected none or size)")),
        }
    }
}

/// Options for [`download_by_mask`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadOptions {
    pub suffix: String,
    /// Recreate the key hierarchy below the target directory
    pub keep_structure: bool,
    pub overwrite: bool,
    pub skip_if: SkipIf,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Set each file's mtime to the object's last-modified time
    pub preserve_mtime: bool,
    pub dry_run: bool,
    pub max_workers: usize,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            suffix: String::new(),
            keep_structure: true,
            overwrite: false,
            skip_if: SkipIf::None,
            include: Vec::new(),
            exclude: Vec::new(),
            preserve_mtime: false,
            dry_run: false,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }
}

impl DownloadOptions {
    pub fn validate(&self) -> Result<()> {
        validate_workers(self.max_workers)
    }
}

/// One object and the local file it maps to
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct DownloadedFile {
    pub key: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadStats {
    pub bucket: String,
    pub prefix: String,
    pub suffix: String,
    pub dst_root: PathBuf,
    pub keep_structure: bool,
    pub overwrite: bool,
    pub skip_if: SkipIf,
    pub preserve_mtime: bool,
    pub dry_run: bool,
    /// Objects selected by the suffix and the include/exclude globs
    pub total: usize,
    /// Bytes written to disk
    pub bytes: u64,
}

/// Result of [`download_by_mask`]
#[derive(Debug, Clone, Serialize)]
pub struct DownloadReport {
    pub downloaded: Vec<DownloadedFile>,
    pub skipped: Vec<DownloadedFile>,
    pub errors: Vec<String>,
    pub stats: DownloadStats,
}

impl DownloadReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

struct Planned {
    object: ObjectInfo,
    path: PathBuf,
}

/// Map a relative key onto a path below `root`
///
/// Keys with `..` segments are refused so nothing escapes the target root.
fn local_path(root: &Path, relative: &str, keep_structure: bool) -> Result<PathBuf> {
    let segments: Vec<&str> = relative
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();
    if segments.contains(&"..") {
        return Err(Error::InvalidPath(format!("refusing key with '..' segment: {relative}")));
    }
    let Some(basename) = segments.last() else {
        return Err(Error::InvalidPath(format!("key has no file name: {relative}")));
    };

    if keep_structure {
        Ok(segments.iter().fold(root.to_path_buf(), |path, segment| path.join(segment)))
    } else {
        Ok(root.join(basename))
    }
}

/// Whether an existing file at `path` should be kept as is
async fn should_skip(path: &Path, remote_size: Option<i64>, options: &DownloadOptions) -> bool {
    let Ok(meta) = tokio::fs::metadata(path).await else {
        return false;
    };
    if !options.overwrite {
        return true;
    }
    match options.skip_if {
        SkipIf::None => false,
        SkipIf::Size => remote_size.is_some_and(|size| u64::try_from(size).ok() == Some(meta.len())),
    }
}

async fn fetch_to_file(
    store: &dyn ObjectStore,
    bucket: &str,
    planned: &Planned,
    preserve_mtime: bool,
) -> Result<u64> {
    let data = store.get_object(bucket, &planned.object.key).await?;
    if let Some(parent) = planned.path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let partial = partial_path(&planned.path);
    let written = async {
        tokio::fs::write(&partial, &data).await?;
        if preserve_mtime && let Some(modified) = planned.object.last_modified {
            set_mtime(&partial, modified).await?;
        }
        tokio::fs::rename(&partial, &planned.path).await?;
        Ok::<_, Error>(())
    }
    .await;

    if let Err(e) = written {
        if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
            tracing::debug!(path = %partial.display(), error = %cleanup, "Removing partial file failed");
        }
        return Err(e);
    }
    Ok(data.len() as u64)
}

/// Sibling path an object is written to before being renamed into place
fn partial_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    if let Some(file_name) = path.file_name() {
        name.push(file_name);
    }
    name.push(".s3tk-part");
    path.with_file_name(name)
}

async fn set_mtime(path: &Path, modified: Timestamp) -> Result<()> {
    let file = tokio::fs::OpenOptions::new()
        .write(true)
        .open(path)
        .await?
        .into_std()
        .await;
    file.set_modified(SystemTime::from(modified))?;
    Ok(())
}

/// Download every object under `source` ending with `options.suffix`
///
/// Listing failures abort before anything is written. Per-object failures,
/// unsafe keys and flattened name collisions are reported in `errors`.
pub async fn download_by_mask(
    store: &dyn ObjectStore,
    source: &BucketPath,
    dst_root: &Path,
    options: &DownloadOptions,
    progress: Progress<'_>,
) -> Result<DownloadReport> {
    options.validate()?;
    let matcher = Matcher::new(&options.include, &options.exclude)?;

    let objects = collect_objects(store, source, &options.suffix).await?;

    let mut errors = Vec::new();
    let mut skipped = Vec::new();
    let mut planned = Vec::new();
    let mut claimed: BTreeMap<PathBuf, String> = BTreeMap::new();

    for object in objects {
        if object.key.ends_with('/') {
            continue;
        }
        let relative = object
            .key
            .strip_prefix(source.prefix.as_str())
            .unwrap_or(&object.key)
            .to_string();
        if !matcher.is_match(&relative) {
            continue;
        }

        let path = match local_path(dst_root, &relative, options.keep_structure) {
            Ok(path) => path,
            Err(e) => {
                errors.push(format!("{}: {e}", object.key));
                continue;
            }
        };
        if let Some(owner) = claimed.get(&path) {
            errors.push(format!(
                "{}: local path {} already taken by {owner}",
                object.key,
                path.display()
            ));
            continue;
        }
        claimed.insert(path.clone(), object.key.clone());

        if should_skip(&path, object.size_bytes, options).await {
            tracing::debug!(key = %object.key, path = %path.display(), "Keeping existing file");
            skipped.push(DownloadedFile {
                key: object.key,
                path,
            });
            continue;
        }
        planned.push(Planned { object, path });
    }

    let total = planned.len() + skipped.len();
    let mut downloaded = Vec::with_capacity(planned.len());
    let mut bytes = 0u64;

    if options.dry_run {
        downloaded.extend(planned.into_iter().map(|p| DownloadedFile {
            key: p.object.key,
            path: p.path,
        }));
    } else {
        progress::started(progress, Phase::Download, planned.len());
        let mut transfers = stream::iter(planned)
            .map(|item| async move {
                let result = fetch_to_file(store, &source.bucket, &item, options.preserve_mtime).await;
                (item, result)
            })
            .buffer_unordered(options.max_workers);

        while let Some((item, result)) = transfers.next().await {
            progress::finished_item(progress, Phase::Download, &item.object.key, result.is_ok());
            match result {
                Ok(written) => {
                    bytes += written;
                    downloaded.push(DownloadedFile {
                        key: item.object.key,
                        path: item.path,
                    });
                }
                Err(e) => {
                    tracing::warn!(key = %item.object.key, error = %e, "Download failed");
                    errors.push(format!("{}: {e}", item.object.key));
                }
            }
        }
        progress::finished(progress, Phase::Download);
    }

    downloaded.sort();
    errors.sort();

    tracing::info!(
        source = %source,
        dst_root = %dst_root.display(),
        downloaded = downloaded.len(),
        skipped = skipped.len(),
        errors = errors.len(),
        dry_run = options.dry_run,
        "Download finished"
    );

    Ok(DownloadReport {
        downloaded,
        skipped,
        errors,
        stats: DownloadStats {
            bucket: source.bucket.clone(),
            prefix: source.prefix.clone(),
            suffix: options.suffix.clone(),
            dst_root: dst_root.to_path_buf(),
            keep_structure: options.keep_structure,
            overwrite: options.overwrite,
            skip_if: options.skip_if,
            preserve_mtime: options.preserve_mtime,
            dry_run: options.dry_run,
            total,
            bytes,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use tempfile::TempDir;

    fn source() -> BucketPath {
        BucketPath::new("media", "photos/")
    }

    #[test]
    fn test_local_path() {
        let root = Path::new("/tmp/out");
        assert_eq!(
            local_path(root, "2024/a.jpg", true).unwrap(),
            PathBuf::from("/tmp/out/2024/a.jpg")
        );
        assert_eq!(
            local_path(root, "2024/a.jpg", false).unwrap(),
            PathBuf::from("/tmp/out/a.jpg")
        );
        assert!(local_path(root, "../etc/passwd", true).is_err());
        assert!(local_path(root, "", true).is_err());
    }

    #[test]
    fn test_skip_if_parsing() {
        assert_eq!("SIZE".parse::<SkipIf>().unwrap(), SkipIf::Size);
        assert!("mtime".parse::<SkipIf>().is_err());
    }

    #[tokio::test]
    async fn test_download_keeps_structure() {
        let store = MemoryStore::new();
        store.put("media", "photos/2024/a.jpg", b"aaa");
        store.put("media", "photos/b.jpg", b"bb");
        store.put("media", "photos/notes.txt", b"n");
        store.put("media", "photos/empty/", b"");
        let dir = TempDir::new().unwrap();

        let options = DownloadOptions {
            suffix: ".jpg".to_string(),
            ..Default::default()
        };
        let report = download_by_mask(&store, &source(), dir.path(), &options, None)
            .await
            .unwrap();

        assert_eq!(report.downloaded.len(), 2);
        assert_eq!(report.stats.bytes, 5);
        assert!(report.errors.is_empty());
        assert_eq!(
            std::fs::read(dir.path().join("2024").join("a.jpg")).unwrap(),
            b"aaa"
        );
        assert!(!dir.path().join("notes.txt").exists());
        assert!(!dir.path().join("2024").join(".a.jpg.s3tk-part").exists());
    }

    #[test]
    fn test_partial_path_is_hidden_sibling() {
        assert_eq!(
            partial_path(Path::new("/tmp/out/2024/a.jpg")),
            PathBuf::from("/tmp/out/2024/.a.jpg.s3tk-part")
        );
    }

    #[tokio::test]
    async fn test_failed_write_leaves_nothing_behind() {
        let store = MemoryStore::new();
        store.put("media", "photos/a.jpg", b"remote");
        let dir = TempDir::new().unwrap();
        // a non-empty directory at the target path makes the final rename fail
        std::fs::create_dir(dir.path().join("a.jpg")).unwrap();
        std::fs::write(dir.path().join("a.jpg").join("keep"), b"k").unwrap();

        let options = DownloadOptions {
            overwrite: true,
            ..Default::default()
        };
        let report = download_by_mask(&store, &source(), dir.path(), &options, None)
            .await
            .unwrap();

        assert!(report.downloaded.is_empty());
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("photos/a.jpg"));
        assert!(!dir.path().join(".a.jpg.s3tk-part").exists());
        assert!(dir.path().join("a.jpg").is_dir());
    }

    #[tokio::test]
    async fn test_flatten_collision_is_an_error() {
        let store = MemoryStore::new();
        store.put("media", "photos/x/a.jpg", b"1");
        store.put("media", "photos/y/a.jpg", b"2");
        let dir = TempDir::new().unwrap();

        let options = DownloadOptions {
            keep_structure: false,
            ..Default::default()
        };
        let report = download_by_mask(&store, &source(), dir.path(), &options, None)
            .await
            .unwrap();

        assert_eq!(report.downloaded.len(), 1);
        assert_eq!(report.downloaded[0].key, "photos/x/a.jpg");
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("photos/y/a.jpg"));
    }

    #[tokio::test]
    async fn test_existing_files_skipped_unless_overwrite() {
        let store = MemoryStore::new();
        store.put("media", "photos/a.jpg", b"remote");
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"local!").unwrap();

        let report = download_by_mask(&store, &source(), dir.path(), &DownloadOptions::default(), None)
            .await
            .unwrap();
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(store.get_calls(), 0);

        // same size: kept under skip_if=size even with overwrite
        let options = DownloadOptions {
            overwrite: true,
            skip_if: SkipIf::Size,
            ..Default::default()
        };
        let report = download_by_mask(&store, &source(), dir.path(), &options, None)
            .await
            .unwrap();
        assert_eq!(report.skipped.len(), 1);

        let options = DownloadOptions {
            overwrite: true,
            ..Default::default()
        };
        let report = download_by_mask(&store, &source(), dir.path(), &options, None)
            .await
            .unwrap();
        assert_eq!(report.downloaded.len(), 1);
        assert_eq!(std::fs::read(dir.path().join("a.jpg")).unwrap(), b"remote");
    }

    #[tokio::test]
    async fn test_include_exclude_and_dry_run() {
        let store = MemoryStore::new();
        store.put("media", "photos/keep.jpg", b"1");
        store.put("media", "photos/tmp/skip.jpg", b"2");
        store.put("media", "photos/other.png", b"3");
        let dir = TempDir::new().unwrap();

        let options = DownloadOptions {
            include: vec!["*.jpg".to_string()],
            exclude: vec!["tmp/*".to_string()],
            dry_run: true,
            ..Default::default()
        };
        let report = download_by_mask(&store, &source(), dir.path(), &options, None)
            .await
            .unwrap();

        assert_eq!(report.downloaded.len(), 1);
        assert_eq!(report.downloaded[0].key, "photos/keep.jpg");
        assert_eq!(report.stats.total, 1);
        assert_eq!(store.get_calls(), 0);
        assert!(!dir.path().join("keep.jpg").exists());
    }

    #[tokio::test]
    async fn test_failed_get_recorded() {
        let store = MemoryStore::new();
        store.put("media", "photos/a.jpg", b"1");
        store.put("media", "photos/b.jpg", b"2");
        store.fail_get("photos/a.jpg");
        let dir = TempDir::new().unwrap();

        let report = download_by_mask(&store, &source(), dir.path(), &DownloadOptions::default(), None)
            .await
            .unwrap();

        assert_eq!(report.downloaded.len(), 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("photos/a.jpg"));
    }

    #[tokio::test]
    async fn test_preserve_mtime() {
        let store = MemoryStore::new();
        store.put("media", "photos/a.jpg", b"1");
        let at: Timestamp = "2021-03-04T05:06:07Z".parse().unwrap();
        store.set_last_modified("media", "photos/a.jpg", at);
        let dir = TempDir::new().unwrap();

        let options = DownloadOptions {
            preserve_mtime: true,
            ..Default::default()
        };
        download_by_mask(&store, &source(), dir.path(), &options, None)
            .await
            .unwrap();

        let modified = std::fs::metadata(dir.path().join("a.jpg"))
            .unwrap()
            .modified()
            .unwrap();
        assert_eq!(modified, SystemTime::from(at));
    }
}
