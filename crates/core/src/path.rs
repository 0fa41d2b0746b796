//! S3 URI parsing and key re-prefixing
//!
//! A [`BucketPath`] scopes an operation to `bucket` + `prefix`. Prefixes are
//! plain string prefixes, not directories: `data/v1` also covers
//! `data/v1.bak/x`.

use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};

const SCHEME: &str = "s3://";

/// A bucket and a key prefix within it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BucketPath {
    pub bucket: String,
    pub prefix: String,
}

impl BucketPath {
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    /// Full key for a key relative to this prefix
    pub fn join(&self, relative: &str) -> String {
        format!("{}{relative}", self.prefix)
    }

    /// The same location treated as a folder: a non-empty prefix ends in `/`
    pub fn as_folder(&self) -> BucketPath {
        if self.prefix.is_empty() || self.prefix.ends_with('/') {
            self.clone()
        } else {
            BucketPath::new(&self.bucket, format!("{}/", self.prefix))
        }
    }

    /// Path for a child folder (`folder prefix + name + "/"`)
    pub fn child(&self, name: &str) -> BucketPath {
        BucketPath::new(&self.bucket, format!("{}{name}/", self.as_folder().prefix))
    }

    /// Whether this location and `other` cover overlapping key ranges
    pub fn overlaps(&self, other: &BucketPath) -> bool {
        self.bucket == other.bucket
            && (self.prefix.starts_with(&other.prefix) || other.prefix.starts_with(&self.prefix))
    }
}

impl fmt::Display for BucketPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{}/{}", self.bucket, self.prefix)
    }
}

/// Check whether a string looks like an S3 URI
pub fn is_s3_uri(uri: &str) -> bool {
    parse_s3_uri(uri).is_ok()
}

/// Parse `s3://bucket[/prefix]` into a [`BucketPath`]
///
/// The prefix is kept verbatim, including any trailing slash.
pub fn parse_s3_uri(uri: &str) -> Result<BucketPath> {
    let rest = uri
        .strip_prefix(SCHEME)
        .ok_or_else(|| Error::InvalidPath(format!("{uri}: expected {SCHEME}bucket/prefix")))?;

    let (bucket, prefix) = match rest.split_once('/') {
        Some((bucket, prefix)) => (bucket, prefix),
        None => (rest, ""),
    };

    if bucket.is_empty() {
        return Err(Error::InvalidPath(format!("{uri}: bucket name is empty")));
    }

    if !bucket
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err(Error::InvalidPath(format!(
            "{uri}: invalid character in bucket name"
        )));
    }

    Ok(BucketPath::new(bucket, prefix))
}

/// Fail fast when source and destination share a bucket and their prefixes nest
///
/// Copying a location into itself (or into a sub-prefix of itself) would feed
/// freshly written objects back into the source population.
pub fn ensure_disjoint(source: &BucketPath, destination: &BucketPath) -> Result<()> {
    if source.overlaps(destination) {
        return Err(Error::Config(format!(
            "source {source} and destination {destination} overlap within the same bucket"
        )));
    }
    Ok(())
}
