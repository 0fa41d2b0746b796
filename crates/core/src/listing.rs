//! Paginated enumeration of keys and child folder names
//!
//! Listing is sequential: pages are requested one after another, following
//! continuation tokens until the store reports no further page. A failing page
//! ends the stream with that error; callers must not act on a partial listing.

use std::collections::BTreeSet;

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

use crate::error::{Error, Result};
use crate::matcher::child_name;
use crate::path::BucketPath;
use crate::traits::{ObjectInfo, ObjectStore};

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Lazily enumerate objects under `prefix` whose key ends with `suffix`
pub fn list_objects<'a>(
    store: &'a dyn ObjectStore,
    bucket: &'a str,
    prefix: &'a str,
    suffix: &'a str,
) -> BoxStream<'a, Result<ObjectInfo>> {
    stream::try_unfold(Cursor::Start, move |cursor| async move {
        let token = match cursor {
            Cursor::Start => None,
            Cursor::Next(token) => Some(token),
            Cursor::Done => return Ok::<_, Error>(None),
        };

        let page = store.list_page(bucket, prefix, token).await?;
        tracing::trace!(bucket, prefix, items = page.items.len(), "Listed page");

        let next = match page.next_token {
            Some(token) => Cursor::Next(token),
            None => Cursor::Done,
        };
        let items = page.items.into_iter().map(Ok::<ObjectInfo, Error>);
        Ok::<_, Error>(Some((stream::iter(items), next)))
    })
    .try_flatten()
    .try_filter(move |info| {
        let keep = info.key.starts_with(prefix) && info.key.ends_with(suffix);
        futures::future::ready(keep)
    })
    .boxed()
}

/// Collect every matching object under a location
pub async fn collect_objects(
    store: &dyn ObjectStore,
    location: &BucketPath,
    suffix: &str,
) -> Result<Vec<ObjectInfo>> {
    let objects: Vec<ObjectInfo> = list_objects(store, &location.bucket, &location.prefix, suffix)
        .try_collect()
        .await?;
    tracing::debug!(location = %location, count = objects.len(), "Enumerated objects");
    Ok(objects)
}

/// Collect every key under a location
pub async fn collect_keys(
    store: &dyn ObjectStore,
    location: &BucketPath,
    suffix: &str,
) -> Result<Vec<String>> {
    Ok(collect_objects(store, location, suffix)
        .await?
        .into_iter()
        .map(|info| info.key)
        .collect())
}

/// Names of the immediate children under `root`
///
/// Derived from the keys themselves, so folders without marker objects are
/// found too and no delimiter support is needed from the store.
pub async fn list_child_names(store: &dyn ObjectStore, root: &BucketPath) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    let mut objects = list_objects(store, &root.bucket, &root.prefix, "");
    while let Some(info) = objects.next().await {
        let info = info?;
        if let Some(name) = child_name(&info.key, &root.prefix) {
            names.insert(name.to_string());
        }
    }
    tracing::debug!(root = %root, count = names.len(), "Enumerated child names");
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{ListPage, MockObjectStore};
    use mockall::predicate::eq;

    fn page(keys: &[&str], next: Option<&str>) -> ListPage {
        ListPage {
            items: keys.iter().map(|k| ObjectInfo::new(*k)).collect(),
            next_token: next.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_follows_continuation_tokens() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_page()
            .with(eq("bucket"), eq("data/"), eq(None::<String>))
            .times(1)
            .returning(|_, _, _| Ok(page(&["data/a", "data/b"], Some("t1"))));
        store
            .expect_list_page()
            .with(eq("bucket"), eq("data/"), eq(Some("t1".to_string())))
            .times(1)
            .returning(|_, _, _| Ok(page(&["data/c"], None)));

        let keys = collect_keys(&store, &BucketPath::new("bucket", "data/"), "")
            .await
            .unwrap();
        assert_eq!(keys, vec!["data/a", "data/b", "data/c"]);
    }

    #[tokio::test]
    async fn test_suffix_filter() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_page()
            .returning(|_, _, _| Ok(page(&["p/a.jpg", "p/b.png", "p/c.jpg"], None)));

        let keys = collect_keys(&store, &BucketPath::new("b", "p/"), ".jpg")
            .await
            .unwrap();
        assert_eq!(keys, vec!["p/a.jpg", "p/c.jpg"]);
    }

    #[tokio::test]
    async fn test_page_error_propagates() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_page()
            .with(eq("b"), eq(""), eq(None::<String>))
            .returning(|_, _, _| Ok(page(&["a"], Some("t1"))));
        store
            .expect_list_page()
            .with(eq("b"), eq(""), eq(Some("t1".to_string())))
            .returning(|_, _, _| Err(Error::Network("connection reset".into())));

        let result = collect_keys(&store, &BucketPath::new("b", ""), "").await;
        assert!(matches!(result, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_child_names_without_markers() {
        let mut store = MockObjectStore::new();
        store.expect_list_page().returning(|_, _, _| {
            Ok(page(
                &[
                    "roots/src/A/1.txt",
                    "roots/src/A/2.txt",
                    "roots/src/B/deep/3.txt",
                    "roots/src/C/",
                ],
                None,
            ))
        });

        let names = list_child_names(&store, &BucketPath::new("b", "roots/src/"))
            .await
            .unwrap();
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["A", "B", "C"]);
    }
}
