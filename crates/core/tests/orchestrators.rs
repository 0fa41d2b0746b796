//! End-to-end runs of the orchestrators against the in-memory store

use s3tk_core::memory::MemoryStore;
use s3tk_core::{
    BucketPath, ComparisonMode, Error, MoveOptions, SplitOptions, SplitRoots, SyncOptions,
    copy_common_and_addon, move_objects, sync,
};

fn seed(store: &MemoryStore, bucket: &str, keys: &[&str]) {
    for key in keys {
        store.put(bucket, key, key.as_bytes());
    }
}

fn mirror_options() -> SyncOptions {
    SyncOptions {
        delete_extra: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn sync_copies_source_only_and_deletes_destination_only() {
    let store = MemoryStore::new();
    seed(&store, "src", &["data/a1", "data/a2", "data/shared"]);
    seed(&store, "dst", &["mirror/b1", "mirror/shared"]);

    let report = sync(
        &store,
        &BucketPath::new("src", "data/"),
        &BucketPath::new("dst", "mirror/"),
        &mirror_options(),
        None,
    )
    .await
    .unwrap();

    let copied: Vec<&str> = report.copied.iter().map(|p| p.destination_key.as_str()).collect();
    assert_eq!(copied, vec!["mirror/a1", "mirror/a2"]);
    assert_eq!(report.deleted, vec!["mirror/b1"]);
    assert_eq!(report.stats.unchanged, 1);
    assert!(!report.has_errors());
    assert_eq!(store.keys("dst"), vec!["mirror/a1", "mirror/a2", "mirror/shared"]);
}

#[tokio::test]
async fn second_sync_is_a_no_op() {
    let store = MemoryStore::new();
    seed(&store, "src", &["p/x", "p/y/z"]);
    seed(&store, "dst", &["q/old"]);
    let source = BucketPath::new("src", "p/");
    let destination = BucketPath::new("dst", "q/");

    for mode in [ComparisonMode::Name, ComparisonMode::ETag, ComparisonMode::Size] {
        let options = SyncOptions {
            compare_mode: mode,
            ..mirror_options()
        };
        sync(&store, &source, &destination, &options, None).await.unwrap();
        let again = sync(&store, &source, &destination, &options, None).await.unwrap();

        assert!(again.copied.is_empty(), "{mode}: nothing left to copy");
        assert!(again.deleted.is_empty(), "{mode}: nothing left to delete");
        assert_eq!(again.stats.unchanged, 2);
    }
}

#[tokio::test]
async fn dry_run_plans_what_a_real_run_does() {
    let keys = ["in/1", "in/2", "in/3"];
    let options = mirror_options();

    let planned = {
        let store = MemoryStore::new();
        seed(&store, "b", &keys);
        seed(&store, "b", &["out/stale"]);
        let report = sync(
            &store,
            &BucketPath::new("b", "in/"),
            &BucketPath::new("b", "out/"),
            &SyncOptions {
                dry_run: true,
                ..options.clone()
            },
            None,
        )
        .await
        .unwrap();
        assert_eq!(store.mutation_count(), 0);
        report
    };

    let store = MemoryStore::new();
    seed(&store, "b", &keys);
    seed(&store, "b", &["out/stale"]);
    let executed = sync(
        &store,
        &BucketPath::new("b", "in/"),
        &BucketPath::new("b", "out/"),
        &options,
        None,
    )
    .await
    .unwrap();

    assert_eq!(planned.copied, executed.copied);
    assert_eq!(planned.deleted, executed.deleted);
    assert!(planned.stats.dry_run);
}

#[tokio::test]
async fn self_overlap_rejected_before_listing() {
    let store = MemoryStore::new();
    let err = sync(
        &store,
        &BucketPath::new("bucketX", "data/"),
        &BucketPath::new("bucketX", "data/sub/"),
        &SyncOptions::default(),
        None,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::Config(_)));
    assert_eq!(store.list_calls(), 0);
}

#[tokio::test]
async fn sync_walks_every_page() {
    let store = MemoryStore::with_page_size(2);
    let keys: Vec<String> = (0..7).map(|i| format!("src/{i}")).collect();
    for key in &keys {
        store.put("b", key, b"x");
    }

    let report = sync(
        &store,
        &BucketPath::new("b", "src/"),
        &BucketPath::new("b", "dst/"),
        &SyncOptions::default(),
        None,
    )
    .await
    .unwrap();

    assert_eq!(report.stats.total_src, 7);
    assert_eq!(report.copied.len(), 7);
    // 4 pages for the source, 1 for the empty destination
    assert_eq!(store.list_calls(), 5);
}

#[tokio::test]
async fn sync_deletes_in_bounded_batches() {
    let store = MemoryStore::new();
    for i in 0..2500 {
        store.put("dst", &format!("extra/{i:04}"), b"x");
    }

    let report = sync(
        &store,
        &BucketPath::new("src", "none/"),
        &BucketPath::new("dst", "extra/"),
        &mirror_options(),
        None,
    )
    .await
    .unwrap();

    assert_eq!(report.deleted.len(), 2500);
    let mut batches = store.delete_batch_sizes();
    batches.sort();
    assert_eq!(batches, vec![500, 1000, 1000]);
}

#[tokio::test]
async fn move_never_deletes_uncopied_sources() {
    let store = MemoryStore::new();
    seed(&store, "src", &["a", "b", "c"]);
    store.fail_copy("b");

    let report = move_objects(
        &store,
        &BucketPath::new("src", ""),
        &BucketPath::new("dst", ""),
        &MoveOptions::default(),
        None,
    )
    .await
    .unwrap();

    assert_eq!(report.deleted_source, vec!["a", "c"]);
    assert_eq!(store.keys("src"), vec!["b"]);
    assert_eq!(store.keys("dst"), vec!["a", "c"]);
}

#[tokio::test]
async fn common_and_addon_split() {
    let store = MemoryStore::new();
    seed(&store, "b", &["src/A/1", "src/B/1", "src/B/2", "src/C/1"]);
    seed(&store, "b", &["ref/B/x", "ref/C/x", "ref/D/x"]);

    let roots = SplitRoots {
        bucket: "b".into(),
        src_root: "src/".into(),
        ref_root: "ref/".into(),
        common_dst_root: "common/".into(),
        addon_dst_root: "addon/".into(),
    };
    let report = copy_common_and_addon(&store, &roots, &SplitOptions::default(), None)
        .await
        .unwrap();

    assert_eq!(report.common.keys().collect::<Vec<_>>(), vec!["B", "C"]);
    assert_eq!(report.addon.keys().collect::<Vec<_>>(), vec!["A"]);
    assert_eq!(report.common["B"].copied_count(), 2);
    assert_eq!(report.addon["A"].copied_count(), 1);
    assert!(store.contains("b", "common/B/2"));
    assert!(store.contains("b", "addon/A/1"));
    assert!(!store.contains("b", "common/D/x"));
}

#[tokio::test]
async fn split_records_folder_listing_failure() {
    let store = MemoryStore::new();
    seed(&store, "b", &["src/A/1", "src/B/1"]);
    // only fails listings scoped to the B folder, not the root scan
    store.fail_list("b", "src/B/");

    let roots = SplitRoots {
        bucket: "b".into(),
        src_root: "src/".into(),
        ref_root: "ref/".into(),
        common_dst_root: "common/".into(),
        addon_dst_root: "addon/".into(),
    };
    let report = copy_common_and_addon(&store, &roots, &SplitOptions::default(), None)
        .await
        .unwrap();

    assert_eq!(report.addon["A"].copied_count(), 1);
    assert_eq!(report.addon["B"].error_count(), 1);
    assert!(report.has_errors());
}
