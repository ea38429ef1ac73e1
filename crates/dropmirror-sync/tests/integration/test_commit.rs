//! Commit pipeline behavior as seen through a running account

use std::path::PathBuf;

use crate::common::*;

#[tokio::test]
async fn test_folder_entry_replaces_local_file() {
    let fx = Fixture::new();
    std::fs::create_dir_all(fx.root()).unwrap();
    std::fs::write(fx.local("docs"), b"i am a file").unwrap();

    let feed = ScriptedFeed::new();
    feed.push_page(page("c1", vec![folder("/docs")]));

    let account = fx.open(&feed).await;
    let (observer, mut recorded) = RecordingObserver::new();
    account.sync(None, observer).await.unwrap();

    assert_eq!(recorded.next_changes().await, vec![fx.local("docs")]);
    assert!(fx.local("docs").is_dir());
}

#[tokio::test]
async fn test_overlapping_paths_each_commit_the_entry() {
    let fx = Fixture::new();
    let feed = ScriptedFeed::gated();
    feed.add_file("/a/b/file.txt", b"shared");
    feed.push_page(page("c1", vec![file("/a/b/file.txt")]));

    let account = fx.open(&feed).await;
    let (outer, mut recorded_outer) = RecordingObserver::new();
    let (inner, mut recorded_inner) = RecordingObserver::new();
    account.sync(Some("/a"), outer).await.unwrap();
    account.sync(Some("/a/b"), inner).await.unwrap();
    feed.release_pull();

    let expected = vec![fx.local("a/b/file.txt")];
    assert_eq!(recorded_outer.next_changes().await, expected);
    assert_eq!(recorded_inner.next_changes().await, expected);
    assert_eq!(std::fs::read(fx.local("a/b/file.txt")).unwrap(), b"shared");

    wait_for_polls(&feed, 1).await;
    assert_eq!(account.status().await.unwrap().batches_committed, 2);
}

#[tokio::test]
async fn test_blank_slate_without_entries_rebuilds_every_path() {
    let fx = Fixture::new();
    std::fs::create_dir_all(fx.local("docs")).unwrap();
    std::fs::write(fx.local("docs/old.txt"), b"old").unwrap();
    std::fs::create_dir_all(fx.local("photos/2020")).unwrap();
    std::fs::write(fx.local("unwatched.txt"), b"keep").unwrap();

    let feed = ScriptedFeed::gated();
    feed.push_page(reset_page("c1", vec![]));

    let account = fx.open(&feed).await;
    let (docs, mut recorded_docs) = RecordingObserver::new();
    let (photos, mut recorded_photos) = RecordingObserver::new();
    account.sync(Some("/docs"), docs).await.unwrap();
    account.sync(Some("/photos"), photos).await.unwrap();
    feed.release_pull();

    assert_eq!(recorded_docs.next_changes().await, Vec::<PathBuf>::new());
    assert_eq!(recorded_photos.next_changes().await, Vec::<PathBuf>::new());

    assert!(fx.local("docs").is_dir());
    assert!(!fx.local("docs/old.txt").exists());
    assert!(fx.local("photos").is_dir());
    assert!(!fx.local("photos/2020").exists());
    assert!(fx.local("unwatched.txt").exists());
}

#[tokio::test]
async fn test_replayed_batches_converge_on_remote_state() {
    let fx = Fixture::new();
    let feed = ScriptedFeed::new();
    feed.add_file("/proj/readme.md", b"v2");
    feed.add_file("/proj/src", b"src became a file");

    feed.push_page(reset_page(
        "c1",
        vec![folder("/proj"), folder("/proj/src"), file("/proj/readme.md")],
    ));
    feed.push_poll(true, 0);
    feed.push_page(page(
        "c2",
        vec![removed("/proj/src"), file("/proj/src"), folder("/proj/docs")],
    ));
    // The same batch again must leave the tree as it is.
    feed.push_poll(true, 0);
    feed.push_page(page(
        "c3",
        vec![removed("/proj/src"), file("/proj/src"), folder("/proj/docs")],
    ));

    let account = fx.open(&feed).await;
    let (observer, mut recorded) = RecordingObserver::new();
    account.sync(None, observer).await.unwrap();

    recorded.next_changes().await;
    recorded.next_changes().await;
    let last = recorded.next_changes().await;
    assert_eq!(
        last,
        vec![fx.local("proj/src"), fx.local("proj/src"), fx.local("proj/docs")]
    );

    assert_eq!(std::fs::read(fx.local("proj/readme.md")).unwrap(), b"v2");
    assert_eq!(
        std::fs::read(fx.local("proj/src")).unwrap(),
        b"src became a file"
    );
    assert!(fx.local("proj/docs").is_dir());

    let mut names: Vec<_> = std::fs::read_dir(fx.local("proj"))
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    assert_eq!(names, vec!["docs", "readme.md", "src"]);
}

#[tokio::test]
async fn test_batches_for_one_path_are_delivered_in_order() {
    let fx = Fixture::new();
    let feed = ScriptedFeed::new();
    feed.push_page(page("c1", vec![folder("/one")]));
    feed.push_poll(true, 0);
    feed.push_page(page("c2", vec![folder("/two")]));
    feed.push_poll(true, 0);
    feed.push_page(page("c3", vec![removed("/one")]));

    let account = fx.open(&feed).await;
    let (observer, mut recorded) = RecordingObserver::new();
    account.sync(None, observer).await.unwrap();

    assert_eq!(recorded.next_changes().await, vec![fx.local("one")]);
    assert_eq!(recorded.next_changes().await, vec![fx.local("two")]);
    assert_eq!(recorded.next_changes().await, vec![fx.local("one")]);

    assert!(!fx.local("one").exists());
    assert!(fx.local("two").is_dir());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_nested_paths_rebuild_from_blank_slate_without_losing_files() {
    for _ in 0..10 {
        let fx = Fixture::new();
        std::fs::create_dir_all(fx.local("docs")).unwrap();
        std::fs::write(fx.local("docs/stale.txt"), b"stale").unwrap();

        let feed = ScriptedFeed::gated();
        let mut entries = vec![folder("/docs")];
        for n in 0..20 {
            let path = format!("/docs/f{n}.txt");
            feed.add_file(&path, format!("content {n}").as_bytes());
            entries.push(file(&path));
        }
        feed.push_page(reset_page("c1", entries));

        let account = fx.open(&feed).await;
        let (root, mut recorded_root) = RecordingObserver::new();
        let (docs, mut recorded_docs) = RecordingObserver::new();
        account.sync(None, root).await.unwrap();
        account.sync(Some("/docs"), docs).await.unwrap();
        feed.release_pull();

        assert_eq!(recorded_root.next_changes().await.len(), 21);
        assert_eq!(recorded_docs.next_changes().await.len(), 21);

        assert!(!fx.local("docs/stale.txt").exists());
        for n in 0..20 {
            assert_eq!(
                std::fs::read(fx.local(&format!("docs/f{n}.txt"))).unwrap(),
                format!("content {n}").as_bytes()
            );
        }

        wait_for_polls(&feed, 1).await;
        assert_eq!(account.status().await.unwrap().batches_committed, 2);
    }
}
