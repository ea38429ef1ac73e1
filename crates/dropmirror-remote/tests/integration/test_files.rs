//! Integration tests for file downloads and the IDeltaFeed provider

use std::sync::Arc;

use dropmirror_core::ports::IDeltaFeed;
use dropmirror_remote::provider::DeltaFeedProvider;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_download_encodes_path() {
    let (server, client) = common::setup_delta_mock().await;
    common::mount_file(&server, "/My%20Docs/notes.txt", b"hello").await;

    let data = client
        .download_file(&"/My Docs/notes.txt".parse().unwrap())
        .await
        .unwrap();
    assert_eq!(data, b"hello");
}

#[tokio::test]
async fn test_download_is_authenticated() {
    let (server, client) = common::setup_delta_mock().await;

    Mock::given(method("GET"))
        .and(path("/files/auto/a.bin"))
        .and(header("authorization", "Bearer test-access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8, 1, 2]))
        .expect(1)
        .mount(&server)
        .await;

    let data = client.download_file(&"/a.bin".parse().unwrap()).await.unwrap();
    assert_eq!(data, vec![0u8, 1, 2]);
}

#[tokio::test]
async fn test_missing_file_is_an_error() {
    let (server, client) = common::setup_delta_mock().await;

    Mock::given(method("GET"))
        .and(path("/files/auto/gone.txt"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let err = client
        .download_file(&"/gone.txt".parse().unwrap())
        .await
        .unwrap_err();
    assert!(err
        .downcast_ref::<dropmirror_remote::RemoteError>()
        .is_some_and(|e| matches!(e, dropmirror_remote::RemoteError::NotFound(_))));
}

#[tokio::test]
async fn test_provider_delegates_every_operation() {
    let (server, client) = common::setup_delta_mock().await;
    common::mount_initial_delta(
        &server,
        serde_json::json!({
            "entries": [["/f.txt", {"is_dir": false, "bytes": 2}]],
            "reset": true,
            "cursor": "c1",
            "has_more": false
        }),
    )
    .await;
    common::mount_longpoll(
        &server,
        "c1",
        ResponseTemplate::new(200).set_body_json(serde_json::json!({"changes": true})),
    )
    .await;
    common::mount_file(&server, "/f.txt", b"hi").await;

    let feed: Arc<dyn IDeltaFeed> = Arc::new(DeltaFeedProvider::new(client));

    let page = feed.pull_changes(None).await.unwrap();
    assert_eq!(page.entries.len(), 1);

    let poll = feed.poll_for_changes(&page.cursor).await.unwrap();
    assert!(poll.has_changes);

    let data = feed.read_file(&page.entries[0].path).await.unwrap();
    assert_eq!(data, b"hi");
}
