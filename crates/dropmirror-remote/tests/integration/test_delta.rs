//! Integration tests for paged delta pulls

use dropmirror_core::domain::delta::EntryKind;
use dropmirror_core::domain::newtypes::Cursor;
use dropmirror_remote::delta;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_initial_pull_enumerates_everything() {
    let (server, client) = common::setup_delta_mock().await;

    Mock::given(method("POST"))
        .and(path("/delta"))
        .and(header("authorization", "Bearer test-access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "entries": [
                ["/docs", {"is_dir": true, "path": "/Docs"}],
                ["/docs/a.txt", {"is_dir": false, "path": "/Docs/a.txt", "bytes": 5, "rev": "1"}]
            ],
            "reset": true,
            "cursor": "cursor-001",
            "has_more": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = delta::pull_page(&client, None)
        .await
        .expect("Initial pull failed");

    assert!(page.reset);
    assert!(!page.has_more);
    assert_eq!(page.cursor.as_str(), "cursor-001");
    assert_eq!(page.entries.len(), 2);
    assert_eq!(page.entries[0].kind, EntryKind::Folder);
    assert_eq!(page.entries[1].path.as_str(), "/docs/a.txt");
    assert!(matches!(page.entries[1].kind, EntryKind::File(ref m) if m.size == Some(5)));
}

#[tokio::test]
async fn test_pull_sends_cursor_and_follows_pages() {
    let (server, client) = common::setup_delta_mock().await;

    common::mount_delta_page(
        &server,
        "page-1",
        serde_json::json!({
            "entries": [["/a", null]],
            "reset": false,
            "cursor": "page-2",
            "has_more": true
        }),
    )
    .await;
    common::mount_delta_page(
        &server,
        "page-2",
        serde_json::json!({
            "entries": [["/b", {"is_dir": true}]],
            "reset": false,
            "cursor": "page-3",
            "has_more": false
        }),
    )
    .await;

    let first = delta::pull_page(&client, Some(&Cursor::new("page-1".into()).unwrap()))
        .await
        .unwrap();
    assert!(first.has_more);
    assert_eq!(first.entries[0].kind, EntryKind::Removed);

    let second = delta::pull_page(&client, Some(&first.cursor)).await.unwrap();
    assert!(!second.has_more);
    assert_eq!(second.cursor.as_str(), "page-3");
    assert_eq!(second.entries[0].path.as_str(), "/b");
}

#[tokio::test]
async fn test_unauthorized_pull_is_an_error() {
    let (server, client) = common::setup_delta_mock().await;

    Mock::given(method("POST"))
        .and(path("/delta"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .mount(&server)
        .await;

    let err = delta::pull_page(&client, None).await.unwrap_err();
    let remote = err
        .downcast_ref::<dropmirror_remote::RemoteError>()
        .expect("classified error in chain");
    assert!(matches!(remote, dropmirror_remote::RemoteError::Unauthorized(m) if m == "token expired"));
}

#[tokio::test]
async fn test_malformed_body_is_an_error() {
    let (server, client) = common::setup_delta_mock().await;
    common::mount_initial_delta(&server, serde_json::json!({"entries": []})).await;

    let err = delta::pull_page(&client, None).await.unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse delta response JSON"));
}
