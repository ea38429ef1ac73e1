//! Integration tests for long-polling

use std::time::Duration;

use dropmirror_core::domain::newtypes::Cursor;
use dropmirror_remote::delta;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

fn cursor(value: &str) -> Cursor {
    Cursor::new(value.to_string()).unwrap()
}

#[tokio::test]
async fn test_longpoll_reports_changes_and_backoff() {
    let (server, client) = common::setup_delta_mock().await;
    common::mount_longpoll(
        &server,
        "c1",
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "changes": true,
            "backoff": 15
        })),
    )
    .await;

    let result = delta::longpoll(&client, &cursor("c1")).await.unwrap();
    assert!(result.has_changes);
    assert_eq!(result.retry_after, Duration::from_secs(15));
}

#[tokio::test]
async fn test_longpoll_sends_configured_timeout() {
    let (server, client) = common::setup_delta_mock().await;
    let client = client.with_longpoll_timeout(Duration::from_secs(45));

    Mock::given(method("GET"))
        .and(path("/longpoll_delta"))
        .and(query_param("cursor", "c1"))
        .and(query_param("timeout", "45"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "changes": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = delta::longpoll(&client, &cursor("c1")).await.unwrap();
    assert!(!result.has_changes);
    assert_eq!(result.retry_after, Duration::ZERO);
}

#[tokio::test]
async fn test_throttled_longpoll_backs_off() {
    let (server, client) = common::setup_delta_mock().await;
    common::mount_longpoll(
        &server,
        "c1",
        ResponseTemplate::new(429).insert_header("Retry-After", "20"),
    )
    .await;

    let result = delta::longpoll(&client, &cursor("c1")).await.unwrap();
    assert!(!result.has_changes);
    assert_eq!(result.retry_after, Duration::from_secs(20));
}

#[tokio::test]
async fn test_longpoll_bad_cursor_is_an_error() {
    let (server, client) = common::setup_delta_mock().await;
    common::mount_longpoll(
        &server,
        "stale",
        ResponseTemplate::new(400).set_body_string("Invalid cursor"),
    )
    .await;

    assert!(delta::longpoll(&client, &cursor("stale")).await.is_err());
}
