//! Web API Items Tests
//!
//! Integration tests for `GET /items`: stale-while-revalidate reads,
//! pagination bounds and query validation.

mod common;

use axum::http::StatusCode;
use common::{create_test_app, StubFetcher, BLOCKED_FEED, DOC_FEED, TWEET_FEED};
use feedmix::feed::ExposureStore;
use serde_json::Value;
use std::future::IntoFuture;
use std::time::Duration;

fn ids(body: &Value) -> Vec<String> {
    body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_empty_store_serves_empty_page_and_refreshes() {
    let app = create_test_app(&[DOC_FEED], StubFetcher::new(5)).await;

    let response = app
        .server
        .get("/items")
        .add_query_param("kind", "document")
        .await;
    response.assert_status_ok();
    let body = response.json::<Value>();
    assert_eq!(body["items"].as_array().unwrap().len(), 0);
    assert_eq!(body["refreshing"], true);
    assert_eq!(body["blocked"], false);

    app.wait_idle().await;
    assert_eq!(app.fetcher.calls(), 1);

    let response = app
        .server
        .get("/items")
        .add_query_param("kind", "document")
        .await;
    response.assert_status_ok();
    let body = response.json::<Value>();
    assert_eq!(body["refreshing"], false);
    assert_eq!(
        ids(&body),
        (0..5)
            .map(|i| format!("{DOC_FEED}#{i}"))
            .collect::<Vec<_>>()
    );
    assert_eq!(body["next_offset"], 5);
    assert_eq!(body["items"][0]["source_kind"], "document");
    assert_eq!(body["items"][0]["category"], "Tech");

    // Fresh data does not refetch
    assert_eq!(app.fetcher.calls(), 1);
}

#[tokio::test]
async fn test_offset_pages_and_end_of_data() {
    let app = create_test_app(&[DOC_FEED], StubFetcher::new(5)).await;
    app.server.post("/refresh").await;
    app.wait_idle().await;

    let first = app
        .server
        .get("/items?kind=document&limit=2&offset=0")
        .await
        .json::<Value>();
    let second = app
        .server
        .get("/items?kind=document&limit=2&offset=2")
        .await
        .json::<Value>();
    assert_eq!(ids(&first), vec![format!("{DOC_FEED}#0"), format!("{DOC_FEED}#1")]);
    assert_eq!(ids(&second), vec![format!("{DOC_FEED}#2"), format!("{DOC_FEED}#3")]);

    let past_end = app.server.get("/items?kind=document&offset=10000").await;
    past_end.assert_status_ok();
    let body = past_end.json::<Value>();
    assert!(body["items"].as_array().unwrap().is_empty());
    assert_eq!(body["next_offset"], 10000);
    assert_eq!(body["total"], 5);
}

#[tokio::test]
async fn test_feed_url_filter() {
    let app = create_test_app(&[DOC_FEED, "https://other.example/feed"], StubFetcher::new(3)).await;
    app.server.post("/refresh").await;
    app.wait_idle().await;

    let body = app
        .server
        .get("/items")
        .add_query_param("kind", "document")
        .add_query_param("feed_url", DOC_FEED)
        .await
        .json::<Value>();
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|item| item["source_url"] == DOC_FEED));
}

#[tokio::test]
async fn test_fresh_single_feed_without_kind_is_not_refetched() {
    let app = create_test_app(&[DOC_FEED, TWEET_FEED], StubFetcher::new(3)).await;
    app.server.post("/refresh").await;
    app.wait_idle().await;
    let calls = app.fetcher.calls();

    for _ in 0..3 {
        let body = app
            .server
            .get("/items")
            .add_query_param("feed_url", DOC_FEED)
            .await
            .json::<Value>();
        assert_eq!(body["items"].as_array().unwrap().len(), 3);
        assert_eq!(body["refreshing"], false);
        app.wait_idle().await;
    }

    let body = app
        .server
        .get("/items")
        .add_query_param("kind", "mixed")
        .add_query_param("feed_url", TWEET_FEED)
        .await
        .json::<Value>();
    assert_eq!(body["refreshing"], false);
    assert_eq!(body["items"][0]["source_kind"], "tweet-like");

    assert_eq!(app.fetcher.calls(), calls);
}

#[tokio::test]
async fn test_mixed_column_is_ranked_and_records_exposure() {
    let app = create_test_app(&[DOC_FEED, TWEET_FEED], StubFetcher::new(5)).await;
    app.server.post("/refresh").await;
    app.wait_idle().await;

    let response = app.server.get("/items?kind=mixed&limit=10").await;
    response.assert_status_ok();
    let body = response.json::<Value>();
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 10);

    // Documents carry the mixed-column boost
    assert_eq!(items[0]["source_kind"], "document");
    assert_eq!(items[0]["id"], format!("{DOC_FEED}#0"));

    let mut unique = ids(&body);
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 10);

    let records = app
        .exposure
        .get_many(&[DOC_FEED.to_string(), TWEET_FEED.to_string()])
        .await
        .unwrap();
    assert_eq!(records[DOC_FEED].show_count, 5);
    assert_eq!(records[TWEET_FEED].show_count, 5);
}

#[tokio::test]
async fn test_blocked_source_is_flagged() {
    let app = create_test_app(&[BLOCKED_FEED], StubFetcher::new(5)).await;
    app.server.post("/refresh").await;
    app.wait_idle().await;

    let body = app
        .server
        .get("/items")
        .add_query_param("kind", "document")
        .add_query_param("feed_url", BLOCKED_FEED)
        .await
        .json::<Value>();
    assert!(body["items"].as_array().unwrap().is_empty());
    assert_eq!(body["blocked"], true);
    app.wait_idle().await;
}

#[tokio::test]
async fn test_concurrent_reads_share_one_refresh() {
    let app = create_test_app(
        &[DOC_FEED],
        StubFetcher::with_delay(5, Duration::from_millis(200)),
    )
    .await;

    let requests = (0..8).map(|_| app.server.get("/items?kind=document").into_future());
    let responses = futures::future::join_all(requests).await;
    for response in &responses {
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["refreshing"], true);
    }

    app.wait_idle().await;
    assert_eq!(app.fetcher.calls(), 1);
}

#[tokio::test]
async fn test_unknown_kind_is_bad_request() {
    let app = create_test_app(&[DOC_FEED], StubFetcher::new(1)).await;

    let response = app.server.get("/items?kind=podcast").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body = response.json::<Value>();
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert_eq!(app.fetcher.calls(), 0);
}

#[tokio::test]
async fn test_limit_validation() {
    let app = create_test_app(&[DOC_FEED], StubFetcher::new(1)).await;

    let response = app.server.get("/items?kind=document&limit=0").await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body = response.json::<Value>();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert!(body["error"]["details"]["limit"].is_array());

    // Above the configured max_limit of 50
    let response = app.server.get("/items?kind=document&limit=51").await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    let response = app.server.get("/items?kind=document&offset=-1").await;
    response.assert_status(StatusCode::BAD_REQUEST);
}
