//! HTTP contract tests for the knowledge-source fetcher.

use lightsout_fetch::{FetchConfig, FetchError, FetchedItem, HttpFetcher, SourceRequest};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn source_at(server: &MockServer, route: &str) -> SourceRequest {
    SourceRequest::new("src-1", "Test Source", format!("{}{route}", server.uri()))
}

#[tokio::test]
async fn fetches_json_array() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/kb.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"author": "Ada", "source": "Notes", "content": "Engines"},
            {"author": "Grace", "content": "Compilers", "year": 1952},
            {"title": "no author"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::with_defaults().unwrap();
    let items = fetcher.fetch(&source_at(&server, "/kb.json")).await.unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0], FetchedItem::new("Ada", "Notes", "Engines"));
    assert_eq!(items[1].extra.get("year"), Some(&json!(1952)));
}

#[tokio::test]
async fn fetches_wrapped_knowledge_base() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wrapped"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "version": 3,
            "knowledgeBase": [{"author": "A", "content": "C"}]
        })))
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::with_defaults().unwrap();
    let items = fetcher.fetch(&source_at(&server, "/wrapped")).await.unwrap();
    assert_eq!(items, vec![FetchedItem::new("A", "", "C")]);
}

#[tokio::test]
async fn falls_back_to_delimited_text() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/kb.csv"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("A,B,C,D\nshort,line\nE,F,G\n"),
        )
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::with_defaults().unwrap();
    let items = fetcher.fetch(&source_at(&server, "/kb.csv")).await.unwrap();
    assert_eq!(
        items,
        vec![FetchedItem::new("A", "B", "C,D"), FetchedItem::new("E", "F", "G")]
    );
}

#[tokio::test]
async fn non_success_status_is_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("[]"))
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::with_defaults().unwrap();
    let err = fetcher
        .fetch(&source_at(&server, "/missing"))
        .await
        .unwrap_err();
    match err {
        FetchError::Http { status, reason } => {
            assert_eq!(status, 404);
            assert_eq!(reason, "Not Found");
        }
        other => panic!("expected HTTP error, got {other:?}"),
    }
}

#[tokio::test]
async fn slow_server_times_out_as_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("[]")
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(FetchConfig {
        timeout_seconds: 1,
        ..Default::default()
    })
    .unwrap();
    let err = fetcher.fetch(&source_at(&server, "/slow")).await.unwrap_err();
    match err {
        FetchError::Network(msg) => assert!(msg.contains("timed out"), "message was: {msg}"),
        other => panic!("expected network error, got {other:?}"),
    }
}

#[tokio::test]
async fn refused_connection_is_network_error() {
    // Grab a free port, then close it so nothing is listening there.
    let uri = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        format!("http://{}", listener.local_addr().unwrap())
    };

    let fetcher = HttpFetcher::with_defaults().unwrap();
    let err = fetcher
        .fetch(&SourceRequest::new("gone", "Gone", format!("{uri}/kb.json")))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Network(_)), "got {err:?}");
}

#[tokio::test]
async fn json_of_wrong_shape_reports_no_items() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/odd"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::with_defaults().unwrap();
    let err = fetcher.fetch(&source_at(&server, "/odd")).await.unwrap_err();
    assert!(matches!(err, FetchError::NoItems));
}
