//! Reconciler against a real HTTP fetcher and a JSON config file.

use lightsout::config::{
    CloudKnowledgeSource, ConfigDocument, ConfigStore, JsonConfigStore, KnowledgeItem,
};
use lightsout::events::EngineEvent;
use lightsout::sync::SyncReconciler;
use lightsout_fetch::{HttpFetcher, SourceRequest};
use std::sync::Arc;
use tokio::sync::broadcast;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Fixture {
    _dir: tempfile::TempDir,
    store: Arc<JsonConfigStore>,
    reconciler: SyncReconciler,
    events: broadcast::Receiver<EngineEvent>,
}

fn fixture(document: ConfigDocument) -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(JsonConfigStore::new(dir.path().join("config.json")));
    store.save(&document).expect("seed config");
    let fetcher = Arc::new(HttpFetcher::with_defaults().expect("fetcher"));
    let (tx, events) = broadcast::channel(16);
    let reconciler = SyncReconciler::new(store.clone(), fetcher, tx);
    Fixture {
        _dir: dir,
        store,
        reconciler,
        events,
    }
}

async fn serve_json(server: &MockServer, route: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn local_note() -> KnowledgeItem {
    KnowledgeItem::local("Me", "journal", "written by hand")
}

#[tokio::test]
async fn batch_with_one_failing_source_reports_each() {
    let server = MockServer::start().await;
    serve_json(
        &server,
        "/a.json",
        serde_json::json!([
            {"author": "A1", "source": "S", "content": "one"},
            {"author": "A2", "source": "S", "content": "two"}
        ]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/b.json"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    serve_json(
        &server,
        "/c.json",
        serde_json::json!({"knowledgeBase": [
            {"author": "C1", "source": "S", "content": "three"},
            {"author": "C2", "source": "S", "content": "four"},
            {"author": "C3", "source": "S", "content": "five"}
        ]}),
    )
    .await;

    let doc = ConfigDocument {
        knowledge_base: vec![local_note()],
        cloud_knowledge_sources: vec![
            CloudKnowledgeSource::new("a", "Source A", format!("{}/a.json", server.uri())),
            CloudKnowledgeSource::new("b", "Source B", format!("{}/b.json", server.uri())),
            CloudKnowledgeSource::new("c", "Source C", format!("{}/c.json", server.uri())),
        ],
        ..Default::default()
    };
    let mut fx = fixture(doc);

    let batch = fx.reconciler.sync_all().await;
    assert!(batch.success);
    assert_eq!(batch.total_count, 5);
    assert_eq!(batch.results.len(), 3);
    assert!(batch.results[0].result.success);
    assert!(!batch.results[1].result.success);
    assert_eq!(batch.results[1].result.message, "HTTP 500: Internal Server Error");
    assert!(batch.results[2].result.success);

    let saved = fx.store.load();
    assert_eq!(saved.items_from_source("a"), 2);
    assert_eq!(saved.items_from_source("b"), 0);
    assert_eq!(saved.items_from_source("c"), 3);
    assert!(saved.source("a").unwrap().last_sync_time.is_some());
    assert!(saved.source("b").unwrap().last_sync_time.is_none());
    assert_eq!(saved.knowledge_base[0], local_note());

    match fx.events.recv().await.expect("event") {
        EngineEvent::SyncCompleted { result } => assert_eq!(result, batch),
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn resync_replaces_previous_items() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"author": "Old", "source": "S", "content": "old-1"},
            {"author": "Old", "source": "S", "content": "old-2"},
            {"author": "Old", "source": "S", "content": "old-3"}
        ])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("New, S, new-1\nNew, S, new-2, with comma\n"),
        )
        .mount(&server)
        .await;

    let fx = fixture(ConfigDocument {
        knowledge_base: vec![local_note()],
        ..Default::default()
    });
    let source = SourceRequest::new("feed", "Feed", format!("{}/feed", server.uri()));

    assert_eq!(fx.reconciler.sync_source(&source).await.item_count, Some(3));
    let second = fx.reconciler.sync_source(&source).await;
    assert!(second.success);
    assert_eq!(second.item_count, Some(2));

    let saved = fx.store.load();
    let cloud: Vec<&str> = saved
        .knowledge_base
        .iter()
        .filter(|i| i.is_cloud())
        .map(|i| i.content.as_str())
        .collect();
    assert_eq!(cloud, vec!["new-1", "new-2,with comma"]);
    assert!(saved.knowledge_base.iter().all(|i| !i.is_cloud() || i.sync_time.is_some()));
    assert_eq!(saved.knowledge_base[0], local_note());
}

#[tokio::test]
async fn failing_resync_keeps_existing_items() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"author": "A", "source": "S", "content": "kept"}
        ])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let fx = fixture(ConfigDocument::default());
    let source = SourceRequest::new("feed", "Feed", format!("{}/feed", server.uri()));
    assert!(fx.reconciler.sync_source(&source).await.success);

    let result = fx.reconciler.sync_source(&source).await;
    assert!(!result.success);
    assert_eq!(result.message, "HTTP 503: Service Unavailable");
    assert_eq!(result.item_count, None);
    assert_eq!(fx.store.load().items_from_source("feed"), 1);
}

#[tokio::test]
async fn delete_all_spares_local_items_on_disk() {
    let server = MockServer::start().await;
    serve_json(
        &server,
        "/feed",
        serde_json::json!([{"author": "A", "source": "S", "content": "cloud"}]),
    )
    .await;

    let fx = fixture(ConfigDocument {
        knowledge_base: vec![local_note()],
        ..Default::default()
    });
    let source = SourceRequest::new("feed", "Feed", format!("{}/feed", server.uri()));
    fx.reconciler.sync_source(&source).await;

    let deleted = fx.reconciler.delete_all();
    assert!(deleted.success);
    assert_eq!(deleted.deleted_count, 1);

    let raw: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(fx.store.path()).expect("read config"),
    )
    .expect("parse config");
    let items = raw["knowledgeBase"].as_array().expect("knowledge base");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["content"], "written by hand");
}

#[test]
fn legacy_document_with_null_fields_survives_reconcile() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{
            "shutdownTimes": [{"time": "23:00:00", "weekdays": [5], "active": true}],
            "knowledgeBase": [{"author": "Me", "source": null, "content": "local note"}],
            "cloudKnowledgeSources": [{"id": "s1", "name": "One", "url": "http://one", "enabled": true}],
            "syncInterval": "30"
        }"#,
    )
    .expect("seed config");
    let store = Arc::new(JsonConfigStore::new(&path));
    let (tx, _rx) = broadcast::channel(16);
    let reconciler = SyncReconciler::new(
        store.clone(),
        Arc::new(HttpFetcher::with_defaults().expect("fetcher")),
        tx,
    );

    let result = reconciler.reconcile(
        "s1",
        "One",
        vec![lightsout_fetch::FetchedItem::new("A", "S", "from the cloud")],
    );
    assert!(result.success, "{}", result.message);

    let saved = store.load();
    assert_eq!(saved.shutdown_rules.len(), 1);
    assert_eq!(saved.knowledge_base.len(), 2);
    assert_eq!(saved.knowledge_base[0].content, "local note");
    assert!(!saved.knowledge_base[0].is_cloud());
    assert_eq!(saved.items_from_source("s1"), 1);
    assert!(saved.source("s1").expect("source kept").last_sync_time.is_some());
    assert_eq!(saved.sync_interval, 30);
}
