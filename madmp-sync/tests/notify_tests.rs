//! Integration tests for the DMP tool client and the event observer
//!
//! The DMP tool is replaced by a wiremock server.

use std::sync::Arc;

use madmp_common::config::DmpToolConfig;
use madmp_common::db::init_memory_database;
use madmp_common::madmp::Dmp;
use madmp_common::{EventBus, MadmpConfig};
use madmp_sync::convert::ConverterRegistry;
use madmp_sync::notify::{DmpToolClient, NotifyError, NotifyPolicy, Observer};
use madmp_sync::repository::{records, users};
use madmp_sync::store::{Dataset, Store};
use madmp_sync::{Reconciler, SyncMode};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn tool_config(base: &str, token: Option<&str>) -> DmpToolConfig {
    DmpToolConfig {
        token: token.map(str::to_string),
        dataset_endpoint_url: format!("{}/api/datasets/{{}}", base),
        datasets_endpoint_url: format!("{}/api/datasets", base),
        dmp_endpoint_url: format!("{}/api/dmps/%s", base),
        dmps_endpoint_url: format!("{}/api/dmps", base),
        timeout_ms: 2_000,
        send_notifications: true,
    }
}

fn fragment(dataset_id: &str) -> Value {
    json!({
        "distribution": [{"title": "T"}],
        "dataset_id": [{"identifier": dataset_id, "type": "other"}],
        "metadata": [],
    })
}

#[tokio::test]
async fn test_update_uses_dataset_endpoint_and_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/api/datasets/ds-1"))
        .and(header("authorization", "Bearer s3cret"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = DmpToolClient::new(&tool_config(&server.uri(), Some("s3cret")), NotifyPolicy::Suppress).unwrap();
    let sent = client.send_distribution_update("ds-1", &fragment("ds-1")).await.unwrap();

    assert!(sent);
}

#[tokio::test]
async fn test_no_token_means_no_authorization_header() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/datasets/ds-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = DmpToolClient::new(&tool_config(&server.uri(), None), NotifyPolicy::Suppress).unwrap();
    assert!(client.send_distribution_deletion("ds-1", &fragment("ds-1")).await.unwrap());

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_complex_ids_go_to_collection_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/api/datasets"))
        .and(body_partial_json(json!({"dataset_id": [{"identifier": "10.1234/abc"}]})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = DmpToolClient::new(&tool_config(&server.uri(), None), NotifyPolicy::Suppress).unwrap();
    assert!(client
        .send_distribution_update("10.1234/abc", &fragment("10.1234/abc"))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_complex_id_without_body_id_is_not_sent() {
    let server = MockServer::start().await;
    let client = DmpToolClient::new(&tool_config(&server.uri(), None), NotifyPolicy::Suppress).unwrap();

    let sent = client
        .send_distribution_update("10.1234/abc", &json!({"distribution": []}))
        .await
        .unwrap();

    assert!(!sent);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_dataset_addition_posts_to_dmp_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/dmps/dmp-1"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let client = DmpToolClient::new(&tool_config(&server.uri(), None), NotifyPolicy::Suppress).unwrap();
    assert!(client.send_dataset_addition("dmp-1", &fragment("ds-1")).await.unwrap());
}

#[tokio::test]
async fn test_error_status_reports_false() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = DmpToolClient::new(&tool_config(&server.uri(), None), NotifyPolicy::Raise).unwrap();
    assert!(!client.send_distribution_update("ds-1", &fragment("ds-1")).await.unwrap());
}

#[tokio::test]
async fn test_unreachable_tool_follows_policy() {
    let config = tool_config("http://127.0.0.1:1", None);

    let suppressing = DmpToolClient::new(&config, NotifyPolicy::Suppress).unwrap();
    assert!(!suppressing
        .send_distribution_update("ds-1", &fragment("ds-1"))
        .await
        .unwrap());

    let raising = DmpToolClient::new(&config, NotifyPolicy::Raise).unwrap();
    let err = raising
        .send_distribution_update("ds-1", &fragment("ds-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, NotifyError::Connection { .. }));
}

struct Harness {
    store: Store,
    reconciler: Reconciler,
    observer: Observer,
}

async fn harness(server: &MockServer, send_notifications: bool) -> Harness {
    let mut config = MadmpConfig::default();
    config.host.url = Some("https://repo.example".to_string());
    config.dmp_tool = tool_config(&server.uri(), Some("s3cret"));
    config.dmp_tool.send_notifications = send_notifications;
    let config = Arc::new(config);

    let pool = init_memory_database().await.unwrap();
    let store = Store::new(pool, EventBus::new(64));
    let mut conn = store.acquire().await.unwrap();
    users::create_user(&mut conn, "a@x.org").await.unwrap();
    drop(conn);

    let converters = Arc::new(ConverterRegistry::from_config(&config).unwrap());
    let reconciler = Reconciler::new(config.clone(), converters.clone(), store.clone());
    let client = DmpToolClient::new(&config.dmp_tool, NotifyPolicy::Suppress).unwrap();
    let observer = Observer::new(store.clone(), converters, client);

    Harness {
        store,
        reconciler,
        observer,
    }
}

fn document() -> Dmp {
    serde_json::from_value(json!({
        "dmp_id": {"identifier": "dmp-1"},
        "contact": {"mbox": "a@x.org"},
        "contributor": [{"name": "A B", "role": ["owner"]}],
        "dataset": [{
            "dataset_id": {"identifier": "ds-1"},
            "title": "T",
            "distribution": [{"host": {"url": "https://repo.example"}, "data_access": "open"}]
        }]
    }))
    .unwrap()
}

#[tokio::test]
async fn test_observer_announces_new_dataset() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/dmps/dmp-1"))
        .and(header("authorization", "Bearer s3cret"))
        .and(body_partial_json(json!({"distribution": [{"title": "T", "data_access": "open"}]})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, true).await;
    let outcome = h.reconciler.reconcile(&document(), SyncMode::Soft, None).await.unwrap();

    let delivered = h.observer.drain(&outcome.events).await;
    assert_eq!(delivered, 1);

    let requests = server.received_requests().await.unwrap();
    let body: Value = requests[0].body_json().unwrap();
    let access_url = body["distribution"][0]["access_url"].as_str().unwrap();
    assert!(access_url.starts_with("https://repo.example/records/"));
}

#[tokio::test]
async fn test_observer_patches_on_hard_sync_and_deletes_on_record_removal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/datasets/ds-1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/datasets/ds-1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, true).await;
    h.reconciler.reconcile(&document(), SyncMode::Soft, None).await.unwrap();

    let outcome = h.reconciler.reconcile(&document(), SyncMode::Hard, None).await.unwrap();
    assert_eq!(h.observer.drain(&outcome.events).await, 1);

    let mut uow = h.store.begin().await.unwrap();
    let dataset = Dataset::get_by_dataset_id(uow.conn(), "ds-1").await.unwrap().unwrap();
    let record = dataset.record(uow.conn()).await.unwrap().unwrap();
    records::delete_record(&mut uow, record.id).await.unwrap();
    let events = uow.commit().await.unwrap();

    assert_eq!(h.observer.drain(&events).await, 1);
}

#[tokio::test]
async fn test_observer_stays_quiet_when_disabled() {
    let server = MockServer::start().await;

    let h = harness(&server, false).await;
    let outcome = h.reconciler.reconcile(&document(), SyncMode::Soft, None).await.unwrap();

    assert_eq!(h.observer.drain(&outcome.events).await, 0);
    assert!(server.received_requests().await.unwrap().is_empty());
}
