//! Integration tests for the madmp-sync HTTP API
//!
//! Tests cover:
//! - Health endpoint (no auth required)
//! - Bearer token middleware
//! - DMP reconciliation, listing and deletion
//! - Zombie and orphan listings
//! - Error responses per failure class

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use madmp_common::db::init_memory_database;
use madmp_common::{EventBus, MadmpConfig};
use madmp_sync::repository::{records, users};
use madmp_sync::store::{Dataset, Store};
use madmp_sync::{build_router, AppState, Reconciler};
use serde_json::{json, Value};
use tower::util::ServiceExt; // for `oneshot` method

const TOKEN: &str = "s3cret";

/// Test helper: in-memory state with user `a@x.org`
async fn setup_state(token: Option<&str>) -> AppState {
    let mut config = MadmpConfig::default();
    config.host.url = Some("https://repo.example".to_string());
    config.dmp_tool.token = token.map(str::to_string);
    let config = Arc::new(config);

    let pool = init_memory_database().await.expect("in-memory database");
    let store = Store::new(pool, EventBus::new(64));

    let mut conn = store.acquire().await.unwrap();
    users::create_user(&mut conn, "a@x.org").await.unwrap();
    drop(conn);

    let reconciler = Reconciler::from_config(config.clone(), store.clone()).unwrap();
    AppState::new(store, config, reconciler)
}

/// Test helper: request carrying the bearer token
fn authed(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", TOKEN))
        .header("content-type", "application/json");

    match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Test helper: Extract JSON body from response
async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

async fn call(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
    let response = build_router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    (status, extract_json(response.into_body()).await)
}

fn document(dmp_id: &str, distributions: Value) -> Value {
    json!({
        "dmp": {
            "dmp_id": {"identifier": dmp_id},
            "contact": {"mbox": "a@x.org"},
            "contributor": [{"name": "A B", "mbox": "a@x.org", "role": ["owner"]}],
            "dataset": [{
                "dataset_id": {"identifier": "ds-1"},
                "title": "T",
                "distribution": distributions
            }]
        }
    })
}

fn hosted() -> Value {
    json!([{"host": {"url": "https://repo.example"}, "data_access": "open"}])
}

// =============================================================================
// Health and authentication
// =============================================================================

#[tokio::test]
async fn test_health_endpoint_no_auth_required() {
    let state = setup_state(Some(TOKEN)).await;

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = call(&state, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "madmp-sync");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_missing_token_is_rejected() {
    let state = setup_state(Some(TOKEN)).await;

    let request = Request::builder().uri("/dmps").body(Body::empty()).unwrap();
    let (status, body) = call(&state, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_wrong_token_is_rejected() {
    let state = setup_state(Some(TOKEN)).await;

    let request = Request::builder()
        .uri("/dmps")
        .header("authorization", "Bearer nope")
        .body(Body::empty())
        .unwrap();
    let (status, _) = call(&state, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_disabled_without_configured_token() {
    let state = setup_state(None).await;

    let request = Request::builder().uri("/dmps").body(Body::empty()).unwrap();
    let (status, body) = call(&state, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

// =============================================================================
// Reconciliation
// =============================================================================

#[tokio::test]
async fn test_post_dmp_creates_then_updates() {
    let state = setup_state(Some(TOKEN)).await;

    let (status, body) = call(&state, authed("POST", "/dmps", Some(document("dmp-1", hosted())))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["dmp"]["dmp_id"], "dmp-1");
    assert_eq!(body["created_records"], json!(["ds-1"]));

    let (status, body) = call(&state, authed("POST", "/dmps", Some(document("dmp-1", hosted())))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dmp_created"], false);
    assert_eq!(body["created_records"], json!([]));

    let (status, body) = call(
        &state,
        authed("POST", "/dmps?sync=hard", Some(document("dmp-1", hosted()))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated_records"], json!(["ds-1"]));
}

#[tokio::test]
async fn test_dry_run_commits_nothing() {
    let state = setup_state(Some(TOKEN)).await;

    let (status, body) = call(
        &state,
        authed("POST", "/dmps?dry_run=true", Some(document("dmp-1", hosted()))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["committed"], false);
    assert_eq!(body["created_records"], json!(["ds-1"]));

    let (_, list) = call(&state, authed("GET", "/dmps", None)).await;
    assert_eq!(list, json!([]));
}

#[tokio::test]
async fn test_malformed_body_is_a_document_error() {
    let state = setup_state(Some(TOKEN)).await;

    let request = Request::builder()
        .method("POST")
        .uri("/dmps")
        .header("authorization", format!("Bearer {}", TOKEN))
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = call(&state, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_DOCUMENT");
}

#[tokio::test]
async fn test_unknown_sync_mode_is_rejected() {
    let state = setup_state(Some(TOKEN)).await;

    let (status, body) = call(
        &state,
        authed("POST", "/dmps?sync=medium", Some(document("dmp-1", hosted()))),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].as_str().unwrap().contains("medium"));
}

#[tokio::test]
async fn test_ambiguous_distributions_are_unprocessable() {
    let state = setup_state(Some(TOKEN)).await;
    let two = json!([
        {"host": {"url": "https://repo.example"}},
        {"host": {"url": "https://repo.example"}}
    ]);

    let (status, body) = call(&state, authed("POST", "/dmps", Some(document("dmp-1", two)))).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "AMBIGUOUS_DISTRIBUTION");
    assert!(body["error"]["message"].as_str().unwrap().contains("ds-1"));
}

#[tokio::test]
async fn test_unknown_contributor_is_unprocessable() {
    let state = setup_state(Some(TOKEN)).await;
    let mut doc = document("dmp-1", hosted());
    doc["dmp"]["contributor"][0]["mbox"] = json!("stranger@y.org");

    let (status, body) = call(&state, authed("POST", "/dmps", Some(doc))).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "IDENTITY_RESOLUTION");
    assert!(body["error"]["message"].as_str().unwrap().contains("stranger@y.org"));
}

// =============================================================================
// Listings and deletion
// =============================================================================

#[tokio::test]
async fn test_get_dmp_and_not_found() {
    let state = setup_state(Some(TOKEN)).await;
    call(&state, authed("POST", "/dmps", Some(document("dmp-1", hosted())))).await;

    let (status, body) = call(&state, authed("GET", "/dmps/dmp-1", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dmp_id"], "dmp-1");
    assert_eq!(body["datasets"][0]["dataset_id"], "ds-1");
    assert_eq!(body["datasets"][0]["status"], "linked");
    assert!(body["datasets"][0]["record_pid"].as_str().unwrap().starts_with("recid:"));

    let (status, body) = call(&state, authed("GET", "/dmps/missing", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_delete_dmp_keeps_datasets() {
    let state = setup_state(Some(TOKEN)).await;
    call(&state, authed("POST", "/dmps", Some(document("dmp-1", hosted())))).await;

    let (status, body) = call(&state, authed("DELETE", "/dmps/dmp-1", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["unlinked"], json!(["ds-1"]));

    let (_, list) = call(&state, authed("GET", "/dmps", None)).await;
    assert_eq!(list, json!([]));

    let mut conn = state.store.acquire().await.unwrap();
    assert!(Dataset::get_by_dataset_id(&mut conn, "ds-1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_zombie_listing() {
    let state = setup_state(Some(TOKEN)).await;
    call(&state, authed("POST", "/dmps", Some(document("dmp-1", hosted())))).await;

    let (_, zombies) = call(&state, authed("GET", "/datasets/zombies", None)).await;
    assert_eq!(zombies, json!([]));

    let mut uow = state.store.begin().await.unwrap();
    let dataset = Dataset::get_by_dataset_id(uow.conn(), "ds-1").await.unwrap().unwrap();
    let record = dataset.record(uow.conn()).await.unwrap().unwrap();
    records::delete_record(&mut uow, record.id).await.unwrap();
    uow.commit().await.unwrap();

    let (status, zombies) = call(&state, authed("GET", "/datasets/zombies", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(zombies[0]["dataset_id"], "ds-1");
    assert_eq!(zombies[0]["status"], "zombie");

    let (_, orphans) = call(&state, authed("GET", "/datasets/orphans", None)).await;
    assert_eq!(orphans, json!([]));
}
