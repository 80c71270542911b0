//! HTTP trigger surface tests

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;

use fiinny_ingest::db::{DocPath, DocumentStore, MemoryDocumentStore};
use fiinny_ingest::services::{HeuristicClassifier, IngestPipeline, PipelineSettings};
use fiinny_ingest::AppState;

/// Test helper: app over an in-memory store
fn create_test_app() -> (axum::Router, Arc<MemoryDocumentStore>) {
    let store = Arc::new(MemoryDocumentStore::new());
    let pipeline = IngestPipeline::new(
        store.clone(),
        Arc::new(HeuristicClassifier),
        PipelineSettings::default(),
    );
    let app = fiinny_ingest::build_router(AppState::new(Arc::new(pipeline)));
    (app, store)
}

fn post_event(body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/events/ingest-job-created")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

async fn seed_record(store: &MemoryDocumentStore, owner: &str, tx_key: &str) -> DocPath {
    let id = fiinny_common::record_id_from_tx_key(tx_key);
    let path = DocPath::parse(&format!("users/{}/expenses/{}", owner, id)).unwrap();
    let record = json!({ "amount": 250 }).as_object().cloned().unwrap();
    store.put(&path, record).await.unwrap();
    path
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _store) = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "fiinny-ingest");
    assert_eq!(json["jobs_processed"], 0);
    assert_eq!(json["classifier"], "heuristic");
    assert!(json.get("last_error").is_none());
}

#[tokio::test]
async fn test_event_with_snapshot_is_processed() {
    let (app, store) = create_test_app();
    let record_path = seed_record(&store, "u1", "abc").await;

    let body = json!({
        "owner": "u1",
        "jobId": "abc",
        "job": { "txKey": "abc", "text": "UBER TRIP 250", "amount": 250 }
    });
    let response = app
        .clone()
        .oneshot(post_event(body.to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["jobPath"], "users/u1/ingest_jobs/abc");
    assert_eq!(json["outcome"], "done");
    assert_eq!(json["status"], "done");

    let record = store.get(&record_path).await.unwrap().unwrap();
    assert_eq!(record["category"], "Transport");
    assert_eq!(record["merchant"], "Uber");

    // Redelivery of the same event
    let response = app
        .clone()
        .oneshot(post_event(body.to_string()))
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["outcome"], "skipped");
    assert_eq!(json["status"], "done");

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["jobs_processed"], 2);
}

#[tokio::test]
async fn test_pipeline_failure_still_answers_ok() {
    let (app, store) = create_test_app();

    let body = json!({
        "jobPath": "users/u1/ingest_jobs/bad",
        "job": { "txKey": "bad", "amount": 10 }
    });
    let response = app.oneshot(post_event(body.to_string())).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["outcome"], "failed");

    let job_path = DocPath::parse("users/u1/ingest_jobs/bad").unwrap();
    let job = store.get(&job_path).await.unwrap().unwrap();
    assert_eq!(job["status"], "failed");
    assert!(job["lastError"]
        .as_str()
        .unwrap()
        .starts_with("Bad job payload"));
}

#[tokio::test]
async fn test_malformed_envelope_is_bad_request() {
    let (app, _store) = create_test_app();

    let response = app
        .clone()
        .oneshot(post_event("{ not json".to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "BAD_REQUEST");
    assert!(!json["error"]["message"]
        .as_str()
        .unwrap()
        .starts_with("Invalid request"));

    let response = app
        .oneshot(post_event(json!({ "owner": "u1" }).to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_job_without_snapshot_is_not_found() {
    let (app, _store) = create_test_app();

    let response = app
        .clone()
        .oneshot(post_event(
            json!({ "owner": "u1", "jobId": "ghost" }).to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "NOT_FOUND");
    assert_eq!(
        json["error"]["message"],
        "Job document not found: users/u1/ingest_jobs/ghost"
    );

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = json_body(response).await;
    assert!(json["last_error"]
        .as_str()
        .unwrap()
        .contains("users/u1/ingest_jobs/ghost"));
}
