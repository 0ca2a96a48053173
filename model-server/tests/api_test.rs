//! Integration tests for the model-server HTTP API.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use clap::Parser;
use serde_json::{json, Value};
use tower::ServiceExt;

use model_server::plugin::builtin_catalog;
use model_server::{api, server, AppState, ServerArgs};

async fn state_for(extra: &[&str]) -> Arc<AppState> {
    let mut argv = vec!["model-server"];
    argv.extend_from_slice(extra);
    let args = ServerArgs::try_parse_from(argv).unwrap().validated().unwrap();
    server::build_state(&args, &builtin_catalog()).await.unwrap()
}

async fn call(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_get_paths() {
    let state = state_for(&["--worker-name", "dummy_model_b", "--nr-workers", "1"]).await;
    let req = Request::builder()
        .uri("/get_paths")
        .body(Body::empty())
        .unwrap();
    let (status, json) = call(api::router(state), req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"PATHS": ["/run", "/notifications", "/update_workers"]}));
}

#[tokio::test]
async fn test_run_stamps_answer() {
    let state = state_for(&[
        "--worker-name",
        "dummy_model_b",
        "--nr-workers",
        "2",
        "--config-endpoint",
        r#"{"WEIGHT": 2, "BIAS": 1}"#,
    ])
    .await;
    let app = api::router(state.clone());

    let (status, json) = call(app, post_json("/run", json!({"INPUT_VALUE": 5}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["dummy_model_predict"], "5*2 + 1 = 11 PREDICTED");
    assert_eq!(json["call_id"], 1);
    assert!(json["time"].is_string());

    let signature = json["signature"].as_str().unwrap();
    assert!(signature.starts_with("dummy_model_b:DummyModelBWorker:"));
    assert_eq!(state.pool.busy_count(), 0);
}

#[tokio::test]
async fn test_run_worker_error_envelope() {
    let state = state_for(&["--worker-name", "dummy_model_b", "--nr-workers", "1"]).await;
    let (status, json) = call(
        api::router(state),
        post_json("/run", json!({"client": "tester", "OTHER": 1})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["ERROR_TYPE"], "bad_input");
    assert_eq!(json["client"], "tester");
    assert_eq!(json["call_id"], 1);
    assert_eq!(json["input"]["OTHER"], 1);
}

#[tokio::test]
async fn test_options_does_not_dispatch() {
    let state = state_for(&["--worker-name", "dummy_model_b", "--nr-workers", "1"]).await;
    let req = Request::builder()
        .method("OPTIONS")
        .uri("/run")
        .body(Body::empty())
        .unwrap();
    let response = api::router(state.clone()).oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(state.pool.drain_worker_notifications().is_empty());
    assert_eq!(state.next_call_id(), 1);
}

#[tokio::test]
async fn test_update_workers() {
    let state = state_for(&["--worker-name", "dummy_model_a", "--nr-workers", "1"]).await;

    let (status, json) = call(
        api::router(state.clone()),
        post_json("/update_workers", json!({"NR_WORKERS": 4})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["MESSAGE"], "OK");
    assert_eq!(state.pool.size(), 4);

    let req = Request::builder()
        .uri("/update_workers?NR_WORKERS=2")
        .body(Body::empty())
        .unwrap();
    let (_, json) = call(api::router(state.clone()), req).await;
    assert_eq!(json["MESSAGE"], "OK");
    assert_eq!(state.pool.size(), 2);
}

#[tokio::test]
async fn test_update_workers_zero_keeps_one() {
    let state = state_for(&["--worker-name", "dummy_model_a", "--nr-workers", "3"]).await;

    let (status, json) = call(
        api::router(state.clone()),
        post_json("/update_workers", json!({"NR_WORKERS": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["MESSAGE"], "OK");
    assert_eq!(state.pool.size(), 1);
}

#[tokio::test]
async fn test_update_workers_missing_field() {
    let state = state_for(&["--worker-name", "dummy_model_a", "--nr-workers", "1"]).await;
    let (status, json) = call(
        api::router(state),
        post_json("/update_workers", json!({"WORKERS": 4})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["ERROR"], "Bad input. 'NR_WORKERS' not found");
}

#[tokio::test]
async fn test_notifications_grouped_and_drained() {
    let state = state_for(&["--worker-name", "dummy_model_b", "--nr-workers", "1"]).await;

    call(
        api::router(state.clone()),
        post_json("/run", json!({"INPUT_VALUE": 1})),
    )
    .await;

    let req = Request::builder()
        .uri("/notifications")
        .body(Body::empty())
        .unwrap();
    let (status, json) = call(api::router(state.clone()), req).await;
    assert_eq!(status, StatusCode::OK);

    let general = json["GENERAL"].as_array().unwrap();
    assert!(general
        .iter()
        .any(|n| n["NOTIF"].as_str().unwrap().starts_with("Created 1 new workers")));
    assert!(general
        .iter()
        .any(|n| n["NOTIF"].as_str().unwrap().starts_with("Predicting on usr_input")));

    let per_call = json["1"].as_array().unwrap();
    assert!(per_call
        .iter()
        .any(|n| n["NOTIF"].as_str().unwrap().starts_with("Received 'POST' request 1")));
    assert!(per_call.iter().all(|n| n["NOTIFICATION_TYPE"] == "log"));

    let req = Request::builder()
        .uri("/notifications")
        .body(Body::empty())
        .unwrap();
    let (_, json) = call(api::router(state), req).await;
    assert_eq!(json, json!({"GENERAL": []}));
}
