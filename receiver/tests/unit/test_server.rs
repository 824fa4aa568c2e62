//! HTTP surface tests

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;
use webhook_receiver::server::serve::router;
use webhook_receiver::server::state::ServerState;

use crate::common::{log_files, push_body, script_gate, script_options, sign, write_script};

fn app(script: &Path, log_dir: &Path, timeout: Duration) -> Router {
    let gate = script_gate(script_options(script.to_path_buf(), timeout), log_dir);
    router(Arc::new(ServerState::new(gate)))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn webhook(body: Vec<u8>, signature: Option<String>, event: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json")
        .header("X-GitHub-Event", event)
        .header("X-GitHub-Delivery", "72d3162e-cc78-11e3-81ab-4c9367dc0958");
    if let Some(signature) = signature {
        builder = builder.header("X-Hub-Signature-256", signature);
    }
    builder.body(Body::from(body)).unwrap()
}

fn signed_push(git_ref: &str) -> Request<Body> {
    let body = push_body(git_ref);
    let signature = sign(&body);
    webhook(body, Some(signature), "push")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(&tmp.path().join("deploy.sh"), tmp.path(), Duration::from_secs(5));

    let (status, body) = send(app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "webhook-receiver");
}

#[tokio::test]
async fn test_root_and_version() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(&tmp.path().join("deploy.sh"), tmp.path(), Duration::from_secs(5));

    let (status, body) = send(app.clone(), get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "webhook-receiver");
    assert!(body["endpoints"]
        .as_array()
        .unwrap()
        .contains(&Value::from("POST /webhook")));

    let (status, body) = send(app, get("/version")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_missing_signature_is_unauthorized() {
    let tmp = tempfile::tempdir().unwrap();
    let script = write_script(tmp.path(), "exit 0");
    let log_dir = tmp.path().join("logs");
    let app = app(&script, &log_dir, Duration::from_secs(5));

    let (status, body) = send(app, webhook(push_body("refs/heads/main"), None, "push")).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "error");
    assert!(body["message"].is_string());
    assert!(log_files(&log_dir).is_empty());
}

#[tokio::test]
async fn test_unprefixed_signature_is_unauthorized() {
    let tmp = tempfile::tempdir().unwrap();
    let script = write_script(tmp.path(), "exit 0");
    let app = app(&script, tmp.path(), Duration::from_secs(5));
    let body = push_body("refs/heads/main");
    let digest = sign(&body).trim_start_matches("sha256=").to_string();

    let (status, _) = send(app, webhook(body, Some(digest), "push")).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invalid_json_is_bad_request() {
    let tmp = tempfile::tempdir().unwrap();
    let script = write_script(tmp.path(), "exit 0");
    let log_dir = tmp.path().join("logs");
    let app = app(&script, &log_dir, Duration::from_secs(5));
    let body = b"ref=refs/heads/main".to_vec();
    let signature = sign(&body);

    let (status, body) = send(app, webhook(body, Some(signature), "push")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert!(log_files(&log_dir).is_empty());
}

#[tokio::test]
async fn test_non_main_push_is_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    let script = write_script(tmp.path(), "touch invoked\nexit 0");
    let log_dir = tmp.path().join("logs");
    std::fs::create_dir_all(&log_dir).unwrap();
    let app = app(&script, &log_dir, Duration::from_secs(5));

    let (status, body) = send(app, signed_push("refs/heads/feature")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "skipped");
    assert!(body["message"].as_str().unwrap().contains("non-main branch"));
    assert!(log_files(&log_dir).is_empty());
    assert!(!tmp.path().join("invoked").exists());
}

#[tokio::test]
async fn test_non_push_event_is_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    let script = write_script(tmp.path(), "exit 0");
    let app = app(&script, tmp.path(), Duration::from_secs(5));
    let body = br#"{"zen":"Keep it logically awesome.","hook_id":1}"#.to_vec();
    let signature = sign(&body);

    let (status, body) = send(app, webhook(body, Some(signature), "ping")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().unwrap().contains("non-push event"));
}

#[tokio::test]
async fn test_main_push_deploys() {
    let tmp = tempfile::tempdir().unwrap();
    let script = write_script(tmp.path(), "echo invoked >> invocations\nexit 0");
    let log_dir = tmp.path().join("logs");
    std::fs::create_dir_all(&log_dir).unwrap();
    let app = app(&script, &log_dir, Duration::from_secs(30));

    let (status, body) = send(app, signed_push("refs/heads/main")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["exit_code"], 0);
    assert!(body["log_file"].as_str().unwrap().contains("deploy_"));
    assert_eq!(log_files(&log_dir).len(), 1);

    let invocations = std::fs::read_to_string(tmp.path().join("invocations")).unwrap();
    assert_eq!(invocations.lines().count(), 1);
}

#[tokio::test]
async fn test_failing_script_is_server_error() {
    let tmp = tempfile::tempdir().unwrap();
    let script = write_script(tmp.path(), "exit 1");
    let log_dir = tmp.path().join("logs");
    std::fs::create_dir_all(&log_dir).unwrap();
    let app = app(&script, &log_dir, Duration::from_secs(30));

    let (status, body) = send(app, signed_push("refs/heads/main")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["exit_code"], 1);
    assert!(body["message"].is_string());
    assert!(body["log_file"].is_string());
}

#[tokio::test]
async fn test_hung_script_is_timeout() {
    let tmp = tempfile::tempdir().unwrap();
    let script = write_script(tmp.path(), "exec sleep 30");
    let log_dir = tmp.path().join("logs");
    std::fs::create_dir_all(&log_dir).unwrap();
    let app = app(&script, &log_dir, Duration::from_secs(1));

    let (status, body) = send(app, signed_push("refs/heads/main")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "timeout");
}

#[tokio::test]
async fn test_missing_script_is_server_error() {
    let tmp = tempfile::tempdir().unwrap();
    let log_dir = tmp.path().join("logs");
    std::fs::create_dir_all(&log_dir).unwrap();
    let app = app(&tmp.path().join("absent.sh"), &log_dir, Duration::from_secs(5));

    let (status, body) = send(app, signed_push("refs/heads/main")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().contains("absent.sh"));
    assert!(log_files(&log_dir).is_empty());
}

#[tokio::test]
async fn test_health_after_failures() {
    let tmp = tempfile::tempdir().unwrap();
    let script = write_script(tmp.path(), "exit 1");
    let app = app(&script, tmp.path(), Duration::from_secs(30));

    let _ = send(app.clone(), signed_push("refs/heads/main")).await;
    let _ = send(app.clone(), webhook(b"{}".to_vec(), None, "push")).await;
    let (status, _) = send(app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
}
