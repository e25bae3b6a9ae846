//! Router tests against a temporary artifact directory.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use nowcast_common::LockSettings;
use nowcast_viewer::{create_router, ViewerState};
use tower::ServiceExt;

fn app(dir: &Path) -> Router {
    let lock = LockSettings {
        path: dir.join("lock_file.txt"),
        retries: 2,
        retry_delay: Duration::from_millis(5),
    };
    create_router(Arc::new(ViewerState::new(dir.to_path_buf(), lock)))
}

async fn get(app: Router, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, content_type, body.to_vec())
}

#[tokio::test]
async fn test_health() {
    let dir = tempfile::tempdir().unwrap();
    let (status, _, body) = get(app(dir.path()), "/health").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_last_forecast_prefers_png() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("last_forecast.npy"), b"npy").unwrap();

    let (status, content_type, body) = get(app(dir.path()), "/last_forecast").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/octet-stream"));
    assert_eq!(body, b"npy");

    fs::write(dir.path().join("last_forecast.png"), b"png").unwrap();
    let (status, content_type, body) = get(app(dir.path()), "/last_forecast").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("image/png"));
    assert_eq!(body, b"png");

    // the read lock is released afterwards
    assert!(!dir.path().join("lock_file.txt").exists());
}

#[tokio::test]
async fn test_last_error_falls_back_to_json() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("last_error.json"), br#"[{"lead_minutes":5}]"#).unwrap();

    let (status, content_type, _) = get(app(dir.path()), "/last_error").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/json"));
}

#[tokio::test]
async fn test_missing_artifacts_are_404() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(get(app(dir.path()), "/last_gif").await.0, StatusCode::NOT_FOUND);
    assert_eq!(
        get(app(dir.path()), "/artifacts/2024-01-15_12h05/forecast.npy").await.0,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        get(app(dir.path()), "/view_image/forecast.npy").await.0,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_run_artifact_served() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("2024-01-15_12h05")).unwrap();
    fs::write(dir.path().join("2024-01-15_12h05/manifest.json"), b"{}").unwrap();
    fs::write(dir.path().join("radar.gif"), b"GIF89a").unwrap();

    let (status, content_type, body) =
        get(app(dir.path()), "/artifacts/2024-01-15_12h05/manifest.json").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/json"));
    assert_eq!(body, b"{}");

    let (status, content_type, _) = get(app(dir.path()), "/view_gif/radar.gif").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("image/gif"));
}

#[tokio::test]
async fn test_path_traversal_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let inner = dir.path().join("output");
    fs::create_dir(&inner).unwrap();
    fs::write(dir.path().join("secret.png"), b"secret").unwrap();

    for uri in [
        "/view_image/..%2Fsecret.png",
        "/view_gif/..%2F..%2Fetc%2Fpasswd.gif",
        "/artifacts/..%2F..%2Fetc/passwd",
        "/artifacts/..%2F/secret.png",
        "/view_image/.hidden.png",
    ] {
        let (status, _, body) = get(app(&inner), uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_ne!(body, b"secret");
    }
}

#[tokio::test]
async fn test_busy_lock_is_503() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("last_forecast.npy"), b"npy").unwrap();
    fs::write(dir.path().join("lock_file.txt"), b"4242").unwrap();

    let (status, _, _) = get(app(dir.path()), "/last_forecast").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    // someone else's lock is left alone
    assert!(dir.path().join("lock_file.txt").exists());
}

#[tokio::test]
async fn test_index_lists_runs_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    for run in ["2024-01-15_12h00", "2024-01-15_12h10", "2024-01-15_12h05"] {
        fs::create_dir(dir.path().join(run)).unwrap();
        fs::write(dir.path().join(run).join("forecast.npy"), b"x").unwrap();
    }

    let (status, _, body) = get(app(dir.path()), "/").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let runs: Vec<&str> = json["runs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert_eq!(runs, vec!["2024-01-15_12h10", "2024-01-15_12h05", "2024-01-15_12h00"]);
}

#[tokio::test]
async fn test_metrics_without_exporter() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(get(app(dir.path()), "/metrics").await.0, StatusCode::NOT_FOUND);
}
