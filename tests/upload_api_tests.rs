use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use uploadthing_server::models::FileInfo;
use uploadthing_server::router::config::{FileTypeKey, RouteConfig};
use uploadthing_server::upload_api::{
    HostedApi, LocalApi, LocalUploadStatus, PrepareUpload, UploadApi, UploadApiError,
};

const API_KEY: &str = "sk_test_123";

fn prepare(files: Vec<FileInfo>) -> PrepareUpload {
    PrepareUpload {
        files,
        route_config: RouteConfig::from_types([FileTypeKey::Image, FileTypeKey::Blob]).expand(),
        metadata: json!({ "userId": "u1" }),
        callback_url: "http://localhost:3000/api/uploadthing".to_string(),
        callback_slug: "imageUploader".to_string(),
        adapter: "test".to_string(),
    }
}

// ============================================================================
// LocalApi
// ============================================================================

#[tokio::test]
async fn test_local_prepare_upload() {
    let api = LocalApi::new("http://files.test/f/");
    let uploads = api
        .prepare_upload(prepare(vec![
            FileInfo::new("cat.jpg", 100),
            FileInfo::new("data.bin", 5).with_type("application/x-custom"),
        ]))
        .await
        .unwrap();

    assert_eq!(uploads.len(), 2);
    assert_eq!(uploads[0].file_type, "image/jpeg");
    assert_eq!(uploads[0].url, format!("http://files.test/f/upload/{}", uploads[0].key));
    assert_eq!(uploads[0].file_url, format!("http://files.test/f/{}", uploads[0].key));
    assert_eq!(uploads[1].file_type, "application/x-custom");
    assert_ne!(uploads[0].key, uploads[1].key);

    let stored = api.get(&uploads[0].key).await.unwrap();
    assert_eq!(stored.status, LocalUploadStatus::Pending);
    assert_eq!(stored.metadata, json!({ "userId": "u1" }));
    assert_eq!(stored.callback_slug, "imageUploader");
}

#[tokio::test]
async fn test_local_poll_auto_completes() {
    let api = LocalApi::new("http://files.test/f");
    let uploads = api
        .prepare_upload(prepare(vec![FileInfo::new("cat.png", 1)]))
        .await
        .unwrap();
    let key = &uploads[0].key;

    let file = api.poll_upload(key).await.unwrap().expect("auto-completed");
    assert_eq!(&file.key, key);
    assert_eq!(file.url, uploads[0].file_url);
    // A reported upload is forgotten.
    assert!(api.is_empty().await);
    assert!(matches!(
        api.poll_upload(key).await,
        Err(UploadApiError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_local_manual_completion() {
    let api = LocalApi::new("http://files.test/f").with_manual_completion();
    let uploads = api
        .prepare_upload(prepare(vec![FileInfo::new("cat.png", 1)]))
        .await
        .unwrap();
    let key = &uploads[0].key;

    assert_eq!(api.poll_upload(key).await.unwrap(), None);
    api.complete_upload(key).await.unwrap();
    assert_eq!(api.get(key).await.unwrap().status, LocalUploadStatus::Uploaded);
    assert!(api.poll_upload(key).await.unwrap().is_some());
    assert!(api.is_empty().await);
}

#[tokio::test]
async fn test_local_evicts_expired_uploads() {
    let api = LocalApi::new("http://files.test/f")
        .with_manual_completion()
        .with_ttl(Duration::from_millis(20));
    let first = api
        .prepare_upload(prepare(vec![FileInfo::new("a.png", 1), FileInfo::new("b.png", 1)]))
        .await
        .unwrap();
    api.fail_upload(&first[1].key).await.unwrap();
    assert_eq!(api.len().await, 2);

    tokio::time::sleep(Duration::from_millis(40)).await;
    let second = api
        .prepare_upload(prepare(vec![FileInfo::new("c.png", 1)]))
        .await
        .unwrap();

    assert_eq!(api.len().await, 1);
    assert!(api.get(&first[0].key).await.is_none());
    assert!(api.get(&second[0].key).await.is_some());
}

#[tokio::test]
async fn test_local_fail_upload() {
    let api = LocalApi::new("http://files.test/f").with_manual_completion();
    let uploads = api
        .prepare_upload(prepare(vec![FileInfo::new("cat.png", 1)]))
        .await
        .unwrap();
    let key = &uploads[0].key;

    api.fail_upload(key).await.unwrap();
    assert_eq!(api.get(key).await.unwrap().status, LocalUploadStatus::Failed);
    assert!(matches!(
        api.poll_upload(key).await,
        Err(UploadApiError::Backend(_))
    ));
    assert!(api.complete_upload(key).await.is_err());
}

#[tokio::test]
async fn test_local_unknown_key() {
    let api = LocalApi::new("http://files.test/f");
    assert!(matches!(
        api.fail_upload("nope").await,
        Err(UploadApiError::NotFound(_))
    ));
    assert!(matches!(
        api.poll_upload("nope").await,
        Err(UploadApiError::NotFound(_))
    ));
    assert!(api.is_empty().await);
}

// ============================================================================
// HostedApi against a stand-in service
// ============================================================================

#[derive(Clone, Default)]
struct Recorded {
    adapters: Arc<Mutex<Vec<String>>>,
    failed: Arc<Mutex<Vec<String>>>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("x-uploadthing-api-key")
        .is_some_and(|v| v == API_KEY)
        && headers.contains_key("x-uploadthing-version")
}

async fn prepare_handler(
    State(recorded): State<Recorded>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    if let Some(adapter) = headers
        .get("x-uploadthing-be-adapter")
        .and_then(|v| v.to_str().ok())
    {
        recorded.adapters.lock().unwrap().push(adapter.to_string());
    }

    let uploads: Vec<Value> = body["files"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(i, file)| {
            json!({
                "key": format!("key-{i}"),
                "url": format!("https://ingest.test/key-{i}"),
                "fileUrl": format!("https://files.test/key-{i}"),
                "name": file["name"],
                "size": file["size"],
                "type": file["type"].as_str().unwrap_or("application/octet-stream"),
                "contentDisposition": "inline",
            })
        })
        .collect();
    Ok(Json(Value::Array(uploads)))
}

async fn failure_handler(
    State(recorded): State<Recorded>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    let key = body["fileKey"].as_str().unwrap_or_default().to_string();
    if key == "missing" {
        return StatusCode::NOT_FOUND;
    }
    recorded.failed.lock().unwrap().push(key);
    StatusCode::OK
}

async fn poll_handler(Path(key): Path<String>) -> Json<Value> {
    if key == "ready" {
        Json(json!({
            "status": "done",
            "fileData": { "key": "ready", "name": "a.png", "size": 1, "url": "https://files.test/ready" },
        }))
    } else {
        Json(json!({ "status": "still working" }))
    }
}

async fn serve_hosted() -> (String, Recorded) {
    let recorded = Recorded::default();
    let app = Router::new()
        .route("/api/prepareUpload", post(prepare_handler))
        .route("/api/failureCallback", post(failure_handler))
        .route("/api/pollUpload/:key", get(poll_handler))
        .with_state(recorded.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/"), recorded)
}

#[tokio::test]
async fn test_hosted_prepare_upload() {
    let (base, recorded) = serve_hosted().await;
    let api = HostedApi::new(&base, API_KEY).unwrap();

    let uploads = api
        .prepare_upload(prepare(vec![FileInfo::new("a.png", 1).with_type("image/png")]))
        .await
        .unwrap();

    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].key, "key-0");
    assert_eq!(uploads[0].file_type, "image/png");
    assert_eq!(*recorded.adapters.lock().unwrap(), vec!["test".to_string()]);
}

#[tokio::test]
async fn test_hosted_rejects_bad_key() {
    let (base, _) = serve_hosted().await;
    let api = HostedApi::new(&base, "sk_wrong").unwrap();

    let err = api
        .prepare_upload(prepare(vec![FileInfo::new("a.png", 1)]))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadApiError::Status { status: 401, .. }));
}

#[tokio::test]
async fn test_hosted_fail_upload() {
    let (base, recorded) = serve_hosted().await;
    let api = HostedApi::new(&base, API_KEY).unwrap();

    api.fail_upload("key-0").await.unwrap();
    assert_eq!(*recorded.failed.lock().unwrap(), vec!["key-0".to_string()]);

    assert!(matches!(
        api.fail_upload("missing").await,
        Err(UploadApiError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_hosted_poll_upload() {
    let (base, _) = serve_hosted().await;
    let api = HostedApi::new(&base, API_KEY).unwrap();

    assert_eq!(api.poll_upload("pending").await.unwrap(), None);

    let file = api.poll_upload("ready").await.unwrap().unwrap();
    assert_eq!(file.name, "a.png");
    assert_eq!(file.file_type, None);
}
