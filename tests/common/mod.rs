//! Shared helpers for uploadthing-server integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method};
use serde::{Deserialize, Serialize};
use uploadthing_server::config::{PollConfig, RouterConfig};
use uploadthing_server::error::UploadError;
use uploadthing_server::f;
use uploadthing_server::handler::request::UploadRequest;
use uploadthing_server::router::config::{FileRouteOptions, FileSize, FileTypeKey, RouteConfig};
use uploadthing_server::router::FileRouter;
use uploadthing_server::upload_api::LocalApi;
use uploadthing_server::RouterWithConfig;

pub const API_KEY: &str = "sk_test_123";

/// Counts callback invocations across the routes of a test router.
#[derive(Debug, Default)]
pub struct Calls {
    pub middleware: AtomicUsize,
    pub complete: AtomicUsize,
    pub error: AtomicUsize,
}

impl Calls {
    pub fn middleware(&self) -> usize {
        self.middleware.load(Ordering::SeqCst)
    }

    pub fn complete(&self) -> usize {
        self.complete.load(Ordering::SeqCst)
    }

    pub fn error(&self) -> usize {
        self.error.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Owner {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AlbumInput {
    pub album: String,
}

pub fn test_config() -> RouterConfig {
    RouterConfig {
        api_key: Some(API_KEY.to_string()),
        poll: PollConfig {
            interval: Duration::from_millis(10),
            max_attempts: 5,
        },
        ..RouterConfig::default()
    }
}

/// Routes exercising every callback path:
/// - `imageUploader`: images up to 1KB, 2 per request, no middleware
/// - `privateUploader`: requires `x-user-id`, otherwise FORBIDDEN
/// - `brokenUploader`: middleware fails with a non-upload error
/// - `albumUploader`: typed input
pub fn test_router(calls: Arc<Calls>) -> FileRouter {
    let complete = calls.clone();
    let errors = calls.clone();
    let private_mw = calls.clone();
    let private_complete = calls.clone();
    let broken_mw = calls.clone();
    let album_mw = calls;

    FileRouter::new()
        .route(
            "imageUploader",
            f(RouteConfig::new().image(
                FileRouteOptions::new()
                    .max_file_size(FileSize::kb(1))
                    .max_file_count(2),
            ))
            .on_upload_error(move |_| {
                let errors = errors.clone();
                async move {
                    errors.error.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .on_upload_complete(move |_| {
                let complete = complete.clone();
                async move {
                    complete.complete.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        )
        .route(
            "privateUploader",
            f(FileTypeKey::Blob)
                .middleware(move |ctx| {
                    let calls = private_mw.clone();
                    async move {
                        calls.middleware.fetch_add(1, Ordering::SeqCst);
                        let user_id = ctx
                            .headers
                            .get("x-user-id")
                            .and_then(|v| v.to_str().ok())
                            .ok_or_else(|| UploadError::forbidden("Not signed in"))?;
                        Ok::<_, anyhow::Error>(Owner {
                            user_id: user_id.to_string(),
                        })
                    }
                })
                .on_upload_complete(move |ctx| {
                    let calls = private_complete.clone();
                    async move {
                        assert!(!ctx.metadata.user_id.is_empty());
                        calls.complete.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }),
        )
        .route(
            "brokenUploader",
            f(FileTypeKey::Image)
                .middleware(move |_| {
                    let calls = broken_mw.clone();
                    async move {
                        calls.middleware.fetch_add(1, Ordering::SeqCst);
                        Err::<(), anyhow::Error>(anyhow::anyhow!("database password rejected"))
                    }
                })
                .on_upload_complete(|_| async { Ok(()) }),
        )
        .route(
            "albumUploader",
            f(FileTypeKey::Image)
                .input::<AlbumInput>()
                .middleware(move |ctx| {
                    let calls = album_mw.clone();
                    async move {
                        calls.middleware.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, anyhow::Error>(serde_json::json!({ "album": ctx.input.album }))
                    }
                })
                .on_upload_complete(|_| async { Ok(()) }),
        )
}

pub fn router_with_config(
    calls: Arc<Calls>,
    config: RouterConfig,
    api: Arc<LocalApi>,
) -> RouterWithConfig {
    RouterWithConfig::new(test_router(calls), config, api)
}

pub fn post(uri: &str, body: &str) -> UploadRequest {
    post_with_headers(uri, body, &[])
}

pub fn post_with_headers(
    uri: &str,
    body: &str,
    headers: &[(&'static str, &str)],
) -> UploadRequest {
    let mut map = HeaderMap::new();
    map.insert("host", HeaderValue::from_static("localhost:3000"));
    map.insert("content-type", HeaderValue::from_static("application/json"));
    for &(name, value) in headers {
        map.insert(name, HeaderValue::from_str(value).unwrap());
    }
    UploadRequest::new(
        Method::POST,
        uri.parse().unwrap(),
        map,
        Bytes::from(body.to_string()),
    )
}

pub fn json_body(response: &http::Response<Bytes>) -> serde_json::Value {
    serde_json::from_slice(response.body()).unwrap()
}
