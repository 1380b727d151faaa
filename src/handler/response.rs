use std::fmt;
use std::future::Future;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::error::UploadError;
use crate::router::FileRouter;
use crate::VERSION;

pub const VERSION_HEADER: &str = "x-uploadthing-version";

// ============================================================================
// Handler output
// ============================================================================

/// Background work started by a request that may outlive the response.
///
/// Dropping the handle detaches the task; hosts that tear down the execution
/// context after responding should [`wait`](CleanupHandle::wait) on it.
pub struct CleanupHandle {
    task: JoinHandle<()>,
}

impl CleanupHandle {
    pub(crate) fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            task: tokio::spawn(future),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Cleanup task did not complete");
        }
    }
}

impl fmt::Debug for CleanupHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupHandle")
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

/// Successful outcome of the handler core, before it is written out.
#[derive(Debug)]
pub struct HandlerResponse {
    pub status: StatusCode,
    pub body: Value,
    pub cleanup: Option<CleanupHandle>,
}

impl HandlerResponse {
    pub fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
            cleanup: None,
        }
    }

    pub fn with_cleanup(mut self, cleanup: Option<CleanupHandle>) -> Self {
        self.cleanup = cleanup;
        self
    }
}

/// A finished HTTP response plus any background work it started.
#[derive(Debug)]
pub struct ResponseWithCleanup {
    pub response: http::Response<Bytes>,
    pub cleanup: Option<CleanupHandle>,
}

// ============================================================================
// Writers
// ============================================================================

/// Client-safe error payload: `{ error, message, data? }`.
/// `data` holds the router's custom formatter output. Causes are never included.
pub fn format_error(error: &UploadError, router: &FileRouter) -> Value {
    let mut body = serde_json::json!({
        "error": error.code(),
        "message": error.message(),
    });
    if let Some(data) = router.format_custom(error) {
        body["data"] = data;
    }
    body
}

pub fn json_response(status: StatusCode, body: &Value) -> http::Response<Bytes> {
    let mut response = http::Response::new(Bytes::from(body.to_string()));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(VERSION_HEADER, HeaderValue::from_static(VERSION));
    response
}

pub fn error_response(error: &UploadError, router: &FileRouter) -> http::Response<Bytes> {
    let status = error.status_code();
    if status.is_server_error() {
        tracing::error!(
            code = %error.code(),
            message = error.message(),
            cause = ?error.cause(),
            "Upload request failed"
        );
    } else {
        tracing::debug!(code = %error.code(), message = error.message(), "Upload request rejected");
    }

    json_response(status, &format_error(error, router))
}

fn unknown_error_response() -> http::Response<Bytes> {
    let mut response = http::Response::new(Bytes::from_static(b"An unknown error occurred"));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
        .headers_mut()
        .insert(VERSION_HEADER, HeaderValue::from_static(VERSION));
    response
}

/// Turn the handler outcome into the one response sent for the request.
pub fn into_http_response(
    outcome: Result<HandlerResponse, UploadError>,
    router: &FileRouter,
) -> ResponseWithCleanup {
    match outcome {
        Err(error) => ResponseWithCleanup {
            response: error_response(&error, router),
            cleanup: None,
        },
        Ok(res) if res.status != StatusCode::OK => {
            tracing::error!(status = %res.status, "Handler returned a non-200 success response");
            ResponseWithCleanup {
                response: unknown_error_response(),
                cleanup: res.cleanup,
            }
        }
        Ok(res) => ResponseWithCleanup {
            response: json_response(res.status, &res.body),
            cleanup: res.cleanup,
        },
    }
}
