use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::Instrument;

use super::request::UploadRequest;
use super::response::{CleanupHandle, HandlerResponse};
use super::signature::{self, SIGNATURE_HEADER};
use crate::config::PollConfig;
use crate::error::{ErrorCode, UploadError};
use crate::models::{FileInfo, PresignedUpload, UploadedFile};
use crate::router::builder::UploadErrorContext;
use crate::router::{FileRoute, MiddlewareArgs};
use crate::upload_api::{PrepareUpload, UploadApi, UploadApiError};
use crate::RouterWithConfig;

/// Everything an action needs about the request being handled.
pub(super) struct Action<'a> {
    pub slug: &'a str,
    pub route: &'a FileRoute,
    pub req: &'a UploadRequest,
    pub opts: &'a RouterWithConfig,
    pub adapter: &'a str,
}

#[derive(Debug, Deserialize)]
struct UploadBody {
    #[serde(default)]
    files: Vec<FileInfo>,
    #[serde(default)]
    input: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FailureBody {
    file_key: String,
}

#[derive(Debug, Deserialize)]
struct CallbackBody {
    status: String,
    #[serde(default)]
    metadata: Value,
    file: UploadedFile,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadActionResponse<'a> {
    slug: &'a str,
    callback_url: &'a str,
    uploads: &'a [PresignedUpload],
}

fn decode<T: DeserializeOwned>(body: Value) -> Result<T, UploadError> {
    serde_json::from_value(body)
        .map_err(|e| UploadError::bad_request(format!("Invalid request body: {e}")))
}

// ============================================================================
// Upload
// ============================================================================

pub(super) async fn upload(action: &Action<'_>, body: Value) -> Result<HandlerResponse, UploadError> {
    let body: UploadBody = decode(body)?;
    let route = action.route;

    let metadata = route
        .callbacks()
        .run_middleware(MiddlewareArgs {
            slug: action.slug,
            headers: action.req.headers(),
            files: &body.files,
            input: body.input,
        })
        .await?;

    route.config().validate_files(&body.files)?;
    let callback_url = action.opts.config.callback_url_for(action.req)?;

    let uploads = if body.files.is_empty() {
        Vec::new()
    } else {
        let file_count = body.files.len();
        action
            .opts
            .api
            .prepare_upload(PrepareUpload {
                files: body.files,
                route_config: route.config().clone(),
                metadata: metadata.clone(),
                callback_url: callback_url.clone(),
                callback_slug: action.slug.to_string(),
                adapter: action.adapter.to_string(),
            })
            .await
            .map_err(|e| {
                tracing::error!(slug = action.slug, file_count, error = %e, "Failed to prepare upload");
                UploadError::new(ErrorCode::UrlGenerationFailed, "Failed to generate presigned URLs")
                    .with_cause(e)
            })?
    };

    tracing::info!(slug = action.slug, uploads = uploads.len(), "Prepared upload");

    let cleanup = (action.opts.config.is_dev && !uploads.is_empty()).then(|| {
        spawn_completion_poll(
            action.opts.api.clone(),
            route.clone(),
            metadata,
            uploads.iter().map(|u| u.key.clone()).collect(),
            action.opts.config.poll,
            action.slug,
        )
    });

    let body = serde_json::to_value(UploadActionResponse {
        slug: action.slug,
        callback_url: &callback_url,
        uploads: &uploads,
    })
    .map_err(|e| UploadError::internal("Failed to serialize upload response").with_cause(e))?;

    Ok(HandlerResponse::ok(body).with_cleanup(cleanup))
}

/// Without webhooks, wait for each upload to land and run `on_upload_complete` in-process.
fn spawn_completion_poll(
    api: Arc<dyn UploadApi>,
    route: FileRoute,
    metadata: Value,
    file_keys: Vec<String>,
    poll: PollConfig,
    slug: &str,
) -> CleanupHandle {
    let span = tracing::info_span!("upload_poll", slug = %slug);

    CleanupHandle::spawn(
        async move {
            for key in file_keys {
                match await_upload(api.as_ref(), &key, poll).await {
                    Ok(Some(file)) => {
                        tracing::debug!(file_key = %key, "Upload finished");
                        // Failures are already logged by the callback wrapper.
                        if let Err(e) = route
                            .callbacks()
                            .on_upload_complete(metadata.clone(), file)
                            .await
                        {
                            tracing::warn!(file_key = %key, error = %e, "onUploadComplete failed");
                        }
                    }
                    Ok(None) => {
                        tracing::warn!(
                            file_key = %key,
                            attempts = poll.max_attempts,
                            "Gave up waiting for upload"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(file_key = %key, error = %e, "Polling upload failed");
                    }
                }
            }
        }
        .instrument(span),
    )
}

async fn await_upload(
    api: &dyn UploadApi,
    file_key: &str,
    poll: PollConfig,
) -> Result<Option<UploadedFile>, UploadApiError> {
    for attempt in 0..poll.max_attempts {
        if let Some(file) = api.poll_upload(file_key).await? {
            return Ok(Some(file));
        }
        if attempt + 1 < poll.max_attempts {
            tokio::time::sleep(poll.interval).await;
        }
    }
    Ok(None)
}

// ============================================================================
// Failure
// ============================================================================

pub(super) async fn failure(action: &Action<'_>, body: Value) -> Result<HandlerResponse, UploadError> {
    let FailureBody { file_key } = decode(body)?;

    action.opts.api.fail_upload(&file_key).await.map_err(|e| match e {
        UploadApiError::NotFound(_) => {
            UploadError::not_found(format!("No upload found for key {file_key}"))
        }
        other => UploadError::new(ErrorCode::UploadFailed, "Failed to mark upload as failed")
            .with_cause(other),
    })?;

    tracing::info!(slug = action.slug, file_key = %file_key, "Upload marked as failed");

    action
        .route
        .callbacks()
        .on_upload_error(UploadErrorContext {
            error: UploadError::new(
                ErrorCode::UploadFailed,
                format!("Failed to upload file {file_key}"),
            ),
            file_key,
        })
        .await?;

    Ok(HandlerResponse::ok(Value::Null))
}

// ============================================================================
// Completion webhook
// ============================================================================

pub(super) async fn upload_callback(
    action: &Action<'_>,
    body: Value,
) -> Result<HandlerResponse, UploadError> {
    let api_key = action.opts.config.api_key.as_deref().ok_or_else(|| {
        UploadError::new(ErrorCode::MissingEnv, "No API key configured to verify callbacks")
    })?;

    if !signature::verify(api_key, action.req.body(), action.req.header(SIGNATURE_HEADER)) {
        tracing::warn!(slug = action.slug, "Rejected callback with invalid signature");
        return Err(UploadError::bad_request("Invalid signature"));
    }

    let CallbackBody {
        status,
        metadata,
        file,
    } = decode(body)?;

    if status != "uploaded" {
        tracing::debug!(slug = action.slug, status = %status, "Ignoring callback");
        return Ok(HandlerResponse::ok(Value::Null));
    }

    tracing::info!(slug = action.slug, file_key = %file.key, "Running onUploadComplete");
    action
        .route
        .callbacks()
        .on_upload_complete(metadata, file)
        .await?;

    Ok(HandlerResponse::ok(Value::Null))
}
