mod hosted;
mod local;

pub use hosted::HostedApi;
pub use local::{LocalApi, LocalUpload, LocalUploadStatus};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::models::{FileInfo, PresignedUpload, UploadedFile};
use crate::router::config::ExpandedRouteConfig;

#[derive(Debug, Error)]
pub enum UploadApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Upload API returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Upload not found: {0}")]
    NotFound(String),
    #[error("Backend error: {0}")]
    Backend(String),
}

/// What the server asks the upload service for when a client starts an upload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareUpload {
    pub files: Vec<FileInfo>,
    pub route_config: ExpandedRouteConfig,
    /// Middleware output, echoed back with the completion webhook.
    pub metadata: Value,
    pub callback_url: String,
    pub callback_slug: String,
    /// Name of the framework adapter that handled the request.
    #[serde(skip)]
    pub adapter: String,
}

/// Abstraction over the service that stores files.
/// The server never touches file bytes; it only brokers upload parameters.
#[async_trait]
pub trait UploadApi: Send + Sync {
    /// Register the files and return one set of upload parameters per file, in order.
    async fn prepare_upload(
        &self,
        request: PrepareUpload,
    ) -> Result<Vec<PresignedUpload>, UploadApiError>;

    /// Report that the client could not upload a file.
    async fn fail_upload(&self, file_key: &str) -> Result<(), UploadApiError>;

    /// `Ok(None)` while the upload is still in progress.
    async fn poll_upload(&self, file_key: &str) -> Result<Option<UploadedFile>, UploadApiError>;
}
