use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;

use super::{PrepareUpload, UploadApi, UploadApiError};
use crate::models::{PresignedUpload, UploadedFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalUploadStatus {
    Pending,
    Uploaded,
    Failed,
}

#[derive(Debug, Clone)]
pub struct LocalUpload {
    pub file: UploadedFile,
    pub status: LocalUploadStatus,
    pub metadata: Value,
    pub callback_slug: String,
    pub created_at: DateTime<Utc>,
}

/// In-memory upload service for development and testing.
///
/// Keys are random UUIDs and URLs point under `base_url`; no bytes are stored.
/// By default a pending upload counts as finished the first time it is polled.
/// An upload is forgotten once a poll has reported it finished; anything
/// older than the TTL is evicted on the next `prepare_upload`.
pub struct LocalApi {
    auto_complete: bool,
    base_url: String,
    ttl: Duration,
    uploads: RwLock<HashMap<String, LocalUpload>>,
}

const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

impl LocalApi {
    pub fn new(base_url: &str) -> Self {
        Self {
            auto_complete: true,
            base_url: base_url.trim_end_matches('/').to_string(),
            ttl: DEFAULT_TTL,
            uploads: RwLock::new(HashMap::new()),
        }
    }

    /// Keep uploads pending until [`LocalApi::complete_upload`] is called.
    pub fn with_manual_completion(mut self) -> Self {
        self.auto_complete = false;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub async fn get(&self, file_key: &str) -> Option<LocalUpload> {
        self.uploads.read().await.get(file_key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.uploads.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.uploads.read().await.is_empty()
    }

    pub async fn complete_upload(&self, file_key: &str) -> Result<UploadedFile, UploadApiError> {
        let mut uploads = self.uploads.write().await;
        let upload = uploads
            .get_mut(file_key)
            .ok_or_else(|| UploadApiError::NotFound(file_key.to_string()))?;

        if upload.status == LocalUploadStatus::Failed {
            return Err(UploadApiError::Backend(format!(
                "upload {file_key} already failed"
            )));
        }
        upload.status = LocalUploadStatus::Uploaded;
        Ok(upload.file.clone())
    }
}

#[async_trait]
impl UploadApi for LocalApi {
    async fn prepare_upload(
        &self,
        request: PrepareUpload,
    ) -> Result<Vec<PresignedUpload>, UploadApiError> {
        let now = Utc::now();
        let mut uploads = self.uploads.write().await;

        let before = uploads.len();
        uploads.retain(|_, upload| !expired(upload.created_at, now, self.ttl));
        if uploads.len() < before {
            tracing::debug!(evicted = before - uploads.len(), "Evicted expired local uploads");
        }

        let presigned = request
            .files
            .iter()
            .map(|file| {
                let key = uuid::Uuid::new_v4().to_string();
                let file_type = file.mime_type();
                let content_disposition = request
                    .route_config
                    .match_key(&file_type)
                    .and_then(|k| request.route_config.get(&k).map(|c| c.content_disposition))
                    .unwrap_or_default();
                let file_url = format!("{}/{key}", self.base_url);

                uploads.insert(
                    key.clone(),
                    LocalUpload {
                        file: UploadedFile {
                            key: key.clone(),
                            name: file.name.clone(),
                            size: file.size,
                            url: file_url.clone(),
                            file_type: Some(file_type.clone()),
                        },
                        status: LocalUploadStatus::Pending,
                        metadata: request.metadata.clone(),
                        callback_slug: request.callback_slug.clone(),
                        created_at: now,
                    },
                );

                PresignedUpload {
                    url: format!("{}/upload/{key}", self.base_url),
                    key,
                    file_url,
                    name: file.name.clone(),
                    size: file.size,
                    file_type,
                    content_disposition,
                }
            })
            .collect();

        Ok(presigned)
    }

    async fn fail_upload(&self, file_key: &str) -> Result<(), UploadApiError> {
        let mut uploads = self.uploads.write().await;
        let upload = uploads
            .get_mut(file_key)
            .ok_or_else(|| UploadApiError::NotFound(file_key.to_string()))?;

        upload.status = LocalUploadStatus::Failed;
        tracing::debug!(file_key, "Marked local upload as failed");
        Ok(())
    }

    async fn poll_upload(&self, file_key: &str) -> Result<Option<UploadedFile>, UploadApiError> {
        let mut uploads = self.uploads.write().await;
        let status = uploads
            .get(file_key)
            .map(|upload| upload.status)
            .ok_or_else(|| UploadApiError::NotFound(file_key.to_string()))?;

        match status {
            LocalUploadStatus::Failed => Err(UploadApiError::Backend(format!(
                "upload {file_key} failed"
            ))),
            LocalUploadStatus::Pending if !self.auto_complete => Ok(None),
            LocalUploadStatus::Uploaded | LocalUploadStatus::Pending => {
                // Reported once; the entry is done.
                Ok(uploads.remove(file_key).map(|upload| upload.file))
            }
        }
    }
}

fn expired(created_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    (now - created_at).to_std().is_ok_and(|age| age >= ttl)
}
