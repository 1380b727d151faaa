use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;

use super::{PrepareUpload, UploadApi, UploadApiError};
use crate::models::{PresignedUpload, UploadedFile};
use crate::VERSION;

/// Client for the hosted upload service REST API.
pub struct HostedApi {
    api_key: String,
    base_url: String,
    client: Client,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PollResponse {
    status: String,
    #[serde(default)]
    file_data: Option<UploadedFile>,
}

impl HostedApi {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, UploadApiError> {
        let client = Client::builder().build()?;

        Ok(Self {
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(self.url(path))
            .header("x-uploadthing-api-key", &self.api_key)
            .header("x-uploadthing-version", VERSION)
    }
}

async fn check_status(resp: Response, key: Option<&str>) -> Result<Response, UploadApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::NOT_FOUND {
        if let Some(key) = key {
            return Err(UploadApiError::NotFound(key.to_string()));
        }
    }

    let message = resp.text().await.unwrap_or_default();
    Err(UploadApiError::Status {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl UploadApi for HostedApi {
    async fn prepare_upload(
        &self,
        request: PrepareUpload,
    ) -> Result<Vec<PresignedUpload>, UploadApiError> {
        let resp = self
            .post("/api/prepareUpload")
            .header("x-uploadthing-be-adapter", &request.adapter)
            .json(&request)
            .send()
            .await?;

        let uploads: Vec<PresignedUpload> = check_status(resp, None).await?.json().await?;
        if uploads.len() != request.files.len() {
            return Err(UploadApiError::Backend(format!(
                "expected {} presigned uploads, got {}",
                request.files.len(),
                uploads.len()
            )));
        }

        tracing::debug!(count = uploads.len(), slug = %request.callback_slug, "Prepared uploads");
        Ok(uploads)
    }

    async fn fail_upload(&self, file_key: &str) -> Result<(), UploadApiError> {
        let resp = self
            .post("/api/failureCallback")
            .json(&serde_json::json!({ "fileKey": file_key }))
            .send()
            .await?;

        check_status(resp, Some(file_key)).await?;
        Ok(())
    }

    async fn poll_upload(&self, file_key: &str) -> Result<Option<UploadedFile>, UploadApiError> {
        let resp = self
            .client
            .get(self.url(&format!("/api/pollUpload/{file_key}")))
            .header("x-uploadthing-api-key", &self.api_key)
            .header("x-uploadthing-version", VERSION)
            .send()
            .await?;

        let poll: PollResponse = check_status(resp, Some(file_key)).await?.json().await?;
        if poll.status != "done" {
            return Ok(None);
        }

        poll.file_data.map(Some).ok_or_else(|| {
            UploadApiError::Backend(format!("upload {file_key} is done but has no file data"))
        })
    }
}
