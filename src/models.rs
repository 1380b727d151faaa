use serde::{Deserialize, Serialize};

use crate::router::config::{ContentDisposition, ExpandedRouteConfig};

/// A file the client intends to upload, as declared in the request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    /// MIME type reported by the client. Guessed from `name` when absent.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
}

impl FileInfo {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            file_type: None,
        }
    }

    pub fn with_type(mut self, file_type: impl Into<String>) -> Self {
        self.file_type = Some(file_type.into());
        self
    }

    /// MIME type of the file: the declared one, else a guess from the file name.
    pub fn mime_type(&self) -> String {
        self.file_type
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| {
                mime_guess::from_path(&self.name)
                    .first()
                    .map(|m| m.to_string())
            })
            .unwrap_or_else(|| "application/octet-stream".to_string())
    }
}

/// Upload parameters handed back to the client for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUpload {
    pub key: String,
    /// Where the client sends the file bytes.
    pub url: String,
    /// Where the file is served once uploaded.
    pub file_url: String,
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub file_type: String,
    pub content_disposition: ContentDisposition,
}

/// A file the hosted service reports as fully uploaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub key: String,
    pub name: String,
    pub size: u64,
    pub url: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
}

/// One entry of the route introspection payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointMetadata {
    pub slug: String,
    pub config: ExpandedRouteConfig,
}
