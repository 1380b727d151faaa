//! Upload constraints attached to a file route.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ErrorCode, UploadError};
use crate::models::FileInfo;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteConfigError {
    #[error("Invalid file size: {0}")]
    InvalidFileSize(String),
    #[error("Invalid file type: {0}")]
    InvalidFileType(String),
}

// ============================================================================
// File type keys
// ============================================================================

/// Key of a route config entry: a broad file category or an exact MIME type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum FileTypeKey {
    Image,
    Video,
    Audio,
    Pdf,
    Text,
    Blob,
    Mime(String),
}

impl FileTypeKey {
    /// The broad category a MIME type falls into, if any. `blob` is never returned.
    pub fn category_of(mime: &str) -> Option<FileTypeKey> {
        let mime = mime.to_ascii_lowercase();
        let (primary, sub) = mime.split_once('/').unwrap_or((mime.as_str(), ""));
        match (primary, sub) {
            ("image", _) => Some(FileTypeKey::Image),
            ("video", _) => Some(FileTypeKey::Video),
            ("audio", _) => Some(FileTypeKey::Audio),
            ("application", "pdf") => Some(FileTypeKey::Pdf),
            ("text", _) => Some(FileTypeKey::Text),
            _ => None,
        }
    }

    fn default_max_size(&self) -> FileSize {
        match self {
            FileTypeKey::Image => FileSize::mb(4),
            FileTypeKey::Video => FileSize::mb(16),
            FileTypeKey::Audio => FileSize::mb(8),
            FileTypeKey::Pdf => FileSize::mb(4),
            FileTypeKey::Text => FileSize::kb(64),
            FileTypeKey::Blob => FileSize::mb(8),
            FileTypeKey::Mime(mime) => FileTypeKey::category_of(mime)
                .unwrap_or(FileTypeKey::Blob)
                .default_max_size(),
        }
    }
}

impl fmt::Display for FileTypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileTypeKey::Image => f.write_str("image"),
            FileTypeKey::Video => f.write_str("video"),
            FileTypeKey::Audio => f.write_str("audio"),
            FileTypeKey::Pdf => f.write_str("pdf"),
            FileTypeKey::Text => f.write_str("text"),
            FileTypeKey::Blob => f.write_str("blob"),
            FileTypeKey::Mime(mime) => f.write_str(mime),
        }
    }
}

impl FromStr for FileTypeKey {
    type Err = RouteConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        match key.as_str() {
            "image" => Ok(FileTypeKey::Image),
            "video" => Ok(FileTypeKey::Video),
            "audio" => Ok(FileTypeKey::Audio),
            "pdf" => Ok(FileTypeKey::Pdf),
            "text" => Ok(FileTypeKey::Text),
            "blob" => Ok(FileTypeKey::Blob),
            _ => match key.split_once('/') {
                Some((primary, sub)) if !primary.is_empty() && !sub.is_empty() => {
                    Ok(FileTypeKey::Mime(key))
                }
                _ => Err(RouteConfigError::InvalidFileType(s.to_string())),
            },
        }
    }
}

impl From<FileTypeKey> for String {
    fn from(key: FileTypeKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for FileTypeKey {
    type Error = RouteConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ============================================================================
// File sizes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SizeUnit {
    B,
    KB,
    MB,
    GB,
}

impl SizeUnit {
    fn multiplier(self) -> u64 {
        match self {
            SizeUnit::B => 1,
            SizeUnit::KB => 1024,
            SizeUnit::MB => 1024 * 1024,
            SizeUnit::GB => 1024 * 1024 * 1024,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            SizeUnit::B => "B",
            SizeUnit::KB => "KB",
            SizeUnit::MB => "MB",
            SizeUnit::GB => "GB",
        }
    }
}

/// A human-readable file size such as `4MB`. Units are 1024-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct FileSize {
    value: u64,
    unit: SizeUnit,
}

impl FileSize {
    pub const fn new(value: u64, unit: SizeUnit) -> Self {
        Self { value, unit }
    }

    pub const fn bytes(value: u64) -> Self {
        Self::new(value, SizeUnit::B)
    }

    pub const fn kb(value: u64) -> Self {
        Self::new(value, SizeUnit::KB)
    }

    pub const fn mb(value: u64) -> Self {
        Self::new(value, SizeUnit::MB)
    }

    pub const fn gb(value: u64) -> Self {
        Self::new(value, SizeUnit::GB)
    }

    pub fn as_bytes(&self) -> u64 {
        self.value.saturating_mul(self.unit.multiplier())
    }
}

impl fmt::Display for FileSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.as_str())
    }
}

impl FromStr for FileSize {
    type Err = RouteConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| RouteConfigError::InvalidFileSize(s.to_string()))?;
        let (digits, unit) = trimmed.split_at(split);

        let value: u64 = digits
            .parse()
            .map_err(|_| RouteConfigError::InvalidFileSize(s.to_string()))?;
        let unit = match unit.trim().to_ascii_uppercase().as_str() {
            "B" => SizeUnit::B,
            "KB" => SizeUnit::KB,
            "MB" => SizeUnit::MB,
            "GB" => SizeUnit::GB,
            _ => return Err(RouteConfigError::InvalidFileSize(s.to_string())),
        };

        Ok(FileSize::new(value, unit))
    }
}

impl From<FileSize> for String {
    fn from(size: FileSize) -> Self {
        size.to_string()
    }
}

impl TryFrom<String> for FileSize {
    type Error = RouteConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ============================================================================
// Route config
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentDisposition {
    #[default]
    Inline,
    Attachment,
}

/// Constraints for one file type, as written by the route author.
/// Unset fields take per-type defaults when the route is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileRouteOptions {
    pub max_file_size: Option<FileSize>,
    pub max_file_count: Option<u32>,
    pub content_disposition: Option<ContentDisposition>,
}

impl FileRouteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_file_size(mut self, size: FileSize) -> Self {
        self.max_file_size = Some(size);
        self
    }

    pub fn max_file_count(mut self, count: u32) -> Self {
        self.max_file_count = Some(count);
        self
    }

    pub fn content_disposition(mut self, disposition: ContentDisposition) -> Self {
        self.content_disposition = Some(disposition);
        self
    }
}

/// Constraints for one file type with every default filled in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRouteConfig {
    pub max_file_size: FileSize,
    pub max_file_count: u32,
    pub content_disposition: ContentDisposition,
}

/// The file types a route accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteConfig {
    entries: BTreeMap<FileTypeKey, FileRouteOptions>,
}

impl RouteConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept each of `keys` with default constraints.
    pub fn from_types(keys: impl IntoIterator<Item = FileTypeKey>) -> Self {
        keys.into_iter().fold(Self::new(), |config, key| {
            config.with(key, FileRouteOptions::default())
        })
    }

    pub fn with(mut self, key: FileTypeKey, options: FileRouteOptions) -> Self {
        self.entries.insert(key, options);
        self
    }

    pub fn image(self, options: FileRouteOptions) -> Self {
        self.with(FileTypeKey::Image, options)
    }

    pub fn video(self, options: FileRouteOptions) -> Self {
        self.with(FileTypeKey::Video, options)
    }

    pub fn audio(self, options: FileRouteOptions) -> Self {
        self.with(FileTypeKey::Audio, options)
    }

    pub fn pdf(self, options: FileRouteOptions) -> Self {
        self.with(FileTypeKey::Pdf, options)
    }

    pub fn text(self, options: FileRouteOptions) -> Self {
        self.with(FileTypeKey::Text, options)
    }

    pub fn blob(self, options: FileRouteOptions) -> Self {
        self.with(FileTypeKey::Blob, options)
    }

    /// Accept an exact MIME type such as `application/json`.
    pub fn mime(self, mime: &str, options: FileRouteOptions) -> Result<Self, RouteConfigError> {
        let key: FileTypeKey = mime.parse()?;
        if !matches!(key, FileTypeKey::Mime(_)) {
            return Err(RouteConfigError::InvalidFileType(mime.to_string()));
        }
        Ok(self.with(key, options))
    }

    pub fn expand(&self) -> ExpandedRouteConfig {
        let entries = self
            .entries
            .iter()
            .map(|(key, options)| {
                let config = FileRouteConfig {
                    max_file_size: options
                        .max_file_size
                        .unwrap_or_else(|| key.default_max_size()),
                    max_file_count: options.max_file_count.unwrap_or(1),
                    content_disposition: options.content_disposition.unwrap_or_default(),
                };
                (key.clone(), config)
            })
            .collect();

        ExpandedRouteConfig(entries)
    }
}

impl From<FileTypeKey> for RouteConfig {
    fn from(key: FileTypeKey) -> Self {
        RouteConfig::from_types([key])
    }
}

impl<const N: usize> From<[FileTypeKey; N]> for RouteConfig {
    fn from(keys: [FileTypeKey; N]) -> Self {
        RouteConfig::from_types(keys)
    }
}

/// Route config with every default resolved; this is what clients see.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpandedRouteConfig(pub BTreeMap<FileTypeKey, FileRouteConfig>);

impl ExpandedRouteConfig {
    pub fn get(&self, key: &FileTypeKey) -> Option<&FileRouteConfig> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &FileTypeKey> {
        self.0.keys()
    }

    /// The entry a MIME type is checked against: exact MIME key, then
    /// category, then `blob`.
    pub fn match_key(&self, mime: &str) -> Option<FileTypeKey> {
        let exact = FileTypeKey::Mime(mime.to_ascii_lowercase());
        if self.0.contains_key(&exact) {
            return Some(exact);
        }

        if let Some(category) = FileTypeKey::category_of(mime) {
            if self.0.contains_key(&category) {
                return Some(category);
            }
        }

        self.0
            .contains_key(&FileTypeKey::Blob)
            .then_some(FileTypeKey::Blob)
    }

    /// Check declared files against type, size and count limits.
    pub fn validate_files(&self, files: &[FileInfo]) -> Result<(), UploadError> {
        let mut counts: BTreeMap<FileTypeKey, u32> = BTreeMap::new();

        for file in files {
            let mime = file.mime_type();
            let key = self.match_key(&mime).ok_or_else(|| {
                UploadError::bad_request(format!(
                    "File type {mime} not allowed for {}",
                    file.name
                ))
            })?;
            let Some(config) = self.0.get(&key) else {
                continue;
            };

            if file.size > config.max_file_size.as_bytes() {
                return Err(UploadError::new(
                    ErrorCode::TooLarge,
                    format!(
                        "File {} exceeds the maximum {} size of {}",
                        file.name, key, config.max_file_size
                    ),
                ));
            }

            let count = counts.entry(key.clone()).or_default();
            *count += 1;
            if *count > config.max_file_count {
                return Err(UploadError::new(
                    ErrorCode::TooManyFiles,
                    format!(
                        "You uploaded more than {} {} file(s)",
                        config.max_file_count, key
                    ),
                ));
            }
        }

        Ok(())
    }
}
