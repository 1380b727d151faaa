use std::time::Duration;

use thiserror::Error;

use crate::error::UploadError;
use crate::handler::request::UploadRequest;
use crate::logger::LogLevel;

pub const DEFAULT_API_URL: &str = "https://uploadthing.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Configuration for the binary: server settings plus the router settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub upload: RouterConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Path the upload routes are nested under.
    pub mount_path: String,
    pub backend: UploadBackend,
    /// Base URL the local backend hands out for uploads and file downloads.
    pub local_file_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadBackend {
    Hosted,
    Local,
}

/// Deployment settings shared by every adapter.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Secret used to authenticate against the hosted API and sign webhooks.
    pub api_key: Option<String>,
    pub api_url: String,
    /// Full URL the hosted service calls back. Inferred per request when unset.
    pub callback_url: Option<String>,
    /// Host name provided by the deployment platform (`VERCEL_URL`).
    pub platform_url: Option<String>,
    /// Without webhooks, upload completion is detected by polling.
    pub is_dev: bool,
    pub log_level: Option<LogLevel>,
    /// Maximum accepted request body size in bytes
    pub max_body_size: usize,
    pub poll: PollConfig,
}

#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            max_attempts: 60,
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: DEFAULT_API_URL.to_string(),
            callback_url: None,
            platform_url: None,
            is_dev: false,
            log_level: None,
            max_body_size: 1024 * 1024,
            poll: PollConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            mount_path: "/api/uploadthing".to_string(),
            backend: UploadBackend::Local,
            local_file_url: "http://localhost:8080/f".to_string(),
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl RouterConfig {
    /// Load router settings from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = RouterConfig::default();

        let log_level = match env_non_empty("UPLOADTHING_LOG_LEVEL") {
            Some(level) => Some(
                level
                    .parse()
                    .map_err(|e| ConfigError::ValidationError(format!("{e}")))?,
            ),
            None => None,
        };

        let config = RouterConfig {
            api_key: env_non_empty("UPLOADTHING_SECRET"),
            api_url: env_non_empty("UPLOADTHING_API_URL").unwrap_or(defaults.api_url),
            callback_url: env_non_empty("UPLOADTHING_URL"),
            platform_url: env_non_empty("VERCEL_URL"),
            is_dev: env_flag("UPLOADTHING_DEV"),
            log_level,
            max_body_size: env_parse("MAX_BODY_SIZE").unwrap_or(defaults.max_body_size),
            poll: PollConfig {
                interval: env_parse("UPLOADTHING_POLL_INTERVAL_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.poll.interval),
                max_attempts: env_parse("UPLOADTHING_POLL_ATTEMPTS")
                    .unwrap_or(defaults.poll.max_attempts),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll.interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "UPLOADTHING_POLL_INTERVAL_MS must be greater than 0".to_string(),
            ));
        }

        if self.max_body_size == 0 {
            return Err(ConfigError::ValidationError(
                "MAX_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        if let Some(url) = &self.callback_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::ValidationError(format!(
                    "UPLOADTHING_URL must be an absolute http(s) URL, got {url}"
                )));
            }
        }

        Ok(())
    }

    /// URL the hosted service should call back for a request.
    ///
    /// Order: configured callback URL, platform host, then the request's own origin.
    pub fn callback_url_for(&self, req: &UploadRequest) -> Result<String, UploadError> {
        if let Some(url) = &self.callback_url {
            return Ok(url.clone());
        }

        let path = req.uri().path();

        if let Some(host) = &self.platform_url {
            let host = host
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/');
            return Ok(format!("https://{host}{path}"));
        }

        let origin = req
            .origin()
            .ok_or_else(|| UploadError::bad_request("Unable to determine the request origin"))?;
        Ok(format!("{origin}{path}"))
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = ServerConfig::default();

        let backend = match std::env::var("UPLOAD_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .to_lowercase()
            .as_str()
        {
            "hosted" => UploadBackend::Hosted,
            _ => UploadBackend::Local,
        };

        let config = Config {
            server: ServerConfig {
                bind_address: std::env::var("BIND_ADDRESS").unwrap_or(defaults.bind_address),
                mount_path: std::env::var("MOUNT_PATH").unwrap_or(defaults.mount_path),
                backend,
                local_file_url: std::env::var("LOCAL_FILE_URL").unwrap_or(defaults.local_file_url),
            },
            upload: RouterConfig::from_env()?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.server.mount_path.starts_with('/') {
            return Err(ConfigError::ValidationError(
                "MOUNT_PATH must start with '/'".to_string(),
            ));
        }

        if self.server.backend == UploadBackend::Hosted && self.upload.api_key.is_none() {
            return Err(ConfigError::ValidationError(
                "UPLOADTHING_SECRET is required when UPLOAD_BACKEND=hosted".to_string(),
            ));
        }

        if self.server.backend == UploadBackend::Local && !self.upload.is_dev {
            tracing::warn!(
                "Local upload backend without UPLOADTHING_DEV: \
                 onUploadComplete only runs when a webhook is delivered"
            );
        }

        self.upload.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{HeaderMap, HeaderValue, Method, Uri};

    fn request(uri: &str, headers: &[(&'static str, &'static str)]) -> UploadRequest {
        let mut map = HeaderMap::new();
        for &(name, value) in headers {
            map.insert(name, HeaderValue::from_static(value));
        }
        UploadRequest::new(Method::POST, uri.parse::<Uri>().unwrap(), map, Bytes::new())
    }

    #[test]
    fn test_callback_url_prefers_config() {
        let config = RouterConfig {
            callback_url: Some("https://example.com/api/uploadthing".to_string()),
            platform_url: Some("my-app.vercel.app".to_string()),
            ..Default::default()
        };
        let req = request("/api/uploadthing?slug=a", &[("host", "localhost:3000")]);
        assert_eq!(
            config.callback_url_for(&req).unwrap(),
            "https://example.com/api/uploadthing"
        );
    }

    #[test]
    fn test_callback_url_from_platform_host() {
        let config = RouterConfig {
            platform_url: Some("my-app.vercel.app/".to_string()),
            ..Default::default()
        };
        let req = request("/api/uploadthing?slug=a", &[("host", "localhost:3000")]);
        assert_eq!(
            config.callback_url_for(&req).unwrap(),
            "https://my-app.vercel.app/api/uploadthing"
        );
    }

    #[test]
    fn test_callback_url_from_request_origin() {
        let config = RouterConfig::default();
        let req = request(
            "/api/uploadthing?slug=a",
            &[("host", "files.internal"), ("x-forwarded-proto", "https")],
        );
        assert_eq!(
            config.callback_url_for(&req).unwrap(),
            "https://files.internal/api/uploadthing"
        );

        let req = request("/api/uploadthing", &[]);
        assert!(config.callback_url_for(&req).is_err());
    }

    #[test]
    fn test_validate_rejects_relative_callback_url() {
        let config = RouterConfig {
            callback_url: Some("/api/uploadthing".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(RouterConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_poll_interval() {
        let config = RouterConfig {
            poll: PollConfig {
                interval: Duration::ZERO,
                max_attempts: 1,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
