use std::fmt;
use std::str::FromStr;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Machine-readable error code sent to clients in the `error` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    TooLarge,
    TooSmall,
    TooManyFiles,
    KeyTooLong,
    InternalServerError,
    InternalClientError,
    UrlGenerationFailed,
    UploadFailed,
    MissingEnv,
    FileLimitExceeded,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 14] = [
        ErrorCode::BadRequest,
        ErrorCode::Unauthorized,
        ErrorCode::Forbidden,
        ErrorCode::NotFound,
        ErrorCode::TooLarge,
        ErrorCode::TooSmall,
        ErrorCode::TooManyFiles,
        ErrorCode::KeyTooLong,
        ErrorCode::InternalServerError,
        ErrorCode::InternalClientError,
        ErrorCode::UrlGenerationFailed,
        ErrorCode::UploadFailed,
        ErrorCode::MissingEnv,
        ErrorCode::FileLimitExceeded,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::TooLarge => "TOO_LARGE",
            ErrorCode::TooSmall => "TOO_SMALL",
            ErrorCode::TooManyFiles => "TOO_MANY_FILES",
            ErrorCode::KeyTooLong => "KEY_TOO_LONG",
            ErrorCode::InternalServerError => "INTERNAL_SERVER_ERROR",
            ErrorCode::InternalClientError => "INTERNAL_CLIENT_ERROR",
            ErrorCode::UrlGenerationFailed => "URL_GENERATION_FAILED",
            ErrorCode::UploadFailed => "UPLOAD_FAILED",
            ErrorCode::MissingEnv => "MISSING_ENV",
            ErrorCode::FileLimitExceeded => "FILE_LIMIT_EXCEEDED",
        }
    }

    /// HTTP status a response carrying this code is sent with.
    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorCode::BadRequest
            | ErrorCode::TooSmall
            | ErrorCode::TooManyFiles
            | ErrorCode::KeyTooLong => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::InternalServerError
            | ErrorCode::InternalClientError
            | ErrorCode::UrlGenerationFailed
            | ErrorCode::UploadFailed
            | ErrorCode::MissingEnv
            | ErrorCode::FileLimitExceeded => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Best guess at a code when a response carries no `error` field.
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::BAD_REQUEST => ErrorCode::BadRequest,
            StatusCode::UNAUTHORIZED => ErrorCode::Unauthorized,
            StatusCode::FORBIDDEN => ErrorCode::Forbidden,
            StatusCode::NOT_FOUND => ErrorCode::NotFound,
            StatusCode::PAYLOAD_TOO_LARGE => ErrorCode::TooLarge,
            s if s.is_client_error() => ErrorCode::BadRequest,
            _ => ErrorCode::InternalServerError,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown error code: {0}")]
pub struct UnknownErrorCode(String);

impl FromStr for ErrorCode {
    type Err = UnknownErrorCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorCode::ALL
            .into_iter()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| UnknownErrorCode(s.to_string()))
    }
}

/// Error surfaced to clients of the upload routes.
///
/// The `message` is client-safe. The optional `cause` stays on the server:
/// it is logged but never serialized.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct UploadError {
    code: ErrorCode,
    message: String,
    #[source]
    cause: Option<BoxError>,
}

impl UploadError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalServerError, message)
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    /// Rebuild an error from a response produced by the error formatter.
    pub fn from_response(status: StatusCode, body: &Value) -> Self {
        let code = body
            .get("error")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| ErrorCode::from_status(status));
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));

        Self::new(code, message)
    }
}

impl From<ErrorCode> for UploadError {
    fn from(code: ErrorCode) -> Self {
        let message = match code {
            ErrorCode::NotFound => "Not found",
            ErrorCode::Unauthorized => "Unauthorized",
            ErrorCode::Forbidden => "Forbidden",
            ErrorCode::BadRequest => "Bad request",
            _ => "An unknown error occurred",
        };
        Self::new(code, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ErrorCode::BadRequest.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::TooLarge.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(ErrorCode::TooManyFiles.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ErrorCode::MissingEnv.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_code_string_roundtrip() {
        for code in ErrorCode::ALL {
            assert_eq!(code.as_str().parse::<ErrorCode>().unwrap(), code);
            let json = serde_json::to_value(code).unwrap();
            assert_eq!(json, Value::String(code.as_str().to_string()));
        }
        assert!("NOPE".parse::<ErrorCode>().is_err());
    }

    #[test]
    fn test_from_response_prefers_error_field() {
        let body = serde_json::json!({ "error": "FORBIDDEN", "message": "no access" });
        let err = UploadError::from_response(StatusCode::BAD_REQUEST, &body);
        assert_eq!(err.code(), ErrorCode::Forbidden);
        assert_eq!(err.message(), "no access");
    }

    #[test]
    fn test_from_response_falls_back_to_status() {
        let err = UploadError::from_response(StatusCode::NOT_FOUND, &Value::Null);
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert_eq!(err.message(), "Request failed with status 404");
    }

    #[test]
    fn test_cause_is_kept_as_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err = UploadError::internal("Something broke").with_cause(io);
        assert_eq!(err.to_string(), "Something broke");
        assert_eq!(err.cause().unwrap().to_string(), "disk on fire");
        assert!(std::error::Error::source(&err).is_some());
    }
}
