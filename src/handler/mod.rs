//! Framework-independent request handling shared by every adapter.

mod actions;
pub mod guard;
pub mod permissions;
pub mod request;
pub mod response;
pub mod signature;

use std::sync::Arc;

use bytes::Bytes;
use http::Method;
use serde_json::Value;

use crate::config::RouterConfig;
use crate::error::UploadError;
use crate::logger::{self, LogFormat};
use crate::router::FileRouter;
use crate::RouterWithConfig;
use actions::Action;
use request::{ActionType, UploadRequest};
use response::{HandlerResponse, ResponseWithCleanup};

pub use response::CleanupHandle;

/// Header the hosted service sets on webhook requests.
pub const HOOK_HEADER: &str = "uploadthing-hook";

/// The core every adapter delegates to.
#[derive(Clone)]
pub struct RouteHandler {
    opts: Arc<RouterWithConfig>,
    adapter: String,
}

impl RouteHandler {
    /// Must be called inside a Tokio runtime. Installs the logger on first use.
    pub fn new(opts: RouterWithConfig, adapter: impl Into<String>) -> Result<Self, UploadError> {
        logger::init(opts.config.log_level, LogFormat::from_env());
        guard::ensure_supported_runtime()?;

        let adapter = adapter.into();
        tracing::debug!(adapter = %adapter, routes = opts.router.len(), "Created upload route handler");

        Ok(Self {
            opts: Arc::new(opts),
            adapter,
        })
    }

    pub fn adapter(&self) -> &str {
        &self.adapter
    }

    pub fn router(&self) -> &FileRouter {
        &self.opts.router
    }

    pub fn config(&self) -> &RouterConfig {
        &self.opts.config
    }

    /// Dispatch a POST to the webhook or the requested action.
    pub async fn handle(&self, req: UploadRequest) -> Result<HandlerResponse, UploadError> {
        let body = parse_body(req.body())?;
        let query = req.query()?;

        let slug = req
            .path_slug()
            .or(query.slug.as_deref())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| UploadError::bad_request("No slug provided"))?;

        let route = self
            .opts
            .router
            .get(slug)
            .ok_or_else(|| UploadError::not_found(format!("No file route found for slug {slug}")))?;

        let action = Action {
            slug,
            route,
            req: &req,
            opts: &self.opts,
            adapter: &self.adapter,
        };

        if let Some(hook) = req.header(HOOK_HEADER) {
            return match hook {
                "callback" => actions::upload_callback(&action, body).await,
                other => Err(UploadError::bad_request(format!("Unknown hook type: {other}"))),
            };
        }

        match query.action_type.unwrap_or_default() {
            ActionType::Upload => actions::upload(&action, body).await,
            ActionType::Failure => actions::failure(&action, body).await,
        }
    }

    pub async fn post(&self, req: UploadRequest) -> ResponseWithCleanup {
        let outcome = self.handle(req).await;
        response::into_http_response(outcome, &self.opts.router)
    }

    /// The route table. Never invokes user callbacks.
    pub fn get(&self) -> http::Response<Bytes> {
        permissions::permissions_response(&self.opts.router)
    }

    /// Route by method, for adapters that see every request.
    pub async fn respond(&self, req: UploadRequest) -> ResponseWithCleanup {
        let method = req.method().clone();
        match method {
            Method::GET => ResponseWithCleanup {
                response: self.get(),
                cleanup: None,
            },
            Method::POST => self.post(req).await,
            other => ResponseWithCleanup {
                response: self.error_response(&UploadError::bad_request(format!(
                    "Method {other} not supported"
                ))),
                cleanup: None,
            },
        }
    }

    /// Error response formatted with this router's formatter.
    pub fn error_response(&self, error: &UploadError) -> http::Response<Bytes> {
        response::error_response(error, &self.opts.router)
    }
}

/// An empty body reads as `{}`.
fn parse_body(body: &Bytes) -> Result<Value, UploadError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(body)
        .map_err(|e| UploadError::bad_request("Invalid JSON body").with_cause(e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(&Bytes::new()).unwrap(), serde_json::json!({}));
        assert_eq!(parse_body(&Bytes::from_static(b"  \n")).unwrap(), serde_json::json!({}));
        assert_eq!(
            parse_body(&Bytes::from_static(br#"{"files":[]}"#)).unwrap(),
            serde_json::json!({ "files": [] })
        );

        let err = parse_body(&Bytes::from_static(b"{not json")).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::BadRequest);
        assert_eq!(err.message(), "Invalid JSON body");
    }
}
