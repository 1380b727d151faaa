pub mod builder;
pub mod config;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use http::HeaderMap;
use serde_json::Value;

use crate::error::UploadError;
use crate::models::{FileInfo, UploadedFile};
use builder::UploadErrorContext;
use config::ExpandedRouteConfig;

pub use builder::{f, NoInput, NoMetadata};

/// Turns a route's error into extra client data placed under `data`.
pub type ErrorFormatter = Arc<dyn Fn(&UploadError) -> Value + Send + Sync>;

/// Arguments of a middleware run, borrowed from the request being handled.
pub struct MiddlewareArgs<'a> {
    pub slug: &'a str,
    pub headers: &'a HeaderMap,
    pub files: &'a [FileInfo],
    pub input: Value,
}

/// The callbacks of a route with their input and metadata types erased to JSON.
#[async_trait]
pub trait RouteCallbacks: Send + Sync {
    async fn run_middleware(&self, args: MiddlewareArgs<'_>) -> Result<Value, UploadError>;
    async fn on_upload_complete(&self, metadata: Value, file: UploadedFile)
        -> Result<(), UploadError>;
    async fn on_upload_error(&self, ctx: UploadErrorContext) -> Result<(), UploadError>;
}

/// Map an error returned by user code to the error sent to the client.
/// `UploadError`s are kept; anything else is logged and hidden.
pub(crate) fn callback_error(err: anyhow::Error, message: &str) -> UploadError {
    match err.downcast::<UploadError>() {
        Ok(err) => err,
        Err(err) => {
            tracing::error!(error = ?err, "{message}");
            UploadError::internal(message).with_cause(err)
        }
    }
}

/// An upload endpoint: its constraints and callbacks. Cheap to clone.
#[derive(Clone)]
pub struct FileRoute {
    config: ExpandedRouteConfig,
    callbacks: Arc<dyn RouteCallbacks>,
}

impl FileRoute {
    pub(crate) fn new(config: ExpandedRouteConfig, callbacks: Arc<dyn RouteCallbacks>) -> Self {
        Self { config, callbacks }
    }

    pub fn config(&self) -> &ExpandedRouteConfig {
        &self.config
    }

    pub fn callbacks(&self) -> &dyn RouteCallbacks {
        self.callbacks.as_ref()
    }
}

impl fmt::Debug for FileRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileRoute")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// The routes an application exposes, keyed by slug.
#[derive(Clone, Default)]
pub struct FileRouter {
    routes: BTreeMap<String, FileRoute>,
    error_formatter: Option<ErrorFormatter>,
}

impl FileRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, slug: impl Into<String>, route: FileRoute) -> Self {
        self.routes.insert(slug.into(), route);
        self
    }

    pub fn error_formatter<F>(mut self, formatter: F) -> Self
    where
        F: Fn(&UploadError) -> Value + Send + Sync + 'static,
    {
        self.error_formatter = Some(Arc::new(formatter));
        self
    }

    pub fn get(&self, slug: &str) -> Option<&FileRoute> {
        self.routes.get(slug)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileRoute)> {
        self.routes.iter().map(|(slug, route)| (slug.as_str(), route))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Output of the custom error formatter, if one is set.
    pub fn format_custom(&self, error: &UploadError) -> Option<Value> {
        self.error_formatter.as_ref().map(|format| format(error))
    }
}

impl fmt::Debug for FileRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileRouter")
            .field("routes", &self.routes)
            .field("error_formatter", &self.error_formatter.is_some())
            .finish()
    }
}
