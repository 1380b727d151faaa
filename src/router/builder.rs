//! Fluent builder for file routes.
//!
//! ```no_run
//! use uploadthing_server::error::UploadError;
//! use uploadthing_server::router::builder::f;
//! use uploadthing_server::router::config::FileTypeKey;
//!
//! let route = f(FileTypeKey::Image)
//!     .middleware(|ctx| async move {
//!         let user = ctx
//!             .headers
//!             .get("x-user-id")
//!             .and_then(|v| v.to_str().ok())
//!             .ok_or_else(|| UploadError::unauthorized("Missing user"))?;
//!         Ok::<_, anyhow::Error>(serde_json::json!({ "userId": user }))
//!     })
//!     .on_upload_complete(|ctx| async move {
//!         tracing::info!(key = %ctx.file.key, "upload done");
//!         Ok(())
//!     });
//! ```

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use http::HeaderMap;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::config::RouteConfig;
use super::{callback_error, FileRoute, MiddlewareArgs, RouteCallbacks};
use crate::error::UploadError;
use crate::models::{FileInfo, UploadedFile};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;
type MiddlewareFn<I, M> =
    Arc<dyn Fn(MiddlewareContext<I>) -> BoxFuture<anyhow::Result<M>> + Send + Sync>;
type UploadCompleteFn<M> =
    Arc<dyn Fn(UploadCompleteContext<M>) -> BoxFuture<anyhow::Result<()>> + Send + Sync>;
type UploadErrorFn = Arc<dyn Fn(UploadErrorContext) -> BoxFuture<anyhow::Result<()>> + Send + Sync>;

// ============================================================================
// Callback contexts
// ============================================================================

/// Passed to the middleware of a route for every upload request.
#[derive(Debug, Clone)]
pub struct MiddlewareContext<I> {
    pub slug: String,
    pub headers: HeaderMap,
    pub files: Vec<FileInfo>,
    pub input: I,
}

/// Passed to `on_upload_complete` once the hosted service has the file.
#[derive(Debug, Clone)]
pub struct UploadCompleteContext<M> {
    pub metadata: M,
    pub file: UploadedFile,
}

/// Passed to `on_upload_error` when a client reports a failed upload.
#[derive(Debug)]
pub struct UploadErrorContext {
    pub error: UploadError,
    pub file_key: String,
}

/// Input of a route without `.input::<J>()`. Any value the client sends is
/// accepted and dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoInput;

impl<'de> Deserialize<'de> for NoInput {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        IgnoredAny::deserialize(deserializer)?;
        Ok(NoInput)
    }
}

/// Metadata of a route without middleware. Serializes as `null`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoMetadata;

// ============================================================================
// Builder
// ============================================================================

pub struct UploadBuilder<I, M> {
    config: RouteConfig,
    middleware: MiddlewareFn<I, M>,
    on_upload_error: Option<UploadErrorFn>,
}

/// Start a file route accepting the given file types.
pub fn f(config: impl Into<RouteConfig>) -> UploadBuilder<NoInput, NoMetadata> {
    UploadBuilder {
        config: config.into(),
        middleware: no_middleware(),
        on_upload_error: None,
    }
}

fn no_middleware<I: Send + 'static>() -> MiddlewareFn<I, NoMetadata> {
    Arc::new(
        |_: MiddlewareContext<I>| -> BoxFuture<anyhow::Result<NoMetadata>> {
            Box::pin(async { Ok(NoMetadata) })
        },
    )
}

impl UploadBuilder<NoInput, NoMetadata> {
    /// Declare the JSON input clients must send with the upload request.
    /// Requests whose `input` does not deserialize into `J` are rejected
    /// before the middleware runs.
    pub fn input<J>(self) -> UploadBuilder<J, NoMetadata>
    where
        J: DeserializeOwned + Send + 'static,
    {
        UploadBuilder {
            config: self.config,
            middleware: no_middleware(),
            on_upload_error: self.on_upload_error,
        }
    }
}

impl<I: Send + 'static> UploadBuilder<I, NoMetadata> {
    /// Authorize the request and produce the metadata handed to
    /// `on_upload_complete`. Returning an [`UploadError`] (through `anyhow`)
    /// sends it to the client as is; any other error becomes a generic 500.
    pub fn middleware<M, F, Fut>(self, f: F) -> UploadBuilder<I, M>
    where
        M: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(MiddlewareContext<I>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<M>> + Send + 'static,
    {
        UploadBuilder {
            config: self.config,
            middleware: Arc::new(
                move |ctx: MiddlewareContext<I>| -> BoxFuture<anyhow::Result<M>> {
                    Box::pin(f(ctx))
                },
            ),
            on_upload_error: self.on_upload_error,
        }
    }
}

impl<I, M> UploadBuilder<I, M>
where
    I: DeserializeOwned + Send + 'static,
    M: Serialize + DeserializeOwned + Send + 'static,
{
    pub fn on_upload_error<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(UploadErrorContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_upload_error = Some(Arc::new(
            move |ctx: UploadErrorContext| -> BoxFuture<anyhow::Result<()>> { Box::pin(f(ctx)) },
        ));
        self
    }

    /// Finish the route.
    pub fn on_upload_complete<F, Fut>(self, f: F) -> FileRoute
    where
        F: Fn(UploadCompleteContext<M>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let on_upload_complete: UploadCompleteFn<M> = Arc::new(
            move |ctx: UploadCompleteContext<M>| -> BoxFuture<anyhow::Result<()>> {
                Box::pin(f(ctx))
            },
        );

        FileRoute::new(
            self.config.expand(),
            Arc::new(TypedCallbacks {
                middleware: self.middleware,
                on_upload_complete,
                on_upload_error: self.on_upload_error,
                _types: PhantomData,
            }),
        )
    }
}

// ============================================================================
// Type erasure
// ============================================================================

struct TypedCallbacks<I, M> {
    middleware: MiddlewareFn<I, M>,
    on_upload_complete: UploadCompleteFn<M>,
    on_upload_error: Option<UploadErrorFn>,
    _types: PhantomData<fn() -> (I, M)>,
}

#[async_trait]
impl<I, M> RouteCallbacks for TypedCallbacks<I, M>
where
    I: DeserializeOwned + Send + 'static,
    M: Serialize + DeserializeOwned + Send + 'static,
{
    async fn run_middleware(&self, args: MiddlewareArgs<'_>) -> Result<Value, UploadError> {
        let input: I = serde_json::from_value(args.input)
            .map_err(|e| UploadError::bad_request("Invalid input").with_cause(e))?;

        let ctx = MiddlewareContext {
            slug: args.slug.to_string(),
            headers: args.headers.clone(),
            files: args.files.to_vec(),
            input,
        };
        let metadata = (self.middleware)(ctx)
            .await
            .map_err(|e| callback_error(e, "Failed to run middleware"))?;

        serde_json::to_value(metadata)
            .map_err(|e| UploadError::internal("Failed to serialize metadata").with_cause(e))
    }

    async fn on_upload_complete(
        &self,
        metadata: Value,
        file: UploadedFile,
    ) -> Result<(), UploadError> {
        let metadata: M = serde_json::from_value(metadata)
            .map_err(|e| UploadError::bad_request("Invalid metadata").with_cause(e))?;

        (self.on_upload_complete)(UploadCompleteContext { metadata, file })
            .await
            .map_err(|e| callback_error(e, "Failed to run onUploadComplete"))
    }

    async fn on_upload_error(&self, ctx: UploadErrorContext) -> Result<(), UploadError> {
        let Some(on_upload_error) = &self.on_upload_error else {
            return Ok(());
        };

        on_upload_error(ctx)
            .await
            .map_err(|e| callback_error(e, "Failed to run onUploadError"))
    }
}
