use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, FromRequest, OriginalUri, Path, Request, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::error::UploadError;
use crate::handler::request::UploadRequest;
use crate::handler::response::ResponseWithCleanup;
use crate::handler::RouteHandler;
use crate::RouterWithConfig;

const ADAPTER: &str = "axum";

/// Build an axum router serving the upload routes. Nest it under the mount path:
///
/// ```no_run
/// # use std::sync::Arc;
/// # use uploadthing_server::{f, RouterWithConfig};
/// # use uploadthing_server::config::RouterConfig;
/// # use uploadthing_server::router::FileRouter;
/// # use uploadthing_server::router::config::FileTypeKey;
/// # use uploadthing_server::upload_api::LocalApi;
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let router = FileRouter::new().route(
///     "imageUploader",
///     f(FileTypeKey::Image).on_upload_complete(|ctx| async move {
///         tracing::info!(url = %ctx.file.url, "uploaded");
///         Ok(())
///     }),
/// );
/// let opts = RouterWithConfig::new(
///     router,
///     RouterConfig::default(),
///     Arc::new(LocalApi::new("http://localhost:8080/f")),
/// );
/// let app = axum::Router::new().nest(
///     "/api/uploadthing",
///     uploadthing_server::adapters::axum::create_route_handler(opts)?,
/// );
/// # let _ = app;
/// # Ok(())
/// # }
/// ```
pub fn create_route_handler(opts: RouterWithConfig) -> Result<Router, UploadError> {
    let body_limit = opts.config.max_body_size;
    let handler = RouteHandler::new(opts, ADAPTER)?;

    Ok(Router::new()
        .route(
            "/",
            get(permissions).post(upload).fallback(method_not_supported),
        )
        .route(
            "/:slug",
            post(upload_with_slug).fallback(method_not_supported),
        )
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(handler))
}

async fn permissions(State(handler): State<RouteHandler>) -> Response {
    into_axum(handler.get())
}

async fn upload(
    State(handler): State<RouteHandler>,
    UploadRequestBody(req): UploadRequestBody,
) -> Response {
    respond(&handler, req).await
}

async fn upload_with_slug(
    State(handler): State<RouteHandler>,
    Path(slug): Path<String>,
    UploadRequestBody(req): UploadRequestBody,
) -> Response {
    respond(&handler, req.with_slug(slug)).await
}

async fn method_not_supported(State(handler): State<RouteHandler>, method: Method) -> Response {
    into_axum(handler.error_response(&UploadError::bad_request(format!(
        "Method {method} not supported"
    ))))
}

async fn not_found(State(handler): State<RouteHandler>, OriginalUri(uri): OriginalUri) -> Response {
    into_axum(handler.error_response(&UploadError::not_found(format!(
        "No upload route at {}",
        uri.path()
    ))))
}

async fn respond(handler: &RouteHandler, req: UploadRequest) -> Response {
    let ResponseWithCleanup { response, cleanup } = handler.post(req).await;
    // The server outlives the request; the task runs on detached.
    drop(cleanup);
    into_axum(response)
}

fn into_axum(response: http::Response<Bytes>) -> Response {
    response.map(Body::from).into_response()
}

// ============================================================================
// Extractor (rejects with the router's error format)
// ============================================================================

/// The request as the handler core sees it, with the pre-nesting URI.
pub struct UploadRequestBody(pub UploadRequest);

#[axum::async_trait]
impl FromRequest<RouteHandler> for UploadRequestBody {
    type Rejection = Response;

    async fn from_request(req: Request, handler: &RouteHandler) -> Result<Self, Response> {
        let uri = req
            .extensions()
            .get::<OriginalUri>()
            .map(|OriginalUri(uri)| uri.clone())
            .unwrap_or_else(|| req.uri().clone());
        let method = req.method().clone();
        let headers = req.headers().clone();

        let body = Bytes::from_request(req, handler).await.map_err(|rejection| {
            let message = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                "Request body too large"
            } else {
                "Failed to read request body"
            };
            into_axum(handler.error_response(&UploadError::bad_request(message)))
        })?;

        Ok(Self(UploadRequest::new(method, uri, headers, body)))
    }
}
