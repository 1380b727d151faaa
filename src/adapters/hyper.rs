use std::convert::Infallible;

use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;

use crate::error::UploadError;
use crate::handler::request::UploadRequest;
use crate::handler::RouteHandler;
use crate::RouterWithConfig;

const ADAPTER: &str = "hyper";

pub fn create_route_handler(opts: RouterWithConfig) -> Result<HyperHandler, UploadError> {
    HyperHandler::new(opts)
}

/// Serves the upload routes from a hyper service. Wrap
/// [`handle`](HyperHandler::handle) in `hyper::service::service_fn`; the
/// handler is cheap to clone per connection.
#[derive(Clone)]
pub struct HyperHandler {
    handler: RouteHandler,
    body_limit: usize,
}

impl HyperHandler {
    pub fn new(opts: RouterWithConfig) -> Result<Self, UploadError> {
        let body_limit = opts.config.max_body_size;
        Ok(Self {
            handler: RouteHandler::new(opts, ADAPTER)?,
            body_limit,
        })
    }

    pub async fn handle<B>(&self, req: Request<B>) -> Result<Response<Full<Bytes>>, Infallible>
    where
        B: Body + Send,
        B::Data: Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (parts, body) = req.into_parts();

        let body = match Limited::new(body, self.body_limit).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                let message = if e.downcast_ref::<LengthLimitError>().is_some() {
                    "Request body too large"
                } else {
                    tracing::debug!(error = %e, "Failed to collect request body");
                    "Failed to read request body"
                };
                let response = self.handler.error_response(&UploadError::bad_request(message));
                return Ok(response.map(Full::new));
            }
        };

        let req = UploadRequest::new(parts.method, parts.uri, parts.headers, body);
        let response = self.handler.respond(req).await.response;
        Ok(response.map(Full::new))
    }
}
