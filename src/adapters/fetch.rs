use bytes::Bytes;

use crate::error::UploadError;
use crate::handler::request::UploadRequest;
use crate::handler::response::ResponseWithCleanup;
use crate::handler::RouteHandler;
use crate::RouterWithConfig;

const ADAPTER: &str = "fetch";

pub fn create_route_handler(opts: RouterWithConfig) -> Result<FetchHandler, UploadError> {
    Ok(FetchHandler {
        handler: RouteHandler::new(opts, ADAPTER)?,
    })
}

/// Request/response handler for hosts that hand over whole `http` values.
///
/// `post` returns the cleanup handle so hosts that stop executing after the
/// response can keep the process alive until polling is done.
#[derive(Clone)]
pub struct FetchHandler {
    handler: RouteHandler,
}

impl FetchHandler {
    pub fn get(&self) -> http::Response<Bytes> {
        self.handler.get()
    }

    pub async fn post(&self, req: http::Request<Bytes>) -> ResponseWithCleanup {
        self.handler.post(UploadRequest::from_http(req)).await
    }

    /// Dispatch on the method. Background work is detached.
    pub async fn handle(&self, req: http::Request<Bytes>) -> http::Response<Bytes> {
        self.handler
            .respond(UploadRequest::from_http(req))
            .await
            .response
    }
}
