use bytes::Bytes;
use http::StatusCode;

use super::response::{error_response, json_response};
use crate::error::UploadError;
use crate::models::EndpointMetadata;
use crate::router::FileRouter;

/// The static route table as clients see it, one entry per slug.
pub fn route_configs(router: &FileRouter) -> Vec<EndpointMetadata> {
    router
        .iter()
        .map(|(slug, route)| EndpointMetadata {
            slug: slug.to_string(),
            config: route.config().clone(),
        })
        .collect()
}

/// Response for `GET /<mount>`.
pub fn permissions_response(router: &FileRouter) -> http::Response<Bytes> {
    match serde_json::to_value(route_configs(router)) {
        Ok(body) => json_response(StatusCode::OK, &body),
        Err(e) => error_response(
            &UploadError::internal("Failed to serialize route config").with_cause(e),
            router,
        ),
    }
}
