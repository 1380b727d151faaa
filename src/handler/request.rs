use bytes::Bytes;
use http::{HeaderMap, Method, Uri};
use serde::Deserialize;

use crate::error::UploadError;

/// What a POST asks the handler to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    #[default]
    Upload,
    Failure,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerQuery {
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub action_type: Option<ActionType>,
}

/// A framework-independent HTTP request. Adapters build one per call.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    slug: Option<String>,
}

impl UploadRequest {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            uri,
            headers,
            body,
            slug: None,
        }
    }

    pub fn from_http(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self::new(parts.method, parts.uri, parts.headers, body)
    }

    /// Set the slug from a path segment. Takes precedence over `?slug=`.
    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The slug supplied by the adapter, if any.
    pub fn path_slug(&self) -> Option<&str> {
        self.slug.as_deref()
    }

    pub fn query(&self) -> Result<HandlerQuery, UploadError> {
        let query = self.uri.query().unwrap_or_default();
        serde_qs::from_str(query)
            .map_err(|e| UploadError::bad_request(format!("Invalid query parameter: {e}")))
    }

    /// `scheme://host` of the request, from the absolute URI or the `Host` header.
    pub fn origin(&self) -> Option<String> {
        if let (Some(scheme), Some(authority)) = (self.uri.scheme_str(), self.uri.authority()) {
            return Some(format!("{scheme}://{authority}"));
        }

        let host = self
            .header("x-forwarded-host")
            .or_else(|| self.header("host"))
            .map(str::trim)
            .filter(|h| !h.is_empty())?;
        let proto = self
            .header("x-forwarded-proto")
            .and_then(|p| p.split(',').next())
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or("http");

        Some(format!("{proto}://{host}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn request(uri: &str) -> UploadRequest {
        UploadRequest::new(
            Method::POST,
            uri.parse().unwrap(),
            HeaderMap::new(),
            Bytes::new(),
        )
    }

    #[test]
    fn test_query_parsing() {
        let query = request("/api/uploadthing?slug=imageUploader&actionType=failure")
            .query()
            .unwrap();
        assert_eq!(query.slug.as_deref(), Some("imageUploader"));
        assert_eq!(query.action_type, Some(ActionType::Failure));

        let query = request("/api/uploadthing").query().unwrap();
        assert_eq!(query.slug, None);
        assert_eq!(query.action_type, None);
    }

    #[test]
    fn test_unknown_action_type_is_rejected() {
        let err = request("/api/uploadthing?slug=a&actionType=explode")
            .query()
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::BadRequest);
    }

    #[test]
    fn test_path_slug() {
        let req = request("/api/uploadthing/avatar?slug=other").with_slug("avatar");
        assert_eq!(req.path_slug(), Some("avatar"));
        assert_eq!(request("/").path_slug(), None);
    }

    #[test]
    fn test_origin_from_absolute_uri() {
        let req = request("https://example.com:8443/api/uploadthing");
        assert_eq!(req.origin().as_deref(), Some("https://example.com:8443"));
    }

    #[test]
    fn test_origin_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("localhost:3000"));
        let req = UploadRequest::new(Method::GET, "/x".parse().unwrap(), headers, Bytes::new());
        assert_eq!(req.origin().as_deref(), Some("http://localhost:3000"));

        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("internal:3000"));
        headers.insert("x-forwarded-host", HeaderValue::from_static("app.example.com"));
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https, http"));
        let req = UploadRequest::new(Method::GET, "/x".parse().unwrap(), headers, Bytes::new());
        assert_eq!(req.origin().as_deref(), Some("https://app.example.com"));

        assert_eq!(request("/x").origin(), None);
    }
}
