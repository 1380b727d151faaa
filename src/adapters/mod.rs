//! Bindings of the route handler to HTTP frameworks.
//!
//! Each adapter converts the framework request into an
//! [`UploadRequest`](crate::handler::request::UploadRequest) and writes the
//! handler's response back; no framework type reaches the handler core.

pub mod axum;
pub mod fetch;
pub mod hyper;
