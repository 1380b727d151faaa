//! uploadthing-server - server side of a hosted file-upload service
//!
//! Applications declare typed file routes, and this crate serves them over HTTP:
//! - A route builder with per-type size/count limits and typed middleware
//! - A framework-independent handler for upload, failure and webhook requests
//! - Adapters for axum, hyper and plain `http` request/response values
//! - Hosted and in-memory upload backends

pub mod adapters;
pub mod config;
pub mod error;
pub mod handler;
pub mod logger;
pub mod models;
pub mod router;
pub mod upload_api;

use std::fmt;
use std::sync::Arc;

use config::RouterConfig;
use router::FileRouter;
use upload_api::UploadApi;

pub use error::{ErrorCode, UploadError};
pub use handler::permissions::route_configs as extract_router_config;
pub use router::{f, FileRoute};

/// Sent with every response as `x-uploadthing-version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything an adapter needs: the routes, the deployment settings and the
/// service that hands out upload URLs.
pub struct RouterWithConfig {
    pub router: FileRouter,
    pub config: RouterConfig,
    pub api: Arc<dyn UploadApi>,
}

impl RouterWithConfig {
    pub fn new(router: FileRouter, config: RouterConfig, api: Arc<dyn UploadApi>) -> Self {
        Self {
            router,
            config,
            api,
        }
    }
}

impl fmt::Debug for RouterWithConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterWithConfig")
            .field("router", &self.router)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
