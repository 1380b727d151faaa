use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use uploadthing_server::{
    adapters,
    config::{Config, UploadBackend},
    error::UploadError,
    f,
    logger::{self, LogFormat},
    router::config::{FileRouteOptions, FileSize, FileTypeKey, RouteConfig},
    router::FileRouter,
    upload_api::{HostedApi, LocalApi, UploadApi},
    RouterWithConfig,
};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserMetadata {
    user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentInput {
    folder: String,
}

fn file_router() -> FileRouter {
    FileRouter::new()
        .route(
            "imageUploader",
            f(RouteConfig::new().image(
                FileRouteOptions::new()
                    .max_file_size(FileSize::mb(4))
                    .max_file_count(4),
            ))
            .middleware(|ctx| async move {
                let user_id = ctx
                    .headers
                    .get("x-user-id")
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| UploadError::unauthorized("Missing x-user-id header"))?;
                Ok::<_, anyhow::Error>(UserMetadata {
                    user_id: user_id.to_string(),
                })
            })
            .on_upload_complete(|ctx| async move {
                info!(user_id = %ctx.metadata.user_id, url = %ctx.file.url, "Image uploaded");
                Ok(())
            }),
        )
        .route(
            "pdfUploader",
            f(FileTypeKey::Pdf)
                .input::<DocumentInput>()
                .middleware(|ctx| async move {
                    if ctx.input.folder.is_empty() {
                        return Err(anyhow::Error::new(UploadError::bad_request(
                            "Folder must not be empty",
                        )));
                    }
                    Ok::<_, anyhow::Error>(serde_json::json!({ "folder": ctx.input.folder }))
                })
                .on_upload_error(|ctx| async move {
                    tracing::warn!(file_key = %ctx.file_key, error = %ctx.error, "Document upload failed");
                    Ok(())
                })
                .on_upload_complete(|ctx| async move {
                    info!(folder = %ctx.metadata["folder"], name = %ctx.file.name, "Document uploaded");
                    Ok(())
                }),
        )
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    logger::init(config.upload.log_level, LogFormat::from_env());

    info!(version = uploadthing_server::VERSION, "uploadthing-server starting");

    let api: Arc<dyn UploadApi> = match config.server.backend {
        UploadBackend::Hosted => {
            let api_key = config
                .upload
                .api_key
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("UPLOADTHING_SECRET is required"))?;
            info!(api_url = %config.upload.api_url, "Using hosted upload backend");
            Arc::new(HostedApi::new(&config.upload.api_url, api_key)?)
        }
        UploadBackend::Local => {
            info!(file_url = %config.server.local_file_url, "Using local upload backend");
            Arc::new(LocalApi::new(&config.server.local_file_url))
        }
    };

    let opts = RouterWithConfig::new(file_router(), config.upload.clone(), api);
    let uploads = adapters::axum::create_route_handler(opts)?;
    let app = axum::Router::new().nest(&config.server.mount_path, uploads);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    info!(
        "Listening on: {}{}",
        config.server.bind_address, config.server.mount_path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
