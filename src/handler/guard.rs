use crate::error::UploadError;

/// Route handlers spawn cleanup tasks on the ambient Tokio runtime, so they
/// refuse to be built anywhere else.
pub fn ensure_supported_runtime() -> Result<(), UploadError> {
    tokio::runtime::Handle::try_current()
        .map(|_| ())
        .map_err(|e| {
            tracing::error!(error = %e, "Upload route handler created outside a Tokio runtime");
            UploadError::internal("Upload route handlers must be created inside a Tokio runtime")
                .with_cause(e)
        })
}
