use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to read payload file {}", .path.display())]
pub struct PayloadError {
    path: PathBuf,
    #[source]
    source: std::io::Error,
}

/// Read the message body every emitted entry carries.
pub async fn load_payload(path: &Path) -> Result<Arc<str>, PayloadError> {
    let payload = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| PayloadError {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(payload.into())
}
