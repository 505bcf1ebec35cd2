use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use bytes::Bytes;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::storage::StorageClient;

const DEFAULT_FOLDER: &str = "uploads";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("local file {} does not exist", .0.display())]
    MissingFile(PathBuf),
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("remote transfer failed: {0:#}")]
    Transfer(anyhow::Error),
    #[error("upload timed out after {0:?}")]
    TimedOut(Duration),
}

/// Pushes locally staged files to the object store. The local file is removed
/// once `upload` returns, whatever the outcome.
#[derive(Clone)]
pub struct UploadGateway {
    storage: Arc<dyn StorageClient>,
    timeout: Duration,
}

impl UploadGateway {
    pub fn new(storage: Arc<dyn StorageClient>, timeout: Duration) -> Self {
        Self { storage, timeout }
    }

    /// Not idempotent: every call stores a new remote object.
    #[instrument(skip(self), fields(path = %local.display()))]
    pub async fn upload(&self, local: &Path, folder: Option<&str>) -> Result<String, UploadError> {
        let outcome = match tokio::time::timeout(self.timeout, self.transfer(local, folder)).await {
            Ok(res) => res,
            Err(_) => Err(UploadError::TimedOut(self.timeout)),
        };

        remove_local(local).await;

        match &outcome {
            Ok(url) => info!(%url, "file uploaded"),
            Err(e) => error!(error = %e, "file upload failed"),
        }
        outcome
    }

    async fn transfer(&self, local: &Path, folder: Option<&str>) -> Result<String, UploadError> {
        let body = match tokio::fs::read(local).await {
            Ok(b) => Bytes::from(b),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(UploadError::MissingFile(local.to_path_buf()))
            }
            Err(source) => {
                return Err(UploadError::Read {
                    path: local.to_path_buf(),
                    source,
                })
            }
        };

        let (content_type, ext) = sniff(&body);
        let folder = folder
            .map(|f| f.trim_matches('/'))
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_FOLDER);
        let key = format!("{}/{}.{}", folder, Uuid::new_v4(), ext);

        self.storage
            .put_object(&key, body, content_type)
            .await
            .map_err(UploadError::Transfer)?;

        Ok(self.storage.public_url(&key))
    }
}

async fn remove_local(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(error = %e, path = %path.display(), "could not delete local file"),
    }
}

/// Resource type from the leading bytes of the file.
fn sniff(body: &[u8]) -> (&'static str, &'static str) {
    if body.starts_with(b"%PDF") {
        ("application/pdf", "pdf")
    } else if body.starts_with(&[0x89, b'P', b'N', b'G']) {
        ("image/png", "png")
    } else if body.starts_with(&[0xFF, 0xD8, 0xFF]) {
        ("image/jpeg", "jpg")
    } else {
        ("application/octet-stream", "bin")
    }
}
