use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use axum::extract::multipart::Field;
use rand::Rng;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::{config::UploadConfig, error::AppError};

pub const PROFILE_IMAGE_FIELD: &str = "profileImage";
pub const CV_FIELD: &str = "cv";

pub const ALLOWED_CONTENT_TYPES: [&str; 3] = ["image/jpeg", "image/png", "application/pdf"];

/// A request upload written to local disk. The file is removed on drop if
/// it is still there, so a request that fails before upload leaves nothing
/// behind.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    content_type: String,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    #[cfg(test)]
    pub(crate) fn for_path(path: PathBuf, content_type: &str) -> Self {
        Self {
            path,
            content_type: content_type.to_string(),
        }
    }
}

// Drop cannot await, so removal is a blocking call. It is a single unlink.
impl Drop for StagedFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed leftover staged file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(error = %e, path = %self.path.display(), "could not remove staged file"),
        }
    }
}

/// Writes multipart file fields to `{temp_dir}/profile-images` or
/// `{temp_dir}/cvs`, enforcing the content-type allow list and size cap.
#[derive(Debug, Clone)]
pub struct Stager {
    root: PathBuf,
    max_bytes: usize,
}

impl Stager {
    pub fn new(cfg: &UploadConfig) -> Self {
        Self {
            root: cfg.temp_dir.clone(),
            max_bytes: cfg.max_file_bytes,
        }
    }

    /// Destination for a file field, or the reason it is refused.
    pub fn target_for(
        &self,
        field_name: &str,
        content_type: Option<&str>,
        file_name: Option<&str>,
    ) -> Result<PathBuf, AppError> {
        let folder = match field_name {
            PROFILE_IMAGE_FIELD => "profile-images",
            CV_FIELD => "cvs",
            _ => return Err(AppError::validation("Invalid field name")),
        };

        let content_type = content_type.unwrap_or_default();
        if !ALLOWED_CONTENT_TYPES.contains(&content_type) {
            return Err(AppError::validation(
                "Invalid file type. Only JPEG, PNG, and PDF are allowed.",
            ));
        }

        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
        let ext = file_name
            .and_then(|n| Path::new(n).extension())
            .and_then(|e| e.to_str())
            .filter(|e| e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
            .unwrap_or_default();

        Ok(self
            .root
            .join(folder)
            .join(format!("{field_name}-{millis}-{suffix}{ext}")))
    }

    pub async fn stage(&self, mut field: Field<'_>) -> Result<StagedFile, AppError> {
        let name = field.name().unwrap_or_default().to_string();
        let target = self.target_for(&name, field.content_type(), field.file_name())?;
        let content_type = field.content_type().unwrap_or_default().to_string();

        if let Some(dir) = target.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                warn!(error = %e, dir = %dir.display(), "create staging dir failed");
                AppError::internal("Failed to store uploaded file")
            })?;
        }

        let mut out = tokio::fs::File::create(&target).await.map_err(|e| {
            warn!(error = %e, path = %target.display(), "create staged file failed");
            AppError::internal("Failed to store uploaded file")
        })?;
        let staged = StagedFile {
            path: target,
            content_type,
        };

        let mut written = 0usize;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| AppError::validation(e.body_text()))?
        {
            written += chunk.len();
            if written > self.max_bytes {
                return Err(AppError::validation(too_large_message(self.max_bytes)));
            }
            out.write_all(&chunk).await.map_err(|e| {
                warn!(error = %e, "write staged file failed");
                AppError::internal("Failed to store uploaded file")
            })?;
        }
        out.flush().await.map_err(|e| {
            warn!(error = %e, "flush staged file failed");
            AppError::internal("Failed to store uploaded file")
        })?;

        debug!(field = %name, bytes = written, path = %staged.path.display(), "file staged");
        Ok(staged)
    }
}

fn too_large_message(max_bytes: usize) -> String {
    const MIB: usize = 1024 * 1024;
    let limit = if max_bytes >= MIB && max_bytes % MIB == 0 {
        format!("{} MB", max_bytes / MIB)
    } else if max_bytes >= 1024 {
        format!("{} KB", max_bytes / 1024)
    } else {
        format!("{max_bytes} bytes")
    };
    format!("File too large. Maximum size is {limit}.")
}
