//! Request and response artifacts in the shared permission directory.

use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use permbroker_core::protocol::response_file_name;
use permbroker_core::{Error as CoreError, PermissionReply, PermissionRequest};

use crate::permission::PermissionError;

/// Persists verdicts as `response-<requestId>.json`.
///
/// Failures are logged and swallowed; a requester that never sees its
/// response applies its own timeout.
#[derive(Debug, Clone)]
pub struct ResponseWriter {
    dir: PathBuf,
}

impl ResponseWriter {
    pub const fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Path the response for `request_id` is written to.
    pub fn response_path(&self, request_id: &str) -> PathBuf {
        self.dir.join(response_file_name(request_id))
    }

    /// Write the response artifact. Returns whether it was written.
    pub async fn write(&self, request_id: &str, allow: bool) -> bool {
        match self.try_write(request_id, allow).await {
            Ok(path) => {
                debug!(request_id, allow, path = %path.display(), "Wrote permission response");
                true
            }
            Err(e) => {
                error!(request_id, allow, error = %e, "Failed to write permission response");
                false
            }
        }
    }

    async fn try_write(&self, request_id: &str, allow: bool) -> std::io::Result<PathBuf> {
        let body = serde_json::to_vec(&PermissionReply::new(allow)).map_err(std::io::Error::other)?;
        let path = self.response_path(request_id);
        // Written under a name the requester ignores, then renamed into place.
        let staging = self.dir.join(format!(".{}.tmp", response_file_name(request_id)));

        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&staging, &body).await?;
        if let Err(e) = tokio::fs::rename(&staging, &path).await {
            if let Err(cleanup) = tokio::fs::remove_file(&staging).await {
                warn!(
                    path = %staging.display(),
                    error = %cleanup,
                    "Failed to remove staged response"
                );
            }
            return Err(e);
        }
        Ok(path)
    }
}

/// Read and parse a request artifact.
pub async fn read_request(path: &Path) -> Result<PermissionRequest, PermissionError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| PermissionError::Read {
            path: path.display().to_string(),
            source,
        })?;

    PermissionRequest::parse(&bytes).map_err(|e| PermissionError::Malformed {
        path: path.display().to_string(),
        reason: match e {
            CoreError::MalformedRequest(reason) => reason,
            other => other.to_string(),
        },
    })
}

/// Delete a request artifact. A missing file counts as removed.
pub async fn remove_request(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Removed request artifact");
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove request artifact");
            false
        }
    }
}
