use bytes::Bytes;
use std::path::Path;
use uuid::Uuid;

use crate::models::job::JobStatus;
use crate::services::store::JobStore;

/// A named artifact built from a job's current result.
#[derive(Debug, Clone)]
pub struct Download {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

/// Build the download for `id` from whatever result the store holds right now.
pub fn prepare(store: &JobStore, id: Uuid, prefix: &str) -> Result<Download, DownloadError> {
    let job = store.get(id).ok_or(DownloadError::NotFound(id))?;
    let result = match (job.status(), job.result()) {
        (JobStatus::Success, Some(result)) => result,
        (status, _) => return Err(DownloadError::NotReady { id, status }),
    };

    Ok(Download {
        file_name: download_name(prefix, job.file_name()),
        mime_type: result.mime_type().to_string(),
        bytes: result.bytes().clone(),
    })
}

/// Prefix the last path component of the original name.
pub fn download_name(prefix: &str, original: &str) -> String {
    let base = Path::new(original)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("image");
    format!("{prefix}{base}")
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DownloadError {
    #[error("Job {0} not found")]
    NotFound(Uuid),

    #[error("Job {id} has no downloadable result (status: {status})")]
    NotReady { id: Uuid, status: JobStatus },
}
