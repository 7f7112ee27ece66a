//! Turns uploaded files into queued jobs.
//!
//! All files in a batch are decoded concurrently; the store is touched once,
//! after every decode has settled. Unreadable files are logged and dropped,
//! duplicates are dropped silently by the store.

use bytes::Bytes;
use futures::future::join_all;
use std::path::PathBuf;

use crate::models::job::{ImageJob, ImagePayload};
use crate::services::store::JobStore;

/// Where an uploaded file's bytes live.
#[derive(Debug, Clone)]
pub enum FileSource {
    Memory(Bytes),
    Path(PathBuf),
}

/// One file from an upload batch.
#[derive(Debug, Clone)]
pub struct RawFile {
    pub file_name: String,
    /// Media type as declared by the uploader, if any.
    pub declared_mime: Option<String>,
    pub source: FileSource,
}

impl RawFile {
    pub fn from_bytes(
        file_name: impl Into<String>,
        declared_mime: Option<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            declared_mime,
            source: FileSource::Memory(bytes.into()),
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            file_name,
            declared_mime: None,
            source: FileSource::Path(path),
        }
    }
}

/// Outcome of one batch.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub accepted: Vec<ImageJob>,
    pub unreadable: usize,
    pub duplicates: usize,
}

impl IngestReport {
    pub fn skipped(&self) -> usize {
        self.unreadable + self.duplicates
    }
}

/// Decode a batch and append the new, non-duplicate jobs to `store`.
pub async fn ingest(store: &JobStore, files: Vec<RawFile>) -> IngestReport {
    let total = files.len();
    let decoded = join_all(files.into_iter().map(decode)).await;

    let mut candidates = Vec::with_capacity(total);
    let mut unreadable = 0;
    for outcome in decoded {
        match outcome {
            Ok(job) => candidates.push(job),
            Err(e) => {
                unreadable += 1;
                metrics::counter!("watermark_ingest_errors_total").increment(1);
                tracing::warn!(error = %e, "Dropping unreadable upload");
            }
        }
    }

    let offered = candidates.len();
    let accepted = store.append(candidates);
    let duplicates = offered - accepted.len();

    tracing::info!(
        files = total,
        accepted = accepted.len(),
        duplicates,
        unreadable,
        "Ingested upload batch"
    );

    IngestReport {
        accepted,
        unreadable,
        duplicates,
    }
}

/// Read a file and turn it into a queued job.
pub async fn decode(file: RawFile) -> Result<ImageJob, IngestError> {
    let bytes = match file.source {
        FileSource::Memory(bytes) => bytes,
        FileSource::Path(path) => tokio::fs::read(&path)
            .await
            .map(Bytes::from)
            .map_err(|source| IngestError::Read {
                file_name: file.file_name.clone(),
                source,
            })?,
    };

    if bytes.is_empty() {
        return Err(IngestError::Empty(file.file_name));
    }

    let format = image::guess_format(&bytes)
        .map_err(|_| IngestError::UnsupportedFormat(file.file_name.clone()))?;

    let mime_type = match file.declared_mime {
        Some(declared) if declared.starts_with("image/") => declared,
        _ => format.to_mime_type().to_string(),
    };

    Ok(ImageJob::new(file.file_name, ImagePayload::new(bytes, mime_type)))
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Failed to read {file_name}: {source}")]
    Read {
        file_name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} is empty")]
    Empty(String),

    #[error("{0} is not a recognized image")]
    UnsupportedFormat(String),
}
