use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::models::job::{ImageJob, JobStatus, Pass};

/// JSON view of a job. Image bytes are served by the raw endpoints.
#[derive(Debug, Serialize)]
pub struct JobView {
    pub job_id: Uuid,
    pub file_name: String,
    pub mime_type: String,
    pub status: JobStatus,
    pub error: Option<String>,
    pub pass: Pass,
    pub has_result: bool,
    pub source_fingerprint: String,
    pub source_bytes: usize,
    pub result_bytes: Option<usize>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&ImageJob> for JobView {
    fn from(job: &ImageJob) -> Self {
        Self {
            job_id: job.id(),
            file_name: job.file_name().to_string(),
            mime_type: job.source().mime_type().to_string(),
            status: job.status(),
            error: job.error().map(str::to_string),
            pass: job.pass(),
            has_result: job.result().is_some(),
            source_fingerprint: job.source().fingerprint().to_string(),
            source_bytes: job.source().len(),
            result_bytes: job.result().map(|r| r.len()),
            created_at: job.created_at(),
            updated_at: job.updated_at(),
        }
    }
}

/// Response after uploading a batch of images.
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub accepted: Vec<JobView>,
    /// Files dropped as duplicates or as unreadable.
    pub skipped: usize,
}

/// Per-status job counts, keyed by the status string.
pub type StatusCounts = BTreeMap<JobStatus, usize>;
