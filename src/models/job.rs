use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::services::store::StoreError;

/// Lifecycle of an image job within the session.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Success,
    Error,
}

/// Which payload the next removal call reads from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Pass {
    /// Start again from the uploaded source.
    Full,
    /// Feed the latest result back in, or the source if there is none yet.
    Refine,
}

/// User-initiated request against a single job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum JobAction {
    Process,
    Retry,
    Refine,
}

/// SHA-256 over decoded payload bytes, used for duplicate detection.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &hex::encode(self.0)[..12])
    }
}

/// Image bytes plus their declared media type. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    bytes: Bytes,
    mime_type: String,
    fingerprint: Fingerprint,
}

impl ImagePayload {
    pub fn new(bytes: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        let bytes = bytes.into();
        let fingerprint = Fingerprint::of(&bytes);
        Self {
            bytes,
            mime_type: mime_type.into(),
            fingerprint,
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Atomic rewrite of a job's mutable fields.
#[derive(Debug, Clone)]
pub enum JobPatch {
    Queued { pass: Pass },
    Processing { pass: Pass },
    Succeeded { result: ImagePayload },
    Failed { message: String },
}

impl JobPatch {
    pub fn target(&self) -> JobStatus {
        match self {
            JobPatch::Queued { .. } => JobStatus::Queued,
            JobPatch::Processing { .. } => JobStatus::Processing,
            JobPatch::Succeeded { .. } => JobStatus::Success,
            JobPatch::Failed { .. } => JobStatus::Error,
        }
    }
}

/// One uploaded image and its journey through removal.
///
/// Fields are read-only outside this module; every change goes through
/// [`ImageJob::apply`], which keeps status, result and error consistent.
#[derive(Debug, Clone)]
pub struct ImageJob {
    id: Uuid,
    file_name: String,
    source: ImagePayload,
    result: Option<ImagePayload>,
    status: JobStatus,
    error: Option<String>,
    pass: Pass,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ImageJob {
    /// Fresh job in `queued` with no result.
    pub fn new(file_name: impl Into<String>, source: ImagePayload) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            file_name: file_name.into(),
            source,
            result: None,
            status: JobStatus::Queued,
            error: None,
            pass: Pass::Full,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn source(&self) -> &ImagePayload {
        &self.source
    }

    pub fn result(&self) -> Option<&ImagePayload> {
        self.result.as_ref()
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn pass(&self) -> Pass {
        self.pass
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Pass implied by a user action in the job's current state.
    pub fn pass_for(&self, action: JobAction) -> Result<Pass, StoreError> {
        if self.status == JobStatus::Processing {
            return Err(StoreError::Busy(self.id));
        }
        match action {
            JobAction::Process => Ok(match self.status {
                JobStatus::Queued => self.pass,
                JobStatus::Success => Pass::Refine,
                _ => Pass::Full,
            }),
            JobAction::Retry => Ok(Pass::Full),
            JobAction::Refine if self.result.is_none() => Err(StoreError::NoResult(self.id)),
            JobAction::Refine => Ok(Pass::Refine),
        }
    }

    /// Payload a dispatch with `pass` sends to the remover.
    pub fn input_for(&self, pass: Pass) -> &ImagePayload {
        match (pass, &self.result) {
            (Pass::Refine, Some(result)) => result,
            _ => &self.source,
        }
    }

    /// Apply a transition, rejecting anything the state machine forbids.
    pub fn apply(&mut self, patch: JobPatch) -> Result<(), StoreError> {
        let to = patch.target();
        match patch {
            JobPatch::Queued { pass } | JobPatch::Processing { pass } => {
                if self.status == JobStatus::Processing {
                    return Err(StoreError::Busy(self.id));
                }
                self.status = to;
                self.pass = pass;
                self.error = None;
            }
            JobPatch::Succeeded { result } => {
                self.require_processing(to)?;
                self.status = JobStatus::Success;
                self.result = Some(result);
                self.error = None;
                self.pass = Pass::Full;
            }
            JobPatch::Failed { message } => {
                self.require_processing(to)?;
                self.status = JobStatus::Error;
                self.error = Some(message);
            }
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    fn require_processing(&self, to: JobStatus) -> Result<(), StoreError> {
        if self.status != JobStatus::Processing {
            return Err(StoreError::InvalidTransition {
                id: self.id,
                from: self.status,
                to,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> ImageJob {
        ImageJob::new("cat.png", ImagePayload::new(&b"\x89PNG source"[..], "image/png"))
    }

    fn processing(job: &mut ImageJob, pass: Pass) {
        job.apply(JobPatch::Processing { pass }).unwrap();
    }

    #[test]
    fn test_new_job_is_queued_without_result() {
        let job = job();
        assert_eq!(job.status(), JobStatus::Queued);
        assert!(job.result().is_none());
        assert!(job.error().is_none());
        assert_eq!(job.pass(), Pass::Full);
    }

    #[test]
    fn test_success_sets_result_and_clears_error() {
        let mut job = job();
        processing(&mut job, Pass::Full);
        job.apply(JobPatch::Failed { message: "boom".into() }).unwrap();
        assert_eq!(job.error(), Some("boom"));

        processing(&mut job, Pass::Full);
        assert!(job.error().is_none());
        let result = ImagePayload::new(&b"clean"[..], "image/png");
        job.apply(JobPatch::Succeeded { result: result.clone() }).unwrap();
        assert_eq!(job.status(), JobStatus::Success);
        assert_eq!(job.result(), Some(&result));
        assert!(job.error().is_none());
    }

    #[test]
    fn test_failed_refinement_keeps_last_result() {
        let mut job = job();
        processing(&mut job, Pass::Full);
        let result = ImagePayload::new(&b"first"[..], "image/png");
        job.apply(JobPatch::Succeeded { result: result.clone() }).unwrap();

        processing(&mut job, Pass::Refine);
        job.apply(JobPatch::Failed { message: "nope".into() }).unwrap();
        assert_eq!(job.status(), JobStatus::Error);
        assert_eq!(job.result(), Some(&result));
    }

    #[test]
    fn test_processing_job_rejects_new_dispatch() {
        let mut job = job();
        processing(&mut job, Pass::Full);
        assert!(matches!(
            job.apply(JobPatch::Queued { pass: Pass::Full }),
            Err(StoreError::Busy(_))
        ));
        assert!(matches!(job.pass_for(JobAction::Retry), Err(StoreError::Busy(_))));
    }

    #[test]
    fn test_terminal_patch_requires_processing() {
        let mut job = job();
        let err = job
            .apply(JobPatch::Succeeded {
                result: ImagePayload::new(&b"x"[..], "image/png"),
            })
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition {
                from: JobStatus::Queued,
                to: JobStatus::Success,
                ..
            }
        ));
    }

    #[test]
    fn test_pass_for_actions() {
        let mut job = job();
        assert_eq!(job.pass_for(JobAction::Process).unwrap(), Pass::Full);
        assert!(matches!(job.pass_for(JobAction::Refine), Err(StoreError::NoResult(_))));

        processing(&mut job, Pass::Full);
        job.apply(JobPatch::Succeeded {
            result: ImagePayload::new(&b"out"[..], "image/png"),
        })
        .unwrap();
        assert_eq!(job.pass_for(JobAction::Process).unwrap(), Pass::Refine);
        assert_eq!(job.pass_for(JobAction::Retry).unwrap(), Pass::Full);
        assert_eq!(job.pass_for(JobAction::Refine).unwrap(), Pass::Refine);
    }

    #[test]
    fn test_input_for_prefers_result_only_on_refine() {
        let mut job = job();
        assert_eq!(job.input_for(Pass::Refine), job.source());

        processing(&mut job, Pass::Full);
        let result = ImagePayload::new(&b"out"[..], "image/png");
        job.apply(JobPatch::Succeeded { result: result.clone() }).unwrap();
        assert_eq!(job.input_for(Pass::Refine), &result);
        assert_eq!(&job.input_for(Pass::Full).bytes()[..], b"\x89PNG source");
    }

    #[test]
    fn test_fingerprint_is_content_based() {
        let a = ImagePayload::new(&b"same"[..], "image/png");
        let b = ImagePayload::new(&b"same"[..], "image/jpeg");
        let c = ImagePayload::new(&b"other"[..], "image/png");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().to_string().len(), 64);
    }
}
