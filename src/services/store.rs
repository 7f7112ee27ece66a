//! In-memory job store: the only place job state changes.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::job::{Fingerprint, ImageJob, ImagePayload, JobAction, JobPatch, JobStatus, Pass};
use crate::models::response::StatusCounts;
use crate::services::scheduler;

const EVENT_CAPACITY: usize = 256;

/// Emitted after every successful mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Appended { ids: Vec<Uuid> },
    Updated { id: Uuid, status: JobStatus },
    Cleared,
}

/// A job that has just moved to `processing`, with everything the removal
/// call needs.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub job_id: Uuid,
    pub file_name: String,
    pub pass: Pass,
    pub input: ImagePayload,
    /// Media type results are stored under: always the source's.
    pub container_mime: String,
}

#[derive(Default)]
struct Inner {
    jobs: Vec<ImageJob>,
    index: HashMap<Uuid, usize>,
    fingerprints: HashSet<Fingerprint>,
}

impl Inner {
    fn job_mut(&mut self, id: Uuid) -> Result<&mut ImageJob, StoreError> {
        let idx = *self.index.get(&id).ok_or(StoreError::NotFound(id))?;
        Ok(&mut self.jobs[idx])
    }

    fn begin(&mut self, id: Uuid, pass: Pass) -> Result<Dispatch, StoreError> {
        let job = self.job_mut(id)?;
        job.apply(JobPatch::Processing { pass })?;
        Ok(Dispatch {
            job_id: id,
            file_name: job.file_name().to_string(),
            pass,
            input: job.input_for(pass).clone(),
            container_mime: job.source().mime_type().to_string(),
        })
    }

    fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|j| j.status() == status).count()
    }

    fn record_depth(&self) {
        metrics::gauge!("watermark_queue_depth").set(self.count(JobStatus::Queued) as f64);
    }
}

/// Ordered, id-addressable collection of [`ImageJob`]s for one session.
///
/// Every mutation runs under a single write lock and never crosses an
/// `.await`, so check-then-transition sequences are atomic.
pub struct JobStore {
    inner: RwLock<Inner>,
    events: broadcast::Sender<StoreEvent>,
}

impl JobStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: RwLock::new(Inner::default()),
            events,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| {
            tracing::error!("RwLock poisoned reading job store: {e}");
            e.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| {
            tracing::error!("RwLock poisoned writing job store: {e}");
            e.into_inner()
        })
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Append new jobs in order, dropping any whose source fingerprint is
    /// already in the session or earlier in the same batch.
    ///
    /// Returns the jobs actually stored.
    pub fn append(&self, jobs: Vec<ImageJob>) -> Vec<ImageJob> {
        let mut accepted = Vec::with_capacity(jobs.len());
        {
            let mut inner = self.write();
            for job in jobs {
                let fingerprint = job.source().fingerprint();
                if !inner.fingerprints.insert(fingerprint) {
                    tracing::debug!(
                        file_name = %job.file_name(),
                        fingerprint = %fingerprint,
                        "Skipping duplicate upload"
                    );
                    metrics::counter!("watermark_jobs_duplicate_total").increment(1);
                    continue;
                }
                let idx = inner.jobs.len();
                inner.index.insert(job.id(), idx);
                inner.jobs.push(job.clone());
                accepted.push(job);
            }
            inner.record_depth();
        }

        if !accepted.is_empty() {
            metrics::counter!("watermark_jobs_ingested_total").increment(accepted.len() as u64);
            self.emit(StoreEvent::Appended {
                ids: accepted.iter().map(ImageJob::id).collect(),
            });
        }
        accepted
    }

    pub fn contains_fingerprint(&self, fingerprint: Fingerprint) -> bool {
        self.read().fingerprints.contains(&fingerprint)
    }

    pub fn get(&self, id: Uuid) -> Option<ImageJob> {
        let inner = self.read();
        inner.index.get(&id).map(|&idx| inner.jobs[idx].clone())
    }

    /// Snapshot of every job in insertion order.
    pub fn all(&self) -> Vec<ImageJob> {
        self.read().jobs.clone()
    }

    pub fn len(&self) -> usize {
        self.read().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().jobs.is_empty()
    }

    /// Apply a validated transition to one job.
    pub fn update_status(&self, id: Uuid, patch: JobPatch) -> Result<ImageJob, StoreError> {
        let updated = {
            let mut inner = self.write();
            let job = inner.job_mut(id)?;
            job.apply(patch)?;
            let updated = job.clone();
            inner.record_depth();
            updated
        };
        self.emit(StoreEvent::Updated {
            id,
            status: updated.status(),
        });
        Ok(updated)
    }

    /// Move a job straight to `processing` for the pass `action` implies.
    pub fn begin(&self, id: Uuid, action: JobAction) -> Result<Dispatch, StoreError> {
        let dispatch = {
            let mut inner = self.write();
            let pass = inner.job_mut(id)?.pass_for(action)?;
            let dispatch = inner.begin(id, pass)?;
            inner.record_depth();
            dispatch
        };
        self.emit(StoreEvent::Updated {
            id,
            status: JobStatus::Processing,
        });
        Ok(dispatch)
    }

    /// Put a job back in the queue for the pass `action` implies.
    pub fn requeue(&self, id: Uuid, action: JobAction) -> Result<ImageJob, StoreError> {
        let updated = {
            let mut inner = self.write();
            let job = inner.job_mut(id)?;
            let pass = job.pass_for(action)?;
            job.apply(JobPatch::Queued { pass })?;
            let updated = job.clone();
            inner.record_depth();
            updated
        };
        self.emit(StoreEvent::Updated {
            id,
            status: JobStatus::Queued,
        });
        Ok(updated)
    }

    /// Claim the next job for the sequential runner.
    ///
    /// Selection and the move to `processing` happen under one lock, so two
    /// callers can never both get a dispatch while a job is in flight.
    pub fn claim_next(&self) -> Option<Dispatch> {
        let dispatch = {
            let mut inner = self.write();
            let id = scheduler::select_next(&inner.jobs)?;
            let pass = inner.jobs[inner.index[&id]].pass();
            match inner.begin(id, pass) {
                Ok(dispatch) => {
                    inner.record_depth();
                    dispatch
                }
                Err(e) => {
                    tracing::error!(job_id = %id, error = %e, "Selected job could not be started");
                    return None;
                }
            }
        };
        self.emit(StoreEvent::Updated {
            id: dispatch.job_id,
            status: JobStatus::Processing,
        });
        Some(dispatch)
    }

    pub fn processing_count(&self) -> usize {
        self.read().count(JobStatus::Processing)
    }

    pub fn queued_count(&self) -> usize {
        self.read().count(JobStatus::Queued)
    }

    pub fn status_counts(&self) -> StatusCounts {
        let inner = self.read();
        [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Success,
            JobStatus::Error,
        ]
        .into_iter()
        .map(|status| (status, inner.count(status)))
        .collect()
    }

    /// Drop every job and fingerprint. Returns how many jobs were removed.
    pub fn clear(&self) -> usize {
        let removed = {
            let mut inner = self.write();
            let removed = inner.jobs.len();
            *inner = Inner::default();
            inner.record_depth();
            removed
        };
        self.emit(StoreEvent::Cleared);
        removed
    }

    /// Subscribe to mutation events.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Job {0} not found")]
    NotFound(Uuid),

    #[error("Job {0} is already processing")]
    Busy(Uuid),

    #[error("Job {0} has no result to refine")]
    NoResult(Uuid),

    #[error("Job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },
}
