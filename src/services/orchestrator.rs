//! Dispatches jobs to the watermark remover and writes outcomes back.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::job::{ImageJob, ImagePayload, JobAction, JobPatch};
use crate::services::removal::WatermarkRemover;
use crate::services::scheduler::SchedulingPolicy;
use crate::services::store::{Dispatch, JobStore, StoreError};

/// Drives jobs from the store through the remover under one scheduling
/// policy. Cheap to clone; clones share the store and remover.
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<JobStore>,
    remover: Arc<dyn WatermarkRemover>,
    policy: SchedulingPolicy,
    failure_message: Arc<str>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<JobStore>,
        remover: Arc<dyn WatermarkRemover>,
        policy: SchedulingPolicy,
        failure_message: impl Into<String>,
    ) -> Self {
        let mut failure_message: String = failure_message.into();
        if failure_message.trim().is_empty() {
            failure_message = "Failed to process image.".to_string();
        }
        Self {
            store,
            remover,
            policy,
            failure_message: failure_message.into(),
        }
    }

    pub fn policy(&self) -> SchedulingPolicy {
        self.policy
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn remover_name(&self) -> &str {
        self.remover.name()
    }

    /// Handle a user action on one job without waiting for the outcome.
    ///
    /// Manual policy starts the removal immediately on a background task.
    /// Sequential policy puts the job back in the queue; the runner picks
    /// it up once nothing else is processing.
    pub fn trigger(&self, id: Uuid, action: JobAction) -> Result<ImageJob, StoreError> {
        match self.policy {
            SchedulingPolicy::Manual => {
                let dispatch = self.store.begin(id, action)?;
                let snapshot = self.store.get(id).ok_or(StoreError::NotFound(id))?;
                let this = self.clone();
                tokio::spawn(async move {
                    this.execute(dispatch).await;
                });
                Ok(snapshot)
            }
            SchedulingPolicy::Sequential => {
                tracing::debug!(job_id = %id, action = %action, "Re-queueing job");
                self.store.requeue(id, action)
            }
        }
    }

    /// Start a job directly and wait for its terminal state.
    ///
    /// Bypasses the queue, so callers own the concurrency decision.
    pub async fn run(&self, id: Uuid, action: JobAction) -> Result<ImageJob, StoreError> {
        let dispatch = self.store.begin(id, action)?;
        self.execute(dispatch)
            .await
            .ok_or(StoreError::NotFound(id))
    }

    /// Call the remover for a job already in `processing` and record the
    /// outcome. Returns `None` when the job vanished meanwhile.
    pub async fn execute(&self, dispatch: Dispatch) -> Option<ImageJob> {
        let Dispatch {
            job_id,
            file_name,
            pass,
            input,
            container_mime,
        } = dispatch;

        tracing::info!(
            job_id = %job_id,
            file_name = %file_name,
            pass = %pass,
            remover = %self.remover.name(),
            "Removing watermark"
        );

        let start = Instant::now();
        let outcome = self.remover.remove_watermark(&input).await;
        let elapsed = start.elapsed();
        metrics::histogram!("watermark_removal_seconds").record(elapsed.as_secs_f64());

        let patch = match outcome {
            Ok(bytes) => {
                tracing::info!(
                    job_id = %job_id,
                    duration_ms = elapsed.as_millis(),
                    output_bytes = bytes.len(),
                    "Watermark removal complete"
                );
                metrics::counter!("watermark_jobs_completed_total").increment(1);
                JobPatch::Succeeded {
                    result: ImagePayload::new(bytes, container_mime),
                }
            }
            Err(e) => {
                tracing::error!(
                    job_id = %job_id,
                    duration_ms = elapsed.as_millis(),
                    error = %e,
                    "Watermark removal failed"
                );
                metrics::counter!("watermark_jobs_failed_total").increment(1);
                JobPatch::Failed {
                    message: self.failure_message.to_string(),
                }
            }
        };

        match self.store.update_status(job_id, patch) {
            Ok(job) => Some(job),
            Err(StoreError::NotFound(_)) => {
                tracing::debug!(job_id = %job_id, "Job removed while processing, dropping outcome");
                None
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Could not record removal outcome");
                None
            }
        }
    }

    /// Process queued jobs one at a time until none is left.
    ///
    /// Returns how many jobs were dispatched.
    pub async fn drain(&self) -> usize {
        let mut dispatched = 0;
        while let Some(dispatch) = self.store.claim_next() {
            dispatched += 1;
            self.execute(dispatch).await;
        }
        dispatched
    }

    /// Sequential runner: drain, then sleep until the store changes.
    ///
    /// Never returns on its own; abort the task to stop it.
    pub async fn run_sequential(self) {
        let mut events = self.store.subscribe();
        tracing::info!("Sequential queue runner started");
        loop {
            let dispatched = self.drain().await;
            if dispatched > 0 {
                tracing::debug!(dispatched, "Queue idle");
            }
            match events.recv().await {
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Runner lagged behind store events");
                }
                Err(RecvError::Closed) => break,
            }
        }
        tracing::info!("Sequential queue runner stopped");
    }

    pub fn spawn_sequential(&self) -> JoinHandle<()> {
        tokio::spawn(self.clone().run_sequential())
    }
}
