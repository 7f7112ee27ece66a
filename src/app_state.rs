use std::sync::Arc;

use crate::services::{orchestrator::Orchestrator, store::JobStore};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<JobStore>,
    pub orchestrator: Orchestrator,
    pub download_prefix: Arc<str>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, download_prefix: impl Into<String>) -> Self {
        Self {
            store: Arc::clone(orchestrator.store()),
            orchestrator,
            download_prefix: download_prefix.into().into(),
        }
    }
}
