pub mod download;
pub mod gemini;
pub mod ingest;
pub mod orchestrator;
pub mod removal;
pub mod scheduler;
pub mod store;
