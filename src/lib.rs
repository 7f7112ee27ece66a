//! Watermark removal job queue
//!
//! This library holds one in-memory session of image jobs, deduplicates
//! uploads, and drives each job through an external image-editing model
//! (Gemini by default) under either a manual or a sequential scheduling
//! policy. The HTTP layer in [`routes`] and the `watermark-worker` binary are
//! thin callers of the engine in [`services`].

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
