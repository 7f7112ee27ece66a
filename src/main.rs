use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use watermark_remover::{
    app_state::AppState,
    config::AppConfig,
    routes,
    services::{
        gemini::GeminiClient, orchestrator::Orchestrator, scheduler::SchedulingPolicy,
        store::JobStore,
    },
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!(
        policy = %config.scheduling_policy,
        model = %config.gemini_model,
        "Initializing watermark-remover server"
    );

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    metrics::describe_counter!(
        "watermark_jobs_ingested_total",
        "Image jobs accepted from uploads"
    );
    metrics::describe_counter!(
        "watermark_jobs_duplicate_total",
        "Uploads dropped as duplicates of a session image"
    );
    metrics::describe_counter!(
        "watermark_ingest_errors_total",
        "Uploads dropped because they could not be read as images"
    );
    metrics::describe_counter!(
        "watermark_jobs_completed_total",
        "Watermark removal calls that returned an image"
    );
    metrics::describe_counter!(
        "watermark_jobs_failed_total",
        "Watermark removal calls that failed"
    );
    metrics::describe_histogram!(
        "watermark_removal_seconds",
        "Duration of one watermark removal call"
    );
    metrics::describe_gauge!("watermark_queue_depth", "Jobs currently queued");

    // Session store and removal engine
    let store = Arc::new(JobStore::new());
    let remover = Arc::new(GeminiClient::from_config(&config));
    let orchestrator = Orchestrator::new(
        store,
        remover,
        config.scheduling_policy,
        &config.failure_message,
    );

    if config.scheduling_policy == SchedulingPolicy::Sequential {
        orchestrator.spawn_sequential();
    }

    let state = AppState::new(orchestrator, &config.download_prefix);

    let app = routes::router(state, config.max_upload_bytes)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
