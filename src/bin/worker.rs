use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use watermark_remover::{
    config::AppConfig,
    models::job::{JobAction, JobStatus},
    services::{
        download,
        gemini::GeminiClient,
        ingest::{self, RawFile},
        orchestrator::Orchestrator,
        scheduler::SchedulingPolicy,
        store::JobStore,
    },
};

/// Strip watermarks from image files, one at a time, and write the results.
#[derive(Debug, Parser)]
#[command(name = "watermark-worker", version)]
struct Args {
    /// Images to process; duplicates by content are processed once
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Directory results are written to
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,

    /// Output file name prefix (defaults to DOWNLOAD_PREFIX)
    #[arg(short, long)]
    prefix: Option<String>,

    /// Extra refinement passes run on each successful result
    #[arg(short, long, default_value_t = 0)]
    refine_passes: u32,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .compact()
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(0) => {}
        Ok(failed) => {
            tracing::warn!(failed, "Some images could not be processed");
            std::process::exit(2);
        }
        Err(e) => {
            tracing::error!(error = %e, "Worker aborted");
            std::process::exit(1);
        }
    }
}

/// Returns the number of jobs that ended in error.
async fn run(args: Args) -> Result<usize, Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    let prefix = args.prefix.unwrap_or_else(|| config.download_prefix.clone());

    let store = Arc::new(JobStore::new());
    let orchestrator = Orchestrator::new(
        Arc::clone(&store),
        Arc::new(GeminiClient::from_config(&config)),
        SchedulingPolicy::Sequential,
        &config.failure_message,
    );

    let files = args.files.into_iter().map(RawFile::from_path).collect();
    let report = ingest::ingest(&store, files).await;
    tracing::info!(
        jobs = report.accepted.len(),
        skipped = report.skipped(),
        "Starting sequential run"
    );

    orchestrator.drain().await;

    for pass in 1..=args.refine_passes {
        for job in store.all() {
            if job.status() != JobStatus::Success {
                continue;
            }
            tracing::info!(job_id = %job.id(), pass, "Refining result");
            orchestrator.run(job.id(), JobAction::Refine).await?;
        }
    }

    tokio::fs::create_dir_all(&args.out_dir).await?;

    let mut failed = 0;
    for job in store.all() {
        match job.status() {
            JobStatus::Success => {
                let artifact = download::prepare(&store, job.id(), &prefix)?;
                let target = args.out_dir.join(&artifact.file_name);
                tokio::fs::write(&target, &artifact.bytes).await?;
                tracing::info!(
                    job_id = %job.id(),
                    output = %target.display(),
                    bytes = artifact.bytes.len(),
                    "Wrote result"
                );
            }
            status => {
                failed += 1;
                tracing::error!(
                    job_id = %job.id(),
                    file_name = %job.file_name(),
                    status = %status,
                    error = job.error().unwrap_or_default(),
                    "Image not processed"
                );
            }
        }
    }

    Ok(failed)
}
