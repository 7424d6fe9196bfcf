#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod extractor;
pub mod graph_materializer;
pub mod pipeline;
pub mod resolver;
pub mod types;
pub mod utils;

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use common::storage::{
    db::SurrealDbClient,
    types::job::{Job, JobType},
};
pub use pipeline::{IngestionConfig, IngestionPipeline, IngestionTuning};
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Polls both job types in priority order (spec §4.6: extraction jobs
/// before the graph upserts they enqueue, so a revision's events land
/// before its edges are rebuilt), processing one claimed job per
/// iteration and backing off briefly when the queue is empty.
pub async fn run_worker_loop(
    db: Arc<SurrealDbClient>,
    ingestion_pipeline: Arc<IngestionPipeline>,
    lease_seconds: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let worker_id = format!("ingestion-worker-{}", Uuid::new_v4());
    let lease = ChronoDuration::seconds(lease_seconds);
    const IDLE_BACKOFF_BASE_MS: u64 = 500;
    const IDLE_BACKOFF_CAP_MS: u64 = 5_000;
    let mut consecutive_idle_polls: u32 = 0;

    loop {
        let claimed = match Job::claim_next(&db, JobType::Extract, &worker_id, lease).await {
            Ok(Some(job)) => Some(job),
            Ok(None) => match Job::claim_next(&db, JobType::GraphUpsert, &worker_id, lease).await {
                Ok(job) => job,
                Err(err) => {
                    error!(%worker_id, error = %err, "failed to claim graph upsert job");
                    sleep(Duration::from_secs(1)).await;
                    continue;
                }
            },
            Err(err) => {
                error!(%worker_id, error = %err, "failed to claim extraction job");
                sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        match claimed {
            Some(job) => {
                consecutive_idle_polls = 0;
                let job_id = job.id.clone();
                info!(%worker_id, %job_id, job_type = job.job_type.as_str(), attempt = job.attempts, "claimed job");
                if let Err(err) = ingestion_pipeline.process_job(job).await {
                    warn!(%worker_id, %job_id, error = %err, "job processing failed");
                }
            }
            None => {
                let backoff_ms = IDLE_BACKOFF_BASE_MS
                    .saturating_mul(1_u64 << consecutive_idle_polls.min(4))
                    .min(IDLE_BACKOFF_CAP_MS);
                sleep(Duration::from_millis(backoff_ms)).await;
                consecutive_idle_polls = consecutive_idle_polls.saturating_add(1);
            }
        }
    }
}

/// Periodically returns jobs whose lease expired without completion back
/// to `Pending` (spec §4.6 "reaper").
pub async fn run_reaper_loop(
    db: Arc<SurrealDbClient>,
    lease_seconds: i64,
    backoff_base_seconds: u64,
    interval: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        match Job::reap_expired_leases(&db, lease_seconds, backoff_base_seconds).await {
            Ok(0) => {}
            Ok(reaped) => info!(reaped, "reaped expired job leases"),
            Err(err) => error!(error = %err, "failed to reap expired job leases"),
        }
        sleep(interval).await;
    }
}
