//! Drives one claimed `Job` through to completion (spec §2 "the worker
//! claims `extract`... then claims `graph_upsert`"). Grounded in the old
//! teacher `pipeline/mod.rs`'s retry-delay formula and stage-timing
//! instrumentation, retargeted from a single `IngestionTask` analysis call
//! onto the `Job`-typed extract/graph_upsert dispatch.

mod config;
mod context;
mod services;
mod state;
mod stages;

pub use config::{IngestionConfig, IngestionTuning};
#[allow(clippy::module_name_repetitions)]
pub use services::{DefaultPipelineServices, PipelineServices};

use std::sync::Arc;
use std::time::Instant;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            artifact_revision::{ArtifactRevision, ArtifactType},
            job::{Job, JobStatus, JobType},
        },
    },
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::extractor::EventExtractor;
use crate::graph_materializer::GraphMaterializer;

use self::{
    context::PipelineContext,
    stages::{commit_stage, extract_stage, fetch_chunks_stage, resolve_stage},
    state::claimed,
};

#[allow(clippy::module_name_repetitions)]
pub struct IngestionPipeline {
    db: Arc<SurrealDbClient>,
    config: IngestionConfig,
    services: Arc<dyn PipelineServices>,
}

impl IngestionPipeline {
    pub const fn new(
        db: Arc<SurrealDbClient>,
        config: IngestionConfig,
        services: Arc<dyn PipelineServices>,
    ) -> Self {
        Self {
            db,
            config,
            services,
        }
    }

    /// Dispatches a claimed job to the stage sequence appropriate for its
    /// type and reports the outcome back to the Job Queue (spec §4.6): a
    /// successful run marks the job `Done`, a failure applies the
    /// exponential-backoff retry or, once `attempts >= max_attempts`, moves
    /// it to `Failed`.
    #[tracing::instrument(
        skip_all,
        fields(job_id = %job.id, job_type = job.job_type.as_str(), attempt = job.attempts)
    )]
    pub async fn process_job(&self, job: Job) -> Result<(), AppError> {
        let started = Instant::now();
        let result = match job.job_type {
            JobType::Extract => self.process_extract(&job).await,
            JobType::GraphUpsert => self.process_graph_upsert(&job).await,
        };

        match result {
            Ok(()) => {
                job.mark_done(&self.db).await?;
                info!(
                    job_id = %job.id,
                    job_type = job.job_type.as_str(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "job completed"
                );
                Ok(())
            }
            Err(err) => {
                let status = job
                    .mark_failed(
                        &self.db,
                        &err.to_string(),
                        self.config.tuning.retry_base_delay_secs,
                        self.config.tuning.retry_max_delay_secs,
                    )
                    .await?;
                match status {
                    JobStatus::Failed => warn!(
                        job_id = %job.id,
                        job_type = job.job_type.as_str(),
                        attempts = job.attempts,
                        error = %err,
                        "job exhausted retries; moved to dead letter"
                    ),
                    _ => warn!(
                        job_id = %job.id,
                        job_type = job.job_type.as_str(),
                        attempts = job.attempts,
                        error = %err,
                        "job failed; scheduled for retry"
                    ),
                }
                Err(err)
            }
        }
    }

    /// `Claimed -> ChunksFetched -> Extracted -> Resolved -> Committed`
    /// (spec §4.8): fetch the revision's chunks, run Prompt A over each,
    /// resolve every mentioned entity, and commit atomically. On success,
    /// enqueues the `graph_upsert` job for the same revision in the same
    /// logical step (the commit transaction and the enqueue are two
    /// separate operations, but the enqueue only ever follows a committed
    /// extraction, never a partial one).
    async fn process_extract(&self, job: &Job) -> Result<(), AppError> {
        let revision = ArtifactRevision::find_by_revision(&self.db, &job.artifact_uid, &job.revision_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "artifact revision {}/{} not found for extract job",
                    job.artifact_uid, job.revision_id
                ))
            })?;

        let extractor = EventExtractor::new(
            &self.db,
            self.services.as_ref(),
            self.config.tuning.entity_similarity_threshold,
            self.config.tuning.entity_max_candidates,
        );

        let document_title = revision
            .metadata
            .as_ref()
            .and_then(|meta| meta.get("title"))
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| revision.artifact_id.clone(), ToOwned::to_owned);

        let mut ctx = PipelineContext::new(
            job,
            &self.db,
            self.services.as_ref(),
            document_title,
            revision.artifact_type.as_str().to_owned(),
        );

        let machine = claimed();
        let machine = fetch_chunks_stage(machine, &mut ctx, &extractor).await?;
        let machine = extract_stage(machine, &mut ctx, &extractor).await?;
        let machine = resolve_stage(machine, &mut ctx, &extractor).await?;

        let extraction_run_id = Uuid::new_v4().to_string();
        let (_machine, event_count) =
            commit_stage(machine, &mut ctx, &extractor, &extraction_run_id).await?;

        Job::enqueue(
            &self.db,
            JobType::GraphUpsert,
            &job.artifact_uid,
            &job.revision_id,
            self.config.tuning.job_max_attempts,
        )
        .await?;

        info!(
            artifact_uid = %job.artifact_uid,
            revision_id = %job.revision_id,
            event_count,
            "extraction committed; graph_upsert enqueued"
        );
        Ok(())
    }

    /// Rebuilds the graph index for one revision plus the current
    /// `POSSIBLY_SAME` backlog (spec §4.9). A `GraphUnavailable` failure
    /// here never touches the already-committed relational events — the
    /// job simply retries with backoff and `recall` keeps serving primary
    /// results with graph expansion degraded in the meantime.
    async fn process_graph_upsert(&self, job: &Job) -> Result<(), AppError> {
        let materializer = GraphMaterializer::new(&self.db);
        let counts = materializer
            .materialize_revision(&job.artifact_uid, &job.revision_id)
            .await
            .map_err(|err| AppError::GraphUnavailable(err.to_string()))?;
        materializer
            .materialize_uncertain_pairs()
            .await
            .map_err(|err| AppError::GraphUnavailable(err.to_string()))?;

        info!(
            artifact_uid = %job.artifact_uid,
            revision_id = %job.revision_id,
            acted_in = counts.acted_in,
            about = counts.about,
            possibly_same = counts.possibly_same,
            "graph materialized"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::{
        types::artifact_revision::{derive_artifact_uid, derive_revision_id},
        vector::{VectorMetadata, VectorNamespace, VectorStoreGateway},
    };

    async fn test_db() -> SurrealDbClient {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.ensure_initialized().await.expect("init schema");
        db
    }

    fn services_stub() -> Arc<dyn PipelineServices> {
        use crate::pipeline::services::MockPipelineServices;
        let mut mock = MockPipelineServices::new();
        mock.expect_complete().returning(|_, _, schema_name, _| {
            let schema_name = schema_name.to_owned();
            Box::pin(async move {
                if schema_name == "chunk_extraction" {
                    Ok(serde_json::json!({ "events": [], "entities_mentioned": [] }))
                } else {
                    Ok(serde_json::json!({
                        "decision": "different",
                        "canonical_name": "x",
                        "reason": "unused"
                    }))
                }
            })
        });
        mock.expect_embed()
            .returning(|_| Box::pin(async { Ok(vec![1.0, 0.0, 0.0]) }));
        Arc::new(mock)
    }

    #[tokio::test]
    async fn process_extract_with_no_events_still_enqueues_graph_upsert() {
        let db = Arc::new(test_db().await);
        let artifact_uid = derive_artifact_uid(Some("slack"), Some("C1"));
        let revision_id = derive_revision_id("hello world");

        let revision = ArtifactRevision::new(
            artifact_uid.clone(),
            revision_id.clone(),
            ArtifactType::Chat,
            Some("slack".into()),
            Some("C1".into()),
            "hello world".into(),
            2,
            false,
            0,
            None,
        );
        revision.insert_as_latest(&db).await.expect("insert revision");

        let gateway = VectorStoreGateway::new(&db);
        gateway
            .upsert(
                VectorNamespace::Chunks,
                &format!("{}::chunk::000::deadbeef", revision.artifact_id),
                vec![1.0, 0.0, 0.0],
                VectorMetadata {
                    artifact_uid: artifact_uid.clone(),
                    revision_id: revision_id.clone(),
                    chunk_index: Some(0),
                    ..Default::default()
                },
                "hello world",
            )
            .await
            .expect("upsert chunk");

        let job = Job::enqueue(&db, JobType::Extract, &artifact_uid, &revision_id, 5)
            .await
            .expect("enqueue extract job");

        let pipeline = IngestionPipeline::new(
            Arc::clone(&db),
            IngestionConfig::from(&common::utils::config::AppConfig::for_tests("ns", "db")),
            services_stub(),
        );

        pipeline.process_job(job).await.expect("process extract job");

        let graph_job = Job::find_existing(&db, JobType::GraphUpsert, &artifact_uid, &revision_id)
            .await
            .expect("lookup graph job")
            .expect("graph_upsert job enqueued");
        assert_eq!(graph_job.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn process_extract_missing_revision_fails_job() {
        let db = Arc::new(test_db().await);
        let job = Job::enqueue(&db, JobType::Extract, "art_missing", "rev_missing", 5)
            .await
            .expect("enqueue");

        let pipeline = IngestionPipeline::new(
            Arc::clone(&db),
            IngestionConfig::from(&common::utils::config::AppConfig::for_tests("ns", "db")),
            services_stub(),
        );

        let err = pipeline.process_job(job).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
