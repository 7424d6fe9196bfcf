//! `status` (spec §4.12/§6.1): without an `artifact_id`, overall health and
//! job-queue counts; with one, the latest revision's extraction job state,
//! optionally re-enqueuing extraction. Grounded in this crate's previous
//! `routes/ingress.rs` handler shape.

use axum::{extract::State, Json};
use common::storage::types::{
    artifact_revision::ArtifactRevision,
    job::{Job, JobStatus, JobType},
};
use serde::{Deserialize, Serialize};

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Default, Deserialize)]
pub struct StatusRequest {
    #[serde(default)]
    pub artifact_id: Option<String>,
    #[serde(default)]
    pub reextract: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct JobCounts {
    pub pending: i64,
    pub processing: i64,
    pub done: i64,
    pub failed: i64,
}

#[derive(Debug, Serialize)]
pub struct ArtifactStatus {
    pub artifact_id: String,
    pub artifact_uid: String,
    pub revision_id: String,
    pub job_status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub healthy: bool,
    pub job_counts: JobCounts,
    pub graph_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactStatus>,
}

/// Graph availability (spec §4.12/§5 "the graph store is treated as an
/// index; queries must tolerate lag"): a cheap reachability probe against
/// the event table rather than a full expansion, so `status` stays fast.
async fn check_graph_available(db: &common::storage::db::SurrealDbClient) -> bool {
    db.client
        .query("SELECT count() FROM semantic_event LIMIT 1")
        .await
        .is_ok()
}

pub async fn status(
    State(state): State<ApiState>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let counts = Job::count_by_status(&state.db).await?;
    let job_counts = counts.into_iter().fold(JobCounts::default(), |mut acc, (status, n)| {
        match status {
            JobStatus::Pending => acc.pending = n,
            JobStatus::Processing => acc.processing = n,
            JobStatus::Done => acc.done = n,
            JobStatus::Failed => acc.failed = n,
        }
        acc
    });
    let graph_available = check_graph_available(&state.db).await;

    let Some(artifact_id) = request.artifact_id else {
        return Ok(Json(StatusResponse {
            healthy: true,
            job_counts,
            graph_available,
            artifact: None,
        }));
    };

    let revision = if let Some(uid) = artifact_id
        .strip_prefix("mem_")
        .or_else(|| artifact_id.strip_prefix("uid_"))
    {
        ArtifactRevision::find_latest(&state.db, uid).await?
    } else {
        ArtifactRevision::find_latest_by_artifact_id(&state.db, &artifact_id).await?
    };
    let Some(revision) = revision else {
        return Err(ApiError::not_found(format!(
            "no artifact found for id {artifact_id}"
        )));
    };

    if request.reextract {
        Job::enqueue_or_reset(
            &state.db,
            JobType::Extract,
            &revision.artifact_uid,
            &revision.revision_id,
            state.config.job_max_attempts,
        )
        .await?;
    }

    let job = Job::latest_for_revision(
        &state.db,
        JobType::Extract,
        &revision.artifact_uid,
        &revision.revision_id,
    )
    .await?;

    let artifact = ArtifactStatus {
        artifact_id: revision.artifact_id,
        artifact_uid: revision.artifact_uid,
        revision_id: revision.revision_id,
        job_status: job.as_ref().map_or("NONE", |j| match j.status {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Done => "DONE",
            JobStatus::Failed => "FAILED",
        }),
        job_id: job.as_ref().map(|j| j.id.clone()),
        last_error: job.and_then(|j| j.last_error),
    };

    Ok(Json(StatusResponse {
        healthy: true,
        job_counts,
        graph_available,
        artifact: Some(artifact),
    }))
}
