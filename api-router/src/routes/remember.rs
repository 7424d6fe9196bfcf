//! `remember` (spec §4.12/§6.1): ingest content directly, synchronously
//! chunk and embed it, commit it as the latest revision of its artifact,
//! and enqueue background extraction. Grounded in this crate's previous
//! multipart `routes/ingress.rs` handler shape (state extraction, `ApiError`
//! propagation), rewritten around direct JSON content instead of an
//! uploaded file.

use std::sync::Arc;

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use common::storage::{
    db::SurrealDbClient,
    types::{
        artifact_revision::{
            derive_artifact_uid, derive_revision_id, short_artifact_id, ArtifactRevision,
            ArtifactType,
        },
        job::{Job, JobType},
    },
    vector::{VectorMetadata, VectorNamespace, VectorStoreGateway},
};
use common::utils::{chunker, embedding::EmbeddingProvider};
use serde::{Deserialize, Serialize};

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct RememberRequest {
    pub content: String,
    #[serde(default, rename = "type")]
    pub artifact_type: Option<String>,
    #[serde(default)]
    pub source_system: Option<String>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct RememberResponse {
    pub artifact_id: String,
    pub artifact_uid: String,
    pub revision_id: String,
    pub job_id: String,
    pub job_status: &'static str,
}

pub async fn remember(
    State(state): State<ApiState>,
    Json(request): Json<RememberRequest>,
) -> Result<Json<RememberResponse>, ApiError> {
    if request.content.trim().is_empty() {
        return Err(ApiError::invalid_input("content must not be empty"));
    }

    let artifact_uid = derive_artifact_uid(
        request.source_system.as_deref(),
        request.source_id.as_deref(),
    );
    let revision_id = derive_revision_id(&request.content);

    if let Some(existing) =
        ArtifactRevision::find_by_revision(&state.db, &artifact_uid, &revision_id).await?
    {
        let job = Job::latest_for_revision(&state.db, JobType::Extract, &artifact_uid, &revision_id)
            .await?;
        return Ok(Json(RememberResponse {
            artifact_id: existing.artifact_id,
            artifact_uid: existing.artifact_uid,
            revision_id: existing.revision_id,
            job_id: job.map(|j| j.id).unwrap_or_default(),
            job_status: "PENDING",
        }));
    }

    let artifact_type = ArtifactType::from(request.artifact_type.clone());
    let token_count = chunker::count_tokens(&request.content)?;
    let short_id = short_artifact_id(&artifact_uid);

    let (chunks, is_chunked) = if token_count <= state.config.single_piece_max_tokens {
        (
            vec![chunker::Chunk {
                id: chunker::chunk_id(&short_id, 0, &request.content),
                index: 0,
                text: request.content.clone(),
                start_char: 0,
                end_char: request.content.len(),
            }],
            false,
        )
    } else {
        let chunks = chunker::chunk_text(
            &short_id,
            &request.content,
            state.config.chunk_target_tokens,
            state.config.chunk_overlap_tokens,
        )?;
        (chunks, true)
    };

    let document_date = request
        .metadata
        .as_ref()
        .and_then(|m| m.get("document_date"))
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    embed_and_store_chunks(
        &state.db,
        &state.embedding_provider,
        &artifact_uid,
        &revision_id,
        &request,
        artifact_type,
        document_date,
        &chunks,
        is_chunked,
    )
    .await?;

    let revision = ArtifactRevision::new(
        artifact_uid.clone(),
        revision_id.clone(),
        artifact_type,
        request.source_system.clone(),
        request.source_id.clone(),
        request.content.clone(),
        token_count,
        is_chunked,
        chunks.len(),
        request.metadata.clone(),
    );
    revision.insert_as_latest(&state.db).await?;

    let job = Job::enqueue(
        &state.db,
        JobType::Extract,
        &artifact_uid,
        &revision_id,
        state.config.job_max_attempts,
    )
    .await?;

    Ok(Json(RememberResponse {
        artifact_id: revision.artifact_id,
        artifact_uid,
        revision_id,
        job_id: job.id,
        job_status: "PENDING",
    }))
}

/// Spec §4.12 "Chunk; embed all chunks (and the whole document if ≤
/// threshold); upsert into vector store". A single-piece artifact also gets
/// a `content`-namespace document under a `mem_*` id so `recall` can find
/// it via `include_memory` without waiting on chunking.
#[allow(clippy::too_many_arguments)]
async fn embed_and_store_chunks(
    db: &SurrealDbClient,
    embedding_provider: &Arc<EmbeddingProvider>,
    artifact_uid: &str,
    revision_id: &str,
    request: &RememberRequest,
    artifact_type: ArtifactType,
    document_date: Option<DateTime<Utc>>,
    chunks: &[chunker::Chunk],
    is_chunked: bool,
) -> Result<(), common::error::AppError> {
    let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    let vectors = embedding_provider.embed_batch(&texts).await?;

    let gateway = VectorStoreGateway::new(db);
    for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
        gateway
            .upsert(
                VectorNamespace::Chunks,
                &chunk.id,
                vector.clone(),
                VectorMetadata {
                    artifact_type: Some(artifact_type.as_str().to_owned()),
                    source_system: request.source_system.clone(),
                    document_date,
                    artifact_uid: artifact_uid.to_owned(),
                    revision_id: revision_id.to_owned(),
                    chunk_index: Some(chunk.index),
                },
                &chunk.text,
            )
            .await?;
    }

    if !is_chunked {
        if let (Some(chunk), Some(vector)) = (chunks.first(), vectors.first()) {
            gateway
                .upsert(
                    VectorNamespace::Content,
                    &format!("mem_{artifact_uid}"),
                    vector.clone(),
                    VectorMetadata {
                        artifact_type: Some(artifact_type.as_str().to_owned()),
                        source_system: request.source_system.clone(),
                        document_date,
                        artifact_uid: artifact_uid.to_owned(),
                        revision_id: revision_id.to_owned(),
                        chunk_index: None,
                    },
                    &chunk.text,
                )
                .await?;
        }
    }

    Ok(())
}
