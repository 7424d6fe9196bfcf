//! Extraction pipeline stages (spec §4.6 state sequence): each function
//! drives one `IngestionMachine` transition, grounded in the old teacher
//! `stages/mod.rs`'s per-stage-function-plus-`map_guard_error` shape.

use common::error::AppError;
use state_machines::core::GuardError;
use tracing::{debug, instrument};

use crate::extractor::EventExtractor;

use super::{
    context::PipelineContext,
    state::{Claimed, ChunksFetched, Committed, Extracted, IngestionMachine, Resolved},
};

fn map_guard_error(event: &str, guard: &GuardError) -> AppError {
    AppError::InternalError(format!(
        "invalid extraction pipeline transition during {event}: {guard:?}"
    ))
}

#[instrument(level = "trace", skip_all, fields(job_id = %ctx.job.id))]
pub async fn fetch_chunks_stage(
    machine: IngestionMachine<(), Claimed>,
    ctx: &mut PipelineContext<'_>,
    extractor: &EventExtractor<'_>,
) -> Result<IngestionMachine<(), ChunksFetched>, AppError> {
    ctx.chunks = extractor
        .fetch_chunks(&ctx.job.artifact_uid, &ctx.job.revision_id)
        .await?;

    debug!(job_id = %ctx.job.id, chunk_count = ctx.chunks.len(), "fetched chunks for extraction");

    machine
        .fetch_chunks()
        .map_err(|(_, guard)| map_guard_error("fetch_chunks", &guard))
}

#[instrument(level = "trace", skip_all, fields(job_id = %ctx.job.id))]
pub async fn extract_stage(
    machine: IngestionMachine<(), ChunksFetched>,
    ctx: &mut PipelineContext<'_>,
    extractor: &EventExtractor<'_>,
) -> Result<IngestionMachine<(), Extracted>, AppError> {
    let draft = extractor
        .extract(&ctx.chunks, &ctx.artifact_type, &ctx.document_title)
        .await?;

    debug!(
        job_id = %ctx.job.id,
        event_count = draft.event_count(),
        mention_count = draft.mention_count(),
        "extraction completed"
    );

    ctx.draft = Some(draft);

    machine
        .extract()
        .map_err(|(_, guard)| map_guard_error("extract", &guard))
}

#[instrument(level = "trace", skip_all, fields(job_id = %ctx.job.id))]
pub async fn resolve_stage(
    machine: IngestionMachine<(), Extracted>,
    ctx: &mut PipelineContext<'_>,
    extractor: &EventExtractor<'_>,
) -> Result<IngestionMachine<(), Resolved>, AppError> {
    let draft = ctx
        .draft
        .as_ref()
        .ok_or_else(|| AppError::InternalError("extraction draft missing at resolve".into()))?;

    ctx.resolved_entities = extractor
        .resolve(draft, &ctx.job.artifact_uid, &ctx.job.revision_id, &ctx.document_title)
        .await?;

    debug!(job_id = %ctx.job.id, resolved = ctx.resolved_entities.len(), "entities resolved");

    machine
        .resolve()
        .map_err(|(_, guard)| map_guard_error("resolve", &guard))
}

#[instrument(level = "trace", skip_all, fields(job_id = %ctx.job.id))]
pub async fn commit_stage(
    machine: IngestionMachine<(), Resolved>,
    ctx: &mut PipelineContext<'_>,
    extractor: &EventExtractor<'_>,
    extraction_run_id: &str,
) -> Result<(IngestionMachine<(), Committed>, usize), AppError> {
    let draft = ctx
        .draft
        .take()
        .ok_or_else(|| AppError::InternalError("extraction draft missing at commit".into()))?;

    let event_count = extractor
        .commit(
            draft,
            &ctx.resolved_entities,
            &ctx.job.artifact_uid,
            &ctx.job.revision_id,
            &ctx.document_title,
            extraction_run_id,
        )
        .await?;

    debug!(job_id = %ctx.job.id, event_count, "events committed");

    let machine = machine
        .commit()
        .map_err(|(_, guard)| map_guard_error("commit", &guard))?;

    Ok((machine, event_count))
}
