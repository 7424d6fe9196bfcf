//! Per-job working state threaded through the four extraction stages,
//! grounded in the old `context.rs`'s `PipelineContext` shape but carrying
//! the extraction draft instead of a single-shot analysis result.

use std::collections::HashMap;

use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::job::Job, vector::VectorHit},
};
use tracing::error;

use crate::extractor::ExtractionDraft;

use super::services::PipelineServices;

pub struct PipelineContext<'a> {
    pub job: &'a Job,
    pub db: &'a SurrealDbClient,
    pub services: &'a dyn PipelineServices,
    pub document_title: String,
    pub artifact_type: String,
    pub chunks: Vec<VectorHit>,
    pub draft: Option<ExtractionDraft>,
    pub resolved_entities: HashMap<String, String>,
}

impl<'a> PipelineContext<'a> {
    pub fn new(
        job: &'a Job,
        db: &'a SurrealDbClient,
        services: &'a dyn PipelineServices,
        document_title: String,
        artifact_type: String,
    ) -> Self {
        Self {
            job,
            db,
            services,
            document_title,
            artifact_type,
            chunks: Vec::new(),
            draft: None,
            resolved_entities: HashMap::new(),
        }
    }

    pub fn abort(&self, err: AppError) -> AppError {
        error!(job_id = %self.job.id, artifact_uid = %self.job.artifact_uid, error = %err, "extraction job aborted");
        err
    }
}
